//! xbot-serve - Reply bot daemon
//!
//! Serves the admin HTTP API and, when enabled, runs the reply workflow on a
//! cron schedule.

mod api;
mod scheduler;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use libxbot::logging::LoggingConfig;
use libxbot::{Config, XbotError, XbotService};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "xbot-serve")]
#[command(version)]
#[command(about = "Reply bot daemon with admin HTTP API")]
#[command(long_about = "\
xbot-serve - Reply bot daemon with admin HTTP API

DESCRIPTION:
    xbot-serve watches the accounts the bot follows, classifies their recent
    posts and replies to hackathon posts with a promotional creative. Each
    post is handled at most once, and successful replies are capped per day.

    Runs are triggered by the admin API and, when enabled, by a cron
    schedule. Only one run executes at a time.

USAGE:
    # Run in foreground (logs to stderr)
    xbot-serve

    # Use a specific config file and port
    xbot-serve --config ./xbot.toml --port 9000

    # Enable verbose logging
    xbot-serve --verbose

HTTP API:
    GET  /health                         Liveness and database check
    POST /api/v1/workflow/execute        Run once; body {\"tweet_count\": N, \"dry_run\": bool}
    POST /api/v1/workflow/sync-following Refresh monitored accounts
    GET  /api/v1/stats                   Reply ledger counters
    GET  /api/v1/reply-logs?limit=N      Most recent reply records

    /api/v1 requires `Authorization: Bearer <key>` when server.api_key is set.

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight requests get server.shutdown_grace)

CONFIGURATION:
    Configuration file: ~/.config/xbot/config.toml (or $XBOT_CONFIG)
    Database location: ~/.local/share/xbot/xbot.db (or $XBOT_DB_PATH)

    [server]
    port = 8080
    api_key = \"${XBOT_ADMIN_KEY}\"

    [workflow]
    enable_scheduler = true
    schedule = \"0 0 */2 * * *\"   # sec min hour day month weekday

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "XBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<XbotError>()
            .map(XbotError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    LoggingConfig::from_section(&config.logging, cli.verbose).init();

    let port = cli.port.unwrap_or(config.server.port);
    let shutdown_grace = config.server.shutdown_grace;
    let enable_scheduler = config.workflow.enable_scheduler;
    let schedule = config.workflow.schedule.clone();

    if config.admin_api_key().is_none() {
        warn!("server.api_key is not set; the admin API is unauthenticated");
    }

    let service = Arc::new(XbotService::from_config(config).await?);
    info!("xbot-serve starting");

    let mut scheduler = if enable_scheduler {
        Some(scheduler::start_scheduler(service.clone(), &schedule).await?)
    } else {
        info!("scheduler disabled; runs are triggered through the API only");
        None
    };

    let app = api::router(api::AppState::new(service));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result.context("server task panicked")??;
            return Ok(());
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping gracefully...");
        }
    }

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            error!("Failed to stop scheduler: {}", e);
        }
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(shutdown_grace, server).await {
        Ok(result) => result.context("server task panicked")??,
        Err(_) => warn!(
            "in-flight requests did not finish within {:?}; exiting anyway",
            shutdown_grace
        ),
    }

    info!("xbot-serve stopped");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            signals.next().await;
        }
        Err(e) => {
            error!("Signal setup failed, falling back to Ctrl-C: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
