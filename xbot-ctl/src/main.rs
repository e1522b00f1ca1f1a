//! xbot-ctl - Control the reply bot from the command line
//!
//! One-off workflow runs, follower sync, statistics, and management of the
//! creatives and monitored accounts stored in the bot's database.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libxbot::config::resolve_db_path;
use libxbot::logging::{LogFormat, LoggingConfig};
use libxbot::{
    Account, Config, Creative, CreativeUpdate, Database, NewCreative, ReplyRecord, Result,
    RunParams, RunReport, SyncSource, XbotError, XbotService,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "xbot-ctl")]
#[command(version)]
#[command(about = "Control the hackathon reply bot")]
#[command(long_about = "\
xbot-ctl - Control the hackathon reply bot

DESCRIPTION:
    xbot-ctl runs the reply workflow once, refreshes the monitored accounts
    from the bot's following list, and manages the creatives and accounts
    stored in the bot's database. It shares configuration and database with
    xbot-serve.

COMMANDS:
    run       Run the reply workflow once
    sync      Refresh monitored accounts from the following list
    stats     Show reply statistics
    logs      Show the most recent reply records
    creative  Add, list, show, update, enable, disable or remove creatives
    account   Add, list, enable, disable or remove monitored accounts

USAGE EXAMPLES:
    # Preview what would be replied to, without posting
    xbot-ctl run --dry-run --tweet-count 20

    # Add a creative
    xbot-ctl creative add --name launch --content \"Join our hackathon!\"

    # Monitor an account by hand
    xbot-ctl account add 783214 XDevelopers

    # Ledger statistics as JSON
    xbot-ctl stats --format json

CONFIGURATION:
    Configuration file: ~/.config/xbot/config.toml
    Database location: ~/.local/share/xbot/xbot.db

    Override with environment variables:
        XBOT_CONFIG    - Path to config file
        XBOT_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication or configuration error
    3 - Invalid input (bad id, format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH", env = "XBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reply workflow once
    Run {
        /// Posts to fetch per account (0 uses workflow.default_tweet_count)
        #[arg(short = 'n', long, default_value_t = 0)]
        tweet_count: i64,

        /// Classify and record, but do not reply
        #[arg(long)]
        dry_run: bool,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Refresh monitored accounts from the following list
    Sync {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show reply statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the most recent reply records
    Logs {
        /// Number of records (default 20, max 100)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage creatives
    Creative {
        #[command(subcommand)]
        command: CreativeCommands,
    },

    /// Manage monitored accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CreativeCommands {
    /// Add an active creative
    Add {
        #[arg(long)]
        name: String,

        /// Reply text
        #[arg(long)]
        content: String,

        #[arg(long, default_value = "hackathon")]
        category: String,

        /// Higher priority creatives are picked first
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },

    /// List creatives
    List {
        /// Only show this category
        #[arg(long)]
        category: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one creative, including its full text
    Show {
        id: i64,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Edit a creative in place; use count and history are kept
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        /// New reply text
        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        priority: Option<i64>,
    },

    /// Make a creative eligible for selection again
    Enable { id: i64 },

    /// Stop selecting a creative
    Disable { id: i64 },

    /// Delete a creative that was never used in a reply
    Remove { id: i64 },
}

#[derive(Subcommand, Debug)]
enum AccountCommands {
    /// Start monitoring an account
    Add {
        /// Platform user id
        id: String,

        /// Handle without the leading @
        handle: String,

        /// Display name (defaults to the handle)
        #[arg(long)]
        name: Option<String>,
    },

    /// List monitored accounts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resume monitoring an account
    Enable { id: String },

    /// Stop monitoring an account
    Disable { id: String },

    /// Forget an account; a later sync re-adds it if it is still followed
    Remove { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(XbotError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            other
        ))),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run {
            tweet_count,
            dry_run,
            format,
        } => {
            let format = parse_format(&format)?;
            let service = XbotService::from_config(config).await?;
            let report = service.run(RunParams { tweet_count, dry_run }).await?;
            print_run_report(&report, format);
        }
        Commands::Sync { format } => {
            let format = parse_format(&format)?;
            let service = XbotService::from_config(config).await?;
            let report = service.sync_following().await?;
            match format {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    let source = match report.source {
                        SyncSource::Platform => "platform",
                        SyncSource::Database => "database",
                    };
                    println!("Synced {} account(s) from {}", report.total, source);
                    if let Some(note) = &report.note {
                        println!("Note: {}", note);
                    }
                }
            }
        }
        Commands::Stats { format } => {
            let format = parse_format(&format)?;
            let db = open_database(&config).await?;
            let stats = db.reply_stats().await?;
            match format {
                OutputFormat::Json => print_json(&stats),
                OutputFormat::Text => {
                    println!("Total: {}", stats.total_count);
                    println!("  Success: {}", stats.success_count);
                    println!("  Failed: {}", stats.failed_count);
                    println!("  Skipped: {}", stats.skipped_count);
                    println!("  Dry run: {}", stats.dry_run_count);
                    println!("Relevant: {}", stats.relevant_count);
                    println!(
                        "Today: {} ({} successful of {} allowed)",
                        stats.today_count,
                        stats.today_success_count,
                        config.workflow.max_daily_replies
                    );
                }
            }
        }
        Commands::Logs { limit, format } => {
            let format = parse_format(&format)?;
            let db = open_database(&config).await?;
            let records = db
                .recent_reply_records(libxbot::service::clamp_recent_limit(limit))
                .await?;
            match format {
                OutputFormat::Json => print_json(&records),
                OutputFormat::Text => records.iter().for_each(print_record),
            }
        }
        Commands::Creative { command } => {
            let db = open_database(&config).await?;
            cmd_creative(&db, command).await?;
        }
        Commands::Account { command } => {
            let db = open_database(&config).await?;
            cmd_account(&db, command).await?;
        }
    }

    Ok(())
}

/// Management commands only need the database, not platform credentials.
async fn open_database(config: &Config) -> Result<Database> {
    let path = resolve_db_path(&config.database.path);
    Database::new(&path.to_string_lossy()).await
}

async fn cmd_creative(db: &Database, command: CreativeCommands) -> Result<()> {
    match command {
        CreativeCommands::Add {
            name,
            content,
            category,
            priority,
        } => {
            let creative = db
                .create_creative(&NewCreative {
                    name,
                    content,
                    category,
                    priority,
                })
                .await?;
            println!("Created creative {} ({})", creative.id, creative.name);
        }
        CreativeCommands::List { category, format } => {
            let format = parse_format(&format)?;
            let creatives = db.list_creatives(category.as_deref()).await?;
            match format {
                OutputFormat::Json => print_json(&creatives),
                OutputFormat::Text => creatives.iter().for_each(print_creative),
            }
        }
        CreativeCommands::Show { id, format } => {
            let format = parse_format(&format)?;
            let creative = db.get_creative(id).await?;
            match format {
                OutputFormat::Json => print_json(&creative),
                OutputFormat::Text => {
                    print_creative(&creative);
                    println!("{}", creative.content);
                }
            }
        }
        CreativeCommands::Update {
            id,
            name,
            content,
            category,
            priority,
        } => {
            let update = CreativeUpdate {
                name,
                content,
                category,
                priority,
                active: None,
            };
            let creative = db.update_creative(id, &update).await?;
            println!("Updated creative {} ({})", creative.id, creative.name);
        }
        CreativeCommands::Enable { id } => {
            db.set_creative_active(id, true).await?;
            println!("Creative {} enabled", id);
        }
        CreativeCommands::Disable { id } => {
            db.set_creative_active(id, false).await?;
            println!("Creative {} disabled", id);
        }
        CreativeCommands::Remove { id } => {
            db.delete_creative(id).await?;
            println!("Creative {} removed", id);
        }
    }
    Ok(())
}

async fn cmd_account(db: &Database, command: AccountCommands) -> Result<()> {
    match command {
        AccountCommands::Add { id, handle, name } => {
            let handle = handle.trim_start_matches('@').to_string();
            let mut account = Account::new(id, handle);
            if let Some(name) = name {
                account.display_name = name;
            }
            db.add_account(&account).await?;
            println!("Added account @{} ({})", account.handle, account.platform_id);
        }
        AccountCommands::List { format } => {
            let format = parse_format(&format)?;
            let accounts = db.list_accounts().await?;
            match format {
                OutputFormat::Json => print_json(&accounts),
                OutputFormat::Text => {
                    for account in &accounts {
                        println!(
                            "{} | @{} | {} | {}",
                            account.platform_id,
                            account.handle,
                            account.display_name,
                            if account.active { "active" } else { "inactive" }
                        );
                    }
                }
            }
        }
        AccountCommands::Enable { id } => {
            db.set_account_active(&id, true).await?;
            println!("Account {} enabled", id);
        }
        AccountCommands::Disable { id } => {
            db.set_account_active(&id, false).await?;
            println!("Account {} disabled", id);
        }
        AccountCommands::Remove { id } => {
            db.delete_account(&id).await?;
            println!("Account {} removed", id);
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("failed to encode output: {}", e),
    }
}

fn print_run_report(report: &RunReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(report);
        return;
    }

    println!("Accounts: {}", report.total_accounts);
    println!("Posts: {}", report.total_posts);
    println!("Relevant: {}", report.relevant_posts);
    println!("Replied: {}", report.successful_replies);
    println!("Failed: {}", report.failed_replies);
    println!("Skipped: {}", report.skipped_posts);
    for error in &report.errors {
        println!("error: {}", error);
    }
}

fn print_creative(creative: &Creative) {
    println!(
        "{} | {} | {} | priority {} | used {} | {}",
        creative.id,
        if creative.active { "active" } else { "inactive" },
        creative.category,
        creative.priority,
        creative.use_count,
        creative.name
    );
}

fn print_record(record: &ReplyRecord) {
    let when = chrono::DateTime::from_timestamp(record.created_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| record.created_at.to_string());
    println!(
        "{} | {} | {} | {}",
        when,
        record.status,
        record.source_post_id,
        truncate_content(&record.post_text, 50)
    );
}

/// Truncate content to max chars with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let head: String = content.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
