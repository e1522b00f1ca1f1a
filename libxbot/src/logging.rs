//! Logging setup shared by `xbot-serve` and `xbot-ctl`
//!
//! Everything goes to stderr so stdout stays clean for command output.
//! `RUST_LOG` always wins over the configured level; `XBOT_LOG_FORMAT` and
//! `XBOT_LOG_LEVEL` override the `[logging]` section.
//!
//! ```no_run
//! use libxbot::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain single-line output without targets
    Text,
    /// One JSON object per event, span fields flattened in
    Json,
    /// Multi-line output with file and line, for local debugging
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!(
                "unknown log format '{}' (expected text, json or pretty)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level or full `EnvFilter` directive, e.g. `info,libxbot=debug`
    pub level: String,
    /// Forces `debug` regardless of `level`
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Settings for the daemon: the config file section, overridden by the
    /// environment. An unparseable format falls back to text.
    pub fn from_section(section: &LoggingSection, verbose: bool) -> Self {
        let format = std::env::var("XBOT_LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .or_else(|| section.format.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var("XBOT_LOG_LEVEL").unwrap_or_else(|_| section.level.clone());

        Self::new(format, level, verbose)
    }

    /// The directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }

    /// Install the global subscriber. A second call leaves the first
    /// subscriber in place and reports it on stderr.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => builder.with_target(false).try_init(),
        };

        if let Err(e) = installed {
            eprintln!("logging already initialized: {}", e);
        }
    }
}
