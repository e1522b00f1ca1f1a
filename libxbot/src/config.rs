//! Configuration management for xbot
//!
//! The configuration is a single TOML file. String values written as
//! `${NAME}` are replaced with the value of the environment variable `NAME`
//! at load time, so secrets can stay out of the file. Durations are written
//! in human form (`"30s"`, `"2m"`).

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path", deserialize_with = "env_string")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token required on `/api/v1`; unset or empty disables the check.
    #[serde(default, deserialize_with = "optional_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_shutdown_grace", deserialize_with = "duration")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_key: None,
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Credentials and endpoint for the social platform's v2 API.
#[derive(Debug, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_base_url", deserialize_with = "env_string")]
    pub base_url: String,
    #[serde(default, deserialize_with = "env_string")]
    pub consumer_key: String,
    #[serde(default = "empty_secret", deserialize_with = "secret")]
    pub consumer_secret: SecretString,
    #[serde(default, deserialize_with = "env_string")]
    pub access_token: String,
    #[serde(default = "empty_secret", deserialize_with = "secret")]
    pub access_secret: SecretString,
    #[serde(default = "default_platform_timeout", deserialize_with = "duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierProvider {
    #[default]
    #[serde(alias = "open_ai")]
    OpenAi,
    Gemini,
}

impl std::fmt::Display for ClassifierProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierProvider::OpenAi => write!(f, "openai"),
            ClassifierProvider::Gemini => write!(f, "gemini"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub provider: ClassifierProvider,
    #[serde(default = "empty_secret", deserialize_with = "secret")]
    pub api_key: SecretString,
    #[serde(deserialize_with = "env_string")]
    pub model: String,
    /// Provider endpoint; each provider has its own public default.
    #[serde(default, deserialize_with = "optional_env_string")]
    pub base_url: Option<String>,
    #[serde(default = "default_classifier_timeout", deserialize_with = "duration")]
    pub timeout: Duration,
    /// Additional attempts after the first failed one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_tweet_count")]
    pub default_tweet_count: u32,
    #[serde(default = "default_max_daily_replies")]
    pub max_daily_replies: i64,
    #[serde(default = "crate::types::default_category")]
    pub category: String,
    #[serde(default)]
    pub enable_scheduler: bool,
    /// Six-field cron expression (seconds first).
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_tweet_count: default_tweet_count(),
            max_daily_replies: default_max_daily_replies(),
            category: crate::types::default_category(),
            enable_scheduler: false,
            schedule: default_schedule(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.classifier.model.trim().is_empty() {
            return Err(ConfigError::MissingField("classifier.model".to_string()).into());
        }
        if self.workflow.max_daily_replies < 0 {
            return Err(ConfigError::InvalidValue {
                field: "workflow.max_daily_replies".to_string(),
                reason: "must not be negative".to_string(),
            }
            .into());
        }
        if self.workflow.default_tweet_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workflow.default_tweet_count".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// The API key guarding the admin endpoints, if one is configured.
    pub fn admin_api_key(&self) -> Option<&str> {
        self.server
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.is_empty())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("XBOT_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("xbot").join("config.toml"))
}

/// Resolve the database path: `XBOT_DB_PATH` wins over the config file.
pub fn resolve_db_path(configured: &str) -> PathBuf {
    let raw = std::env::var("XBOT_DB_PATH").unwrap_or_else(|_| configured.to_string());
    PathBuf::from(shellexpand::tilde(&raw).to_string())
}

/// Replace a whole-value `${NAME}` placeholder with the environment value.
pub fn resolve_env(value: &str) -> String {
    match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(key) => std::env::var(key).unwrap_or_default(),
        None => value.to_string(),
    }
}

fn env_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    let raw = String::deserialize(d)?;
    Ok(resolve_env(&raw))
}

fn optional_env_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.map(|v| resolve_env(&v)).filter(|v| !v.is_empty()))
}

fn secret<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<SecretString, D::Error> {
    let raw = String::deserialize(d)?;
    Ok(SecretString::from(resolve_env(&raw)))
}

fn optional_secret<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<SecretString>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw
        .map(|v| resolve_env(&v))
        .filter(|v| !v.is_empty())
        .map(SecretString::from))
}

fn duration<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    let raw = String::deserialize(d)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_db_path() -> String {
    "~/.local/share/xbot/xbot.db".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_platform_base_url() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_platform_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_classifier_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}

fn default_tweet_count() -> u32 {
    10
}

fn default_max_daily_replies() -> i64 {
    50
}

fn default_schedule() -> String {
    "0 0 */2 * * *".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
