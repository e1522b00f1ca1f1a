//! Error types for xbot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XbotError>;

/// Coarse classification of an error, used by the admin API and CLI to pick
/// status codes without matching on every nested variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Unauthorized,
    RateLimited,
    ExternalService,
    DailyLimitReached,
    Config,
    Database,
}

#[derive(Error, Debug)]
pub enum XbotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Daily reply limit reached ({0})")]
    DailyLimitReached(i64),
}

impl XbotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XbotError::Config(_) => ErrorKind::Config,
            XbotError::Database(_) => ErrorKind::Database,
            XbotError::Platform(e) => e.kind(),
            XbotError::Classifier(_) => ErrorKind::ExternalService,
            XbotError::NotFound(_) => ErrorKind::NotFound,
            XbotError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            XbotError::InvalidInput(_) => ErrorKind::InvalidInput,
            XbotError::Unauthorized(_) => ErrorKind::Unauthorized,
            XbotError::DailyLimitReached(_) => ErrorKind::DailyLimitReached,
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::NotFound => 3,
            ErrorKind::Unauthorized | ErrorKind::Config => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("{service} returned status {status}{}: {body}", hint_suffix(.status))]
    ExternalService {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Request signing failed: {0}")]
    Signing(String),
}

impl PlatformError {
    /// Build the error for a non-success HTTP status.
    pub fn from_status(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        PlatformError::ExternalService {
            service,
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::ExternalService { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.status() {
            Some(401) | Some(403) => ErrorKind::Unauthorized,
            Some(429) => ErrorKind::RateLimited,
            _ => ErrorKind::ExternalService,
        }
    }
}

/// Operator-facing hint for the status codes that usually mean a
/// configuration problem rather than a transient fault.
pub fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("credentials rejected; check the consumer key/secret and access token/secret"),
        403 => Some("permission denied; the app needs read and write access"),
        429 => Some("rate limited; wait for the window to reset"),
        _ => None,
    }
}

fn hint_suffix(status: &u16) -> String {
    status_hint(*status)
        .map(|hint| format!(" ({})", hint))
        .unwrap_or_default()
}

#[derive(Error, Debug, Clone)]
pub enum ClassifierError {
    #[error("{provider} API error: status={status}, body={body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClassifierError>,
    },
}

impl ClassifierError {
    /// Transport failures and non-200 responses are worth another attempt;
    /// a body we cannot understand will not get better by asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifierError::Status { .. } | ClassifierError::Network(_))
    }
}
