//! Error types for Socialcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The record was not in the state the operation requires
    #[error("Invalid state: {0}")]
    StateViolation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
}

impl SocialcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SocialcastError::InvalidInput(_)
            | SocialcastError::NotFound(_)
            | SocialcastError::StateViolation(_) => 3,
            SocialcastError::Config(_) | SocialcastError::Database(_) => 2,
            SocialcastError::Platform(_)
            | SocialcastError::Unauthorized(_)
            | SocialcastError::RateLimited(_) => 1,
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
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors raised while talking to a single platform
///
/// These never abort a fan-out: the publisher turns each one into a failed
/// attempt result for the platform that raised it.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("File error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Network(e.to_string())
    }
}
