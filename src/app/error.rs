use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("All fetch attempts failed for {url} ({attempts} attempts)")]
    FetchExhausted { url: String, attempts: u32 },

    #[error("No extraction pattern matched")]
    NoPatternFound,

    #[error("AI quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Pattern store is corrupt: {0}")]
    CorruptPatternStore(String),

    #[error("AI service unavailable after {attempts} attempts: {message}")]
    TransientService { attempts: u32, message: String },

    #[error("AI service error: {0}")]
    Service(String),

    #[error("Invalid selector spec: {0}")]
    InvalidSelector(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Task join error: {0}")]
    Task(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<url::ParseError> for MurmurError {
    fn from(e: url::ParseError) -> Self {
        MurmurError::InvalidUrl(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MurmurError>;
