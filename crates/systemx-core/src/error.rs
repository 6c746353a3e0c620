//! Error types for the System X control core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Candidate source error: {0}")]
    Candidates(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Session calendar error: {0}")]
    Calendar(String),

    #[error("Adapter call timed out after {timeout_secs}s: {operation}")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Order error: {message}")]
    Order { message: String },
}

impl Error {
    /// Transient errors are retried with backoff; the rest fail the step
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout { .. }
                | Error::Broker(_)
                | Error::MarketData(_)
                | Error::Candidates(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
