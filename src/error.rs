//! Error types for prowl.

use chrono::{DateTime, Utc};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage-related errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors surfaced by the remote PR source.
///
/// The three variants drive three different poller reactions: client
/// errors stop the poller permanently, server errors back off 1.5x, and
/// rate limits back off 2x and persist a cooldown window.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Non-rate-limit 4xx-class failure (bad token, bad query). Fatal
    /// for the current credential.
    #[error("github returned client error: {0}")]
    Client(String),

    /// 5xx-class failure, transient.
    #[error("github returned server error: {0}")]
    Server(String),

    /// Rate limited; `until` is when requests may resume.
    #[error("github rate limited, resume at {until}")]
    RateLimited { until: DateTime<Utc> },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_display() {
        let err = FetchError::Client("response code 401".to_string());
        assert_eq!(err.to_string(), "github returned client error: response code 401");
    }

    #[test]
    fn store_error_wraps_into_top_level() {
        let err: Error = StoreError::Query("no such table".to_string()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("no such table"));
    }
}
