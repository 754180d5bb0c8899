//! Error types for the calis_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for calis_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer error (missing paths, lock failures)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Deferred wake-up registration or delivery error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
