//! Sortify error types

use thiserror::Error;

/// Sortify error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed classification input (empty or non-finite embedding)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vectors of different dimensions were combined
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding model error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Reasoning service failed or timed out
    #[error("Reasoning unavailable: {0}")]
    Reasoning(String),

    /// A voter could not produce an opinion
    #[error("Voter error: {0}")]
    Voter(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a caller contract violation rather than a
    /// degraded-collaborator condition.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::DimensionMismatch { .. })
    }
}

/// Result type alias for Sortify operations
pub type Result<T> = std::result::Result<T, Error>;
