// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The job board could not be reached or rejected an update.
    #[error("Coordination error: {message}")]
    Coordination { message: String },

    /// A blocked fetch exhausted the backoff budget.
    #[error("Still blocked after waiting {waited_secs}s")]
    BlockedTooLong { waited_secs: u64 },

    /// Too many malformed responses in a row.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a coordination error.
    pub fn coordination(message: impl fmt::Display) -> Self {
        Self::Coordination {
            message: message.to_string(),
        }
    }

    /// Create an unexpected-response error.
    pub fn unexpected(message: impl fmt::Display) -> Self {
        Self::UnexpectedResponse {
            message: message.to_string(),
        }
    }
}
