//! Common error types for PTK

use thiserror::Error;

/// Common result type for PTK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across PTK crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (wire frames, stored payloads)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid client input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write rejected by a store uniqueness constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Identity could not be verified
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Identity verified but not allowed to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
