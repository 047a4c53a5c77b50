//! Error types for eventide-core

use thiserror::Error;

/// Event log error type
#[derive(Debug, Error)]
pub enum Error {
    /// CDC cursor does not reference a stored event
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Subscription registration rejected
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// Replay handler failed
    #[error("handler error: {0}")]
    Handler(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
