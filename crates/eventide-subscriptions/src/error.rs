//! Error types for eventide-subscriptions

use thiserror::Error;

/// Delivery error type
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Request could not be sent or timed out
    #[error("network error: {0}")]
    Network(String),

    /// Endpoint answered with a non-2xx status
    #[error("endpoint returned status {0}")]
    Status(u16),

    /// Payload could not be serialized or signed
    #[error("payload error: {0}")]
    Payload(String),

    /// Push transport failure
    #[error("push error: {0}")]
    Push(String),

    /// In-process handler failed or panicked
    #[error("handler error: {0}")]
    Handler(String),
}
