//! Push - Live-connection delivery seam
//!
//! Connection management lives outside this crate. The manager only selects
//! eligible subscriptions and hands each event to a [`PushTransport`].

use crate::error::DeliveryError;
use async_trait::async_trait;
use eventide_core::Event;
use tracing::debug;

/// Pushes an event to a connected client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver `event` to the connection identified by `endpoint`
    async fn push(&self, endpoint: &str, event: &Event) -> Result<(), DeliveryError>;
}

/// Transport used when no connection layer is wired; accepts every push
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPush;

#[async_trait]
impl PushTransport for NoopPush {
    async fn push(&self, endpoint: &str, event: &Event) -> Result<(), DeliveryError> {
        debug!(endpoint, event_id = %event.id, "No push transport; dropping {}", event.event_type);
        Ok(())
    }
}
