//! Trait for event log backends

use super::query::{CdcBatch, CdcOptions, EventQuery};
use crate::error::Result;
use crate::event::{AppendInput, Event};
use crate::handler::{EventHandler, Unsubscribe};
use std::sync::Arc;

/// Append-only event log contract
///
/// This trait allows different storage implementations (SQLite, in-memory)
/// to be used interchangeably. Every backend must behave identically as
/// observed through these methods.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event, assigning `id`, `sequence` and `timestamp`.
    ///
    /// Matching subscribers are invoked before this returns; their failures
    /// are logged and never surface here. Storage failures do.
    async fn append(&self, input: AppendInput) -> Result<Event>;

    /// Get an event by id
    async fn get(&self, id: &str) -> Result<Option<Event>>;

    /// Filtered events ordered by `(timestamp, sequence)`
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// All events of one entity ordered by `sequence`
    async fn entity_history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>>;

    /// Register a pattern-matched subscriber
    fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Unsubscribe;

    /// Total number of stored events
    async fn size(&self) -> Result<u64>;

    /// One cursor-positioned batch in `(timestamp, id)` order
    async fn cdc(&self, options: &CdcOptions) -> Result<CdcBatch>;

    /// Get the backend name (for logging)
    fn name(&self) -> &str;
}
