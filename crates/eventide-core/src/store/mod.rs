//! Store - Event log backends
//!
//! This module defines the [`EventLog`] contract and its two backends:
//! an in-memory log for tests and embedded use, and a SQLite log (via sqlx)
//! for durable storage. Both assign `id`, `sequence` and `timestamp` at
//! append time and notify in-process subscribers once the event is stored.

mod helpers;
mod memory;
mod query;
mod sqlite;
mod traits;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub use helpers::{default_data_dir, default_db_path};
pub use memory::MemoryEventLog;
pub use query::{CdcBatch, CdcOptions, EventQuery, DEFAULT_BATCH_SIZE};
pub use sqlite::{SqliteEventLog, SqliteOptions, DEFAULT_TABLE};
pub use traits::EventLog;

/// Next append timestamp for a backend.
///
/// Clamped to one microsecond past the previous one, so timestamps issued by
/// one backend are strictly increasing even when the wall clock stalls or
/// steps back.
pub(crate) fn next_timestamp(last: &mut Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = crate::event::now();
    let ts = match *last {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    };
    *last = Some(ts);
    ts
}

/// Time-ordered, globally unique event id
pub(crate) fn new_event_id() -> String {
    Uuid::now_v7().to_string()
}
