//! Eventide Core - Entity Event Log
//!
//! This crate provides the append-only event log for entity mutations:
//! - Event: Event record, append input and verb conjugation
//! - Pattern: Glob matching of `{entity}.{event}` types
//! - Handler: In-process subscribers and the per-log registry
//! - Store: The `EventLog` contract with in-memory and SQLite backends

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod handler;
pub mod pattern;
pub mod store;

pub use error::{Error, Result};
pub use event::{format_timestamp, now, parse_timestamp, AppendInput, Conjugation, Event};
pub use handler::{
    handler_fn, invoke_isolated, EventHandler, HandlerError, HandlerResult, NotifyReport,
    SubscriberRegistry, Unsubscribe,
};
pub use pattern::{matches_pattern, Matcher, Pattern};
pub use store::{
    default_data_dir, default_db_path, CdcBatch, CdcOptions, EventLog, EventQuery,
    MemoryEventLog, SqliteEventLog, SqliteOptions, DEFAULT_BATCH_SIZE, DEFAULT_TABLE,
};
