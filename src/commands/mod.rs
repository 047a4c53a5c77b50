//! CLI module for Eventide
//!
//! Provides operator commands over the configured event log:
//! - `append`, `get`, `history`, `query`, `replay`, `stats`: the log itself
//! - `as-of`, `diff`: point-in-time reconstruction
//! - `poll`, `tail`: the CDC feed, optionally forwarded to a webhook
//!
//! Results are printed to stdout as JSON lines; logs go to stderr.

use crate::settings::{EventideConfig, StorageBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use eventide_core::{parse_timestamp, EventLog, MemoryEventLog, SqliteEventLog};
use serde::Serialize;
use std::sync::Arc;

pub mod events;
pub mod feed;
pub mod travel;

/// Eventide CLI
#[derive(Parser, Debug)]
#[command(name = "eventide")]
#[command(about = "Entity event log, time travel and change feed")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Append an event
    Append(events::AppendArgs),
    /// Show one event by id
    Get {
        /// Event id
        id: String,
    },
    /// Show an entity's history in sequence order
    History {
        entity_type: String,
        entity_id: String,
    },
    /// Query events
    Query(events::QueryArgs),
    /// Re-read history in log order, optionally filtered by pattern
    Replay(events::ReplayArgs),
    /// Backend and event count
    Stats,
    /// Reconstruct an entity as of a point in time
    AsOf(travel::AsOfArgs),
    /// Field changes of an entity between two points in time
    Diff(travel::DiffArgs),
    /// Fetch one CDC batch
    Poll(feed::PollArgs),
    /// Follow the CDC feed
    Tail(feed::TailArgs),
}

/// Run the CLI command
pub async fn run(cli: Cli, config: EventideConfig) -> Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let log = open_log(&config).await?;
    match command {
        Commands::Append(args) => events::append(log.as_ref(), args).await,
        Commands::Get { id } => events::get(log.as_ref(), &id).await,
        Commands::History {
            entity_type,
            entity_id,
        } => events::history(log.as_ref(), &entity_type, &entity_id).await,
        Commands::Query(args) => events::query(log.as_ref(), args).await,
        Commands::Replay(args) => events::replay(log, args).await,
        Commands::Stats => events::stats(log.as_ref()).await,
        Commands::AsOf(args) => travel::as_of(log, args).await,
        Commands::Diff(args) => travel::diff(log, args).await,
        Commands::Poll(args) => feed::poll(log, &config, args).await,
        Commands::Tail(args) => feed::tail(log, &config, args).await,
    }
}

/// Open the configured event log backend
pub async fn open_log(config: &EventideConfig) -> Result<Arc<dyn EventLog>> {
    Ok(match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryEventLog::new()),
        StorageBackend::Sqlite => {
            let path = config.storage.db_path();
            let log = SqliteEventLog::from_path(&path, config.storage.sqlite_options())
                .await
                .with_context(|| format!("Failed to open event log at {}", path.display()))?;
            Arc::new(log)
        }
    })
}

/// Print one value as a JSON line
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub(crate) fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(s).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

pub(crate) fn parse_json(s: &str) -> std::result::Result<serde_json::Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}
