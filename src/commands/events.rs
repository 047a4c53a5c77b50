//! Event log commands

use super::{parse_json, parse_time, print_json};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use eventide_core::{handler_fn, AppendInput, EventLog, EventQuery};
use eventide_replay::{EventBus, ReplayFilter};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct AppendArgs {
    pub entity_type: String,
    pub entity_id: String,
    /// Verb (create, update, delete or a custom transition)
    pub verb: String,
    /// Caller payload
    #[arg(long, value_parser = parse_json)]
    pub data: Option<serde_json::Value>,
    /// Field state before the mutation
    #[arg(long, value_parser = parse_json)]
    pub before: Option<serde_json::Value>,
    /// Field state after the mutation
    #[arg(long, value_parser = parse_json)]
    pub after: Option<serde_json::Value>,
    #[arg(long)]
    pub context: Option<String>,
    #[arg(long)]
    pub actor: Option<String>,
}

impl AppendArgs {
    fn into_input(self) -> AppendInput {
        let mut input = AppendInput::new(self.entity_type, self.entity_id, self.verb);
        input.data = self.data;
        input.before = self.before;
        input.after = self.after;
        input.context = self.context;
        input.actor = self.actor;
        input
    }
}

#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Entity type
    #[arg(long = "type")]
    pub entity_type: Option<String>,
    /// Entity id (requires --type)
    #[arg(long = "id", requires = "entity_type")]
    pub entity_id: Option<String>,
    #[arg(long)]
    pub verb: Option<String>,
    /// Inclusive lower time bound (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper time bound (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub until: Option<DateTime<Utc>>,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

impl QueryArgs {
    pub fn to_query(&self) -> EventQuery {
        EventQuery {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            verb: self.verb.clone(),
            since: self.since,
            until: self.until,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// Event type pattern, e.g. `Contact.*` or `*.created,!Deal.*`
    #[arg(long)]
    pub pattern: Option<String>,
}

pub async fn append(log: &dyn EventLog, args: AppendArgs) -> Result<()> {
    let input = args.into_input();
    if input.entity_type.is_empty() || input.entity_id.is_empty() || input.verb.is_empty() {
        bail!("entity type, entity id and verb must not be empty");
    }
    let event = log.append(input).await?;
    info!(id = %event.id, sequence = event.sequence, "Appended {}", event.event_type);
    print_json(&event)
}

pub async fn get(log: &dyn EventLog, id: &str) -> Result<()> {
    match log.get(id).await? {
        Some(event) => print_json(&event),
        None => bail!("event not found: {id}"),
    }
}

pub async fn history(log: &dyn EventLog, entity_type: &str, entity_id: &str) -> Result<()> {
    for event in log.entity_history(entity_type, entity_id).await? {
        print_json(&event)?;
    }
    Ok(())
}

pub async fn query(log: &dyn EventLog, args: QueryArgs) -> Result<()> {
    for event in log.query(&args.to_query()).await? {
        print_json(&event)?;
    }
    Ok(())
}

pub async fn replay(log: Arc<dyn EventLog>, args: ReplayArgs) -> Result<()> {
    let bus = EventBus::new(log);
    let mut filter = ReplayFilter::new(args.query.to_query());
    filter.pattern = args.pattern;

    let printer = handler_fn(|event| async move {
        println!("{}", serde_json::to_string(&event)?);
        Ok(())
    });
    let count = bus.replay(&filter, printer.as_ref()).await?;
    info!(count, "Replay complete");
    Ok(())
}

pub async fn stats(log: &dyn EventLog) -> Result<()> {
    print_json(&json!({
        "backend": log.name(),
        "events": log.size().await?,
    }))
}
