//! Time travel commands

use super::{parse_time, print_json};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use eventide_core::EventLog;
use eventide_replay::{AsOfOptions, TimeTraveler};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct AsOfArgs {
    pub entity_type: String,
    pub entity_id: String,
    /// Inclusive point in time (RFC 3339); latest state when omitted
    #[arg(long, value_parser = parse_time)]
    pub at: Option<DateTime<Utc>>,
    /// Print the state after every event instead
    #[arg(long, conflicts_with = "at")]
    pub timeline: bool,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    pub entity_type: String,
    pub entity_id: String,
    /// Earlier point in time (RFC 3339); latest state when omitted
    #[arg(long, value_parser = parse_time)]
    pub from: Option<DateTime<Utc>>,
    /// Later point in time (RFC 3339); latest state when omitted
    #[arg(long, value_parser = parse_time)]
    pub to: Option<DateTime<Utc>>,
}

pub async fn as_of(log: Arc<dyn EventLog>, args: AsOfArgs) -> Result<()> {
    let traveler = TimeTraveler::new(log);

    if args.timeline {
        for state in traveler
            .history_states(&args.entity_type, &args.entity_id)
            .await?
        {
            print_json(&state)?;
        }
        return Ok(());
    }

    let options = AsOfOptions { as_of: args.at };
    match traveler
        .as_of(&args.entity_type, &args.entity_id, options)
        .await?
    {
        Some(state) => print_json(&state),
        None => bail!(
            "no events for {}/{} at that time",
            args.entity_type,
            args.entity_id
        ),
    }
}

pub async fn diff(log: Arc<dyn EventLog>, args: DiffArgs) -> Result<()> {
    let changes = TimeTraveler::new(log)
        .diff(&args.entity_type, &args.entity_id, args.from, args.to)
        .await?;
    for change in &changes {
        print_json(change)?;
    }
    Ok(())
}
