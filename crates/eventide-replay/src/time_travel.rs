//! TimeTraveler - Point-in-time entity reconstruction
//!
//! State is a pure fold over an entity's history: each event's `after`
//! snapshot is shallow-merged onto the accumulated fields. A `delete` keeps
//! the last known fields and sets [`EntityState::deleted`].

use chrono::{DateTime, Utc};
use eventide_core::event::timestamp_format;
use eventide_core::{Event, EventLog, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Options for [`TimeTraveler::as_of`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsOfOptions {
    /// Inclusive upper bound; `None` means the latest state
    pub as_of: Option<DateTime<Utc>>,
}

impl AsOfOptions {
    /// Reconstruct the latest state
    #[must_use]
    pub fn latest() -> Self {
        Self::default()
    }

    /// Reconstruct the state as of `timestamp`
    #[must_use]
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            as_of: Some(timestamp),
        }
    }
}

/// Reconstructed entity state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Entity type
    pub entity_type: String,
    /// Entity identifier
    pub entity_id: String,
    /// Merged field values
    pub fields: Map<String, Value>,
    /// Sequence of the last folded event
    pub sequence: i64,
    /// Timestamp of the last folded event
    #[serde(with = "timestamp_format")]
    pub last_event_at: DateTime<Utc>,
    /// Whether the last lifecycle event was a delete
    pub deleted: bool,
}

impl EntityState {
    fn empty(event: &Event) -> Self {
        Self {
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id.clone(),
            fields: Map::new(),
            sequence: 0,
            last_event_at: event.timestamp,
            deleted: false,
        }
    }

    fn apply(&mut self, event: &Event) {
        if let Some(Value::Object(after)) = &event.after {
            for (key, value) in after {
                self.fields.insert(key.clone(), value.clone());
            }
        }
        match event.verb.as_str() {
            "delete" => self.deleted = true,
            "create" => self.deleted = false,
            _ => {}
        }
        self.sequence = event.sequence;
        self.last_event_at = event.timestamp;
    }

    /// Field value by name
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Fold an ordered slice of one entity's events
fn fold(events: &[Event]) -> Option<EntityState> {
    let mut state = EntityState::empty(events.first()?);
    for event in events {
        state.apply(event);
    }
    Some(state)
}

fn until(events: &[Event], as_of: Option<DateTime<Utc>>) -> &[Event] {
    match as_of {
        // history is in sequence order, which is also timestamp order
        Some(bound) => {
            let end = events.partition_point(|e| e.timestamp <= bound);
            &events[..end]
        }
        None => events,
    }
}

/// How a field differs between two reconstructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only in the later state
    Added,
    /// Present only in the earlier state
    Removed,
    /// Present in both with different values
    Changed,
}

/// One field difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name
    pub field: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Earlier value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    /// Later value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

/// Reconstructs entity state from an event log
#[derive(Clone)]
pub struct TimeTraveler {
    log: Arc<dyn EventLog>,
}

impl TimeTraveler {
    /// Create a traveler over a log
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// State of an entity as of a timestamp (inclusive), or `None` if the
    /// entity had no events by then
    #[instrument(skip(self))]
    pub async fn as_of(
        &self,
        entity_type: &str,
        entity_id: &str,
        options: AsOfOptions,
    ) -> Result<Option<EntityState>> {
        let history = self.log.entity_history(entity_type, entity_id).await?;
        let state = fold(until(&history, options.as_of));
        debug!(found = state.is_some(), "Reconstructed {entity_type}/{entity_id}");
        Ok(state)
    }

    /// Field-by-field differences between two points in time
    ///
    /// A missing reconstruction counts as an entity with no fields. Changes
    /// are ordered by field name.
    #[instrument(skip(self))]
    pub async fn diff(
        &self,
        entity_type: &str,
        entity_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<FieldChange>> {
        let history = self.log.entity_history(entity_type, entity_id).await?;
        let empty = Map::new();
        let earlier = fold(until(&history, from));
        let later = fold(until(&history, to));
        let before = earlier.as_ref().map_or(&empty, |s| &s.fields);
        let after = later.as_ref().map_or(&empty, |s| &s.fields);

        Ok(diff_fields(before, after))
    }

    /// State after each event, in sequence order
    #[instrument(skip(self))]
    pub async fn history_states(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<EntityState>> {
        let history = self.log.entity_history(entity_type, entity_id).await?;
        let Some(first) = history.first() else {
            return Ok(Vec::new());
        };

        let mut state = EntityState::empty(first);
        Ok(history
            .iter()
            .map(|event| {
                state.apply(event);
                state.clone()
            })
            .collect())
    }
}

fn diff_fields(before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<FieldChange> {
    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let old = before.get(name);
            let new = after.get(name);
            let kind = match (old, new) {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(a), Some(b)) if a != b => ChangeKind::Changed,
                _ => return None,
            };
            Some(FieldChange {
                field: name.clone(),
                kind,
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect()
}
