//! Query and CDC options

use crate::event::{ceil_micros, floor_micros, Event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of events per CDC batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Structural filters for [`EventLog::query`](super::EventLog::query)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Filter by entity type
    pub entity_type: Option<String>,
    /// Filter by entity id
    pub entity_id: Option<String>,
    /// Filter by verb
    pub verb: Option<String>,
    /// Inclusive lower timestamp bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper timestamp bound
    pub until: Option<DateTime<Utc>>,
    /// Maximum results (unbounded when `None`)
    pub limit: Option<usize>,
    /// Results to skip
    pub offset: usize,
}

impl EventQuery {
    /// Create an unfiltered query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entity type filter
    #[must_use]
    pub fn for_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    /// Set the entity filter
    #[must_use]
    pub fn for_entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    /// Set the verb filter
    #[must_use]
    pub fn with_verb(mut self, verb: &str) -> Self {
        self.verb = Some(verb.to_string());
        self
    }

    /// Set the inclusive lower bound
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the inclusive upper bound
    #[must_use]
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Set pagination
    #[must_use]
    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Lower bound at stored precision
    #[must_use]
    pub fn since_bound(&self) -> Option<DateTime<Utc>> {
        self.since.map(ceil_micros)
    }

    /// Upper bound at stored precision
    #[must_use]
    pub fn until_bound(&self) -> Option<DateTime<Utc>> {
        self.until.map(floor_micros)
    }

    /// Check the structural filters against one event
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        self.entity_type
            .as_deref()
            .map_or(true, |t| t == event.entity_type)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |id| id == event.entity_id)
            && self.verb.as_deref().map_or(true, |v| v == event.verb)
            && self.since_bound().map_or(true, |since| event.timestamp >= since)
            && self.until_bound().map_or(true, |until| event.timestamp <= until)
    }
}

/// Positioning and filtering for one CDC poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdcOptions {
    /// Resume strictly after this event id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Only events at or after this time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Entity type allow-list (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Verb allow-list (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<String>,
    /// Maximum events per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for CdcOptions {
    fn default() -> Self {
        Self {
            after: None,
            since: None,
            types: Vec::new(),
            verbs: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CdcOptions {
    /// Create options starting at the beginning of the log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after a cursor. An empty cursor means "from the start".
    #[must_use]
    pub fn after(mut self, cursor: &str) -> Self {
        self.after = (!cursor.is_empty()).then(|| cursor.to_string());
        self
    }

    /// Only events at or after `since`
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Restrict to entity types
    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to verbs
    #[must_use]
    pub fn with_verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verbs = verbs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the batch size
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Batch size actually used (never zero)
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Lower bound at stored precision
    #[must_use]
    pub fn since_bound(&self) -> Option<DateTime<Utc>> {
        self.since.map(ceil_micros)
    }

    /// Check the `since`, `types` and `verbs` filters (not the cursor)
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        self.since_bound().map_or(true, |since| event.timestamp >= since)
            && (self.types.is_empty() || self.types.iter().any(|t| *t == event.entity_type))
            && (self.verbs.is_empty() || self.verbs.iter().any(|v| *v == event.verb))
    }
}

/// One CDC batch: `{ events, cursor, hasMore }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdcBatch {
    /// Events in `(timestamp, id)` order
    pub events: Vec<Event>,
    /// Id of the last returned event, or the prior cursor if none returned
    pub cursor: String,
    /// Whether more eligible events exist after this batch
    pub has_more: bool,
}

impl CdcBatch {
    /// Build a batch from up to `batch_size + 1` ordered candidates
    pub(crate) fn from_candidates(
        mut candidates: Vec<Event>,
        options: &CdcOptions,
    ) -> Self {
        let batch_size = options.effective_batch_size();
        let has_more = candidates.len() > batch_size;
        candidates.truncate(batch_size);

        let cursor = candidates
            .last()
            .map(|e| e.id.clone())
            .or_else(|| options.after.clone())
            .unwrap_or_default();

        Self {
            events: candidates,
            cursor,
            has_more,
        }
    }

    /// Whether the batch carries no events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
