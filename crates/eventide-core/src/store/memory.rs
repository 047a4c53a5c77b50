//! MemoryEventLog - In-process event log

use super::query::{CdcBatch, CdcOptions, EventQuery};
use super::traits::EventLog;
use super::{new_event_id, next_timestamp};
use crate::error::{Error, Result};
use crate::event::{AppendInput, Event};
use crate::handler::{EventHandler, SubscriberRegistry, Unsubscribe};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, instrument};

#[derive(Default)]
struct MemoryState {
    /// Append order, which is also `(timestamp, id)` order
    events: Vec<Event>,
    by_id: HashMap<String, usize>,
    sequences: HashMap<(String, String), i64>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Event log held entirely in memory
///
/// Sequence, id and timestamp are assigned under one short write lock
/// together with the insert; subscribers run after the lock is released.
#[derive(Clone, Default)]
pub struct MemoryEventLog {
    state: Arc<RwLock<MemoryState>>,
    subscribers: SubscriberRegistry,
}

impl MemoryEventLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log with an injected subscriber registry
    #[must_use]
    pub fn with_registry(subscribers: SubscriberRegistry) -> Self {
        Self {
            state: Arc::default(),
            subscribers,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, input: AppendInput) -> Event {
        let mut guard = self.write();
        let state = &mut *guard;

        let key = (input.entity_type.clone(), input.entity_id.clone());
        let sequence = state.sequences.get(&key).copied().unwrap_or(0) + 1;
        let timestamp = next_timestamp(&mut state.last_timestamp);
        let event = Event::from_input(input, new_event_id(), sequence, timestamp);

        state.sequences.insert(key, sequence);
        state.by_id.insert(event.id.clone(), state.events.len());
        state.events.push(event.clone());
        event
    }
}

#[async_trait::async_trait]
impl EventLog for MemoryEventLog {
    #[instrument(skip(self, input), fields(entity_type = %input.entity_type, entity_id = %input.entity_id, verb = %input.verb))]
    async fn append(&self, input: AppendInput) -> Result<Event> {
        let event = self.insert(input);
        debug!(
            event_id = %event.id,
            sequence = event.sequence,
            "Appended event {}",
            event.event_type
        );

        self.subscribers.notify(&event).await;
        Ok(event)
    }

    async fn get(&self, id: &str) -> Result<Option<Event>> {
        let state = self.read();
        Ok(state.by_id.get(id).map(|&index| state.events[index].clone()))
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read()
            .events
            .iter()
            .filter(|e| query.accepts(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| (a.timestamp, a.sequence).cmp(&(b.timestamp, b.sequence)));

        let paged = events.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        })
    }

    async fn entity_history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read()
            .events
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Unsubscribe {
        self.subscribers.subscribe(pattern, handler)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.read().events.len() as u64)
    }

    async fn cdc(&self, options: &CdcOptions) -> Result<CdcBatch> {
        let state = self.read();

        let anchor = match options.after.as_deref() {
            Some(cursor) => {
                let index = state
                    .by_id
                    .get(cursor)
                    .ok_or_else(|| Error::InvalidCursor(cursor.to_string()))?;
                let event = &state.events[*index];
                Some((event.timestamp, event.id.clone()))
            }
            None => None,
        };

        let mut candidates: Vec<&Event> = state
            .events
            .iter()
            .filter(|e| {
                anchor
                    .as_ref()
                    .map_or(true, |(ts, id)| e.position() > (*ts, id.as_str()))
            })
            .filter(|e| options.accepts(e))
            .collect();
        candidates.sort_by(|a, b| a.position().cmp(&b.position()));

        let candidates = candidates
            .into_iter()
            .take(options.effective_batch_size() + 1)
            .cloned()
            .collect();

        Ok(CdcBatch::from_candidates(candidates, options))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
