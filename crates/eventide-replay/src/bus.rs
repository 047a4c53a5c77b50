//! EventBus - emit / on / once / off / replay over an event log
//!
//! The bus adds no storage of its own. Emitting appends to the wrapped log;
//! listening subscribes to it. The bus remembers which handler was registered
//! under which pattern so `off` can remove registrations selectively.

use async_trait::async_trait;
use eventide_core::{
    AppendInput, Error, Event, EventHandler, EventLog, EventQuery, HandlerResult, Matcher, Result,
    Unsubscribe,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tracing::debug;

/// Filter for [`EventBus::replay`]
#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    /// Structural filters passed to the log
    pub query: EventQuery,
    /// Optional glob applied to each event type after the query
    pub pattern: Option<String>,
}

impl ReplayFilter {
    /// Replay everything the query returns
    #[must_use]
    pub fn new(query: EventQuery) -> Self {
        Self {
            query,
            pattern: None,
        }
    }

    /// Also require the event type to match `pattern`
    #[must_use]
    pub fn matching(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }
}

struct Registration {
    pattern: String,
    handler: Arc<dyn EventHandler>,
    unsubscribe: Unsubscribe,
}

type Registrations = Mutex<Vec<Registration>>;

fn lock(registrations: &Registrations) -> MutexGuard<'_, Vec<Registration>> {
    registrations.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Convenience layer over an [`EventLog`]
pub struct EventBus {
    log: Arc<dyn EventLog>,
    registrations: Arc<Registrations>,
}

impl EventBus {
    /// Wrap a log
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self {
            log,
            registrations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The wrapped log
    #[must_use]
    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        lock(&self.registrations)
    }

    /// Record a registration for `off`, dropping entries whose log
    /// subscription is already gone.
    fn remember(&self, pattern: &str, handler: Arc<dyn EventHandler>, unsubscribe: &Unsubscribe) {
        let mut registrations = self.registrations();
        registrations.retain(|r| r.unsubscribe.is_active());
        if unsubscribe.is_active() {
            registrations.push(Registration {
                pattern: pattern.to_string(),
                handler,
                unsubscribe: unsubscribe.clone(),
            });
        }
    }

    /// Append an event to the log
    pub async fn emit(&self, input: AppendInput) -> Result<Event> {
        self.log.append(input).await
    }

    /// Listen for events matching `pattern`
    pub fn on(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Unsubscribe {
        let unsubscribe = self.log.subscribe(pattern, Arc::clone(&handler));
        self.remember(pattern, handler, &unsubscribe);
        unsubscribe
    }

    /// Listen for the first matching event only
    pub fn once(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Unsubscribe {
        let wrapper = Arc::new(OnceHandler {
            fired: AtomicBool::new(false),
            inner: Arc::clone(&handler),
            unsubscribe: OnceLock::new(),
            registrations: Arc::downgrade(&self.registrations),
        });

        let unsubscribe = self.log.subscribe(pattern, wrapper.clone());
        let _ = wrapper.unsubscribe.set(unsubscribe.clone());
        if wrapper.fired.load(Ordering::SeqCst) {
            // Fired between subscribe and set; it could not remove itself.
            unsubscribe.unsubscribe();
        }

        self.remember(pattern, handler, &unsubscribe);
        unsubscribe
    }

    /// Remove a handler's registrations.
    ///
    /// With a pattern, only registrations under that exact pattern are
    /// removed; without one, every registration of the handler is. Returns
    /// how many registrations were removed.
    pub fn off(&self, pattern: Option<&str>, handler: &Arc<dyn EventHandler>) -> usize {
        let mut registrations = self.registrations();
        let mut removed = 0;
        registrations.retain(|r| {
            let same_handler = std::ptr::addr_eq(Arc::as_ptr(&r.handler), Arc::as_ptr(handler));
            let same_pattern = pattern.map_or(true, |p| p == r.pattern);
            if same_handler && same_pattern {
                if r.unsubscribe.unsubscribe() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Feed historical events to `handler`, one at a time, in log order.
    ///
    /// Each handler call completes before the next begins. A handler error
    /// stops the replay and is returned. Returns the number of events
    /// replayed.
    pub async fn replay(&self, filter: &ReplayFilter, handler: &dyn EventHandler) -> Result<usize> {
        let events = self.log.query(&filter.query).await?;
        let matcher = filter.pattern.as_deref().map(Matcher::parse);

        let mut count = 0;
        for event in events
            .iter()
            .filter(|e| matcher.as_ref().map_or(true, |m| m.matches(&e.event_type)))
        {
            handler
                .handle(event)
                .await
                .map_err(|e| Error::Handler(format!("replay of {} failed: {e}", event.id)))?;
            count += 1;
        }

        debug!(count, "Replayed events");
        Ok(count)
    }
}

struct OnceHandler {
    fired: AtomicBool,
    inner: Arc<dyn EventHandler>,
    unsubscribe: OnceLock<Unsubscribe>,
    registrations: Weak<Registrations>,
}

#[async_trait]
impl EventHandler for OnceHandler {
    async fn handle(&self, event: &Event) -> HandlerResult {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(unsubscribe) = self.unsubscribe.get() {
            unsubscribe.unsubscribe();
            if let Some(registrations) = self.registrations.upgrade() {
                lock(&registrations).retain(|r| r.unsubscribe.id() != unsubscribe.id());
            }
        }
        self.inner.handle(event).await
    }
}
