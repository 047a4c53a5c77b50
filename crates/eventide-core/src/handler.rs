//! Handler - In-process subscribers and their registry
//!
//! Each log owns one [`SubscriberRegistry`]. Handlers are invoked in
//! registration order after an event is persisted. A failing or panicking
//! handler is isolated: it is logged, counted in the [`NotifyReport`], and
//! the remaining handlers still run.

use crate::event::Event;
use crate::pattern::Matcher;
use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::warn;

/// Error returned by a subscriber
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a subscriber
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// A subscriber that reacts to appended events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event
    async fn handle(&self, event: &Event) -> HandlerResult;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Invoke a handler, converting errors and panics into a message
pub async fn invoke_isolated(
    handler: &dyn EventHandler,
    event: &Event,
) -> std::result::Result<(), String> {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("handler panicked".to_string()),
    }
}

/// Outcome of notifying subscribers about one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Handlers that completed
    pub delivered: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

struct Registration {
    id: u64,
    matcher: Matcher,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: RwLock<Vec<Registration>>,
}

impl RegistryInner {
    fn read(&self) -> RwLockReadGuard<'_, Vec<Registration>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Registration>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pattern-matched subscriber registry owned by a single log
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the pattern is parsed once here
    pub fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) -> Unsubscribe {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.write().push(Registration {
            id,
            matcher: Matcher::parse(pattern),
            handler,
        });

        Unsubscribe {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of live registrations
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no handler is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Invoke every matching handler in registration order.
    ///
    /// The registry lock is released before any handler runs, so handlers
    /// may subscribe or unsubscribe while being notified.
    pub async fn notify(&self, event: &Event) -> NotifyReport {
        let targets: Vec<(u64, Arc<dyn EventHandler>)> = self
            .inner
            .read()
            .iter()
            .filter(|r| r.matcher.matches(&event.event_type))
            .map(|r| (r.id, Arc::clone(&r.handler)))
            .collect();

        let mut report = NotifyReport::default();
        for (registration_id, handler) in targets {
            match invoke_isolated(handler.as_ref(), event).await {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        registration_id,
                        event_id = %event.id,
                        event_type = %event.event_type,
                        %error,
                        "Subscriber failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("registrations", &self.len())
            .finish()
    }
}

/// Handle returned by `subscribe`; removes that one registration
#[derive(Clone)]
pub struct Unsubscribe {
    registry: Weak<RegistryInner>,
    id: u64,
}

impl Unsubscribe {
    /// Remove the registration. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut entries = inner.write();
        let before = entries.len();
        entries.retain(|r| r.id != self.id);
        entries.len() != before
    }

    /// Whether the registration is still in its registry
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.read().iter().any(|r| r.id == self.id))
    }

    /// Registration identifier within its registry
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{now, AppendInput};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn event(entity_type: &str, verb: &str) -> Event {
        Event::from_input(
            AppendInput::new(entity_type, "e1", verb),
            uuid::Uuid::now_v7().to_string(),
            1,
            now(),
        )
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn EventHandler>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler = handler_fn(move |_event| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (count, handler)
    }

    #[tokio::test]
    async fn test_notify_matching_only() {
        let registry = SubscriberRegistry::new();
        let (contacts, h1) = counter();
        let (all, h2) = counter();
        registry.subscribe("Contact.*", h1);
        registry.subscribe("*", h2);

        registry.notify(&event("Contact", "create")).await;
        registry.notify(&event("Deal", "create")).await;

        assert_eq!(contacts.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_registration_order() {
        let registry = SubscriberRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = order.clone();
            registry.subscribe(
                "*",
                handler_fn(move |_event| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(label);
                        Ok(())
                    }
                }),
            );
        }

        registry.notify(&event("Contact", "create")).await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_are_isolated() {
        let registry = SubscriberRegistry::new();
        registry.subscribe(
            "*",
            handler_fn(|_event| async { Err(HandlerError::from("boom")) }),
        );
        registry.subscribe(
            "*",
            handler_fn(|event: Event| async move {
                if event.verb == "create" {
                    panic!("subscriber bug");
                }
                Ok(())
            }),
        );
        let (count, ok) = counter();
        registry.subscribe("*", ok);

        let report = registry.notify(&event("Contact", "create")).await;
        assert_eq!(report, NotifyReport { delivered: 1, failed: 2 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_only_its_registration() {
        let registry = SubscriberRegistry::new();
        let (a, h1) = counter();
        let (b, h2) = counter();
        let first = registry.subscribe("Contact.*", h1);
        registry.subscribe("Contact.*", h2);

        assert!(first.is_active());
        assert!(first.unsubscribe());
        assert!(!first.unsubscribe());
        assert!(!first.is_active());
        assert_eq!(registry.len(), 1);

        registry.notify(&event("Contact", "update")).await;
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = SubscriberRegistry::new();
        let (_count, handler) = counter();
        let handle = registry.subscribe("*", handler);
        drop(registry);
        assert!(!handle.is_active());
        assert!(!handle.unsubscribe());
    }
}
