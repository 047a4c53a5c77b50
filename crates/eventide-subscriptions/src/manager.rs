//! SubscriptionManager - Registry and best-effort fan-out
//!
//! Dispatch never fails: each matching subscription is delivered
//! concurrently and the outcome is counted. Failed deliveries are not
//! retried.

use crate::error::DeliveryError;
use crate::push::{NoopPush, PushTransport};
use crate::subscription::{DeliveryMode, NewSubscription, Subscription, SubscriptionFilter};
use crate::webhook::{build_request, WebhookTransport};
use async_trait::async_trait;
use chrono::Utc;
use eventide_core::{
    invoke_isolated, Event, EventHandler, EventLog, HandlerResult, Matcher, Result, Unsubscribe,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

struct Entry {
    subscription: Subscription,
    matcher: Matcher,
    handler: Option<Arc<dyn EventHandler>>,
}

/// Result of delivering one event to one subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    /// Subscription that was targeted
    pub subscription_id: String,
    /// Mode used
    pub mode: DeliveryMode,
    /// Failure message, if delivery failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    /// Whether delivery succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of [`SubscriptionManager::dispatch`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Successful deliveries
    pub delivered: usize,
    /// Failed deliveries
    pub failed: usize,
    /// Per-subscription outcomes in registration order
    pub outcomes: Vec<DeliveryOutcome>,
}

/// Subscription registry with code, websocket and webhook delivery
pub struct SubscriptionManager {
    entries: RwLock<Vec<Entry>>,
    webhook: Arc<dyn WebhookTransport>,
    push: Arc<dyn PushTransport>,
    attachment: Mutex<Option<Unsubscribe>>,
}

impl SubscriptionManager {
    /// Create a manager that posts webhooks through `webhook` and has no
    /// push transport
    #[must_use]
    pub fn new(webhook: Arc<dyn WebhookTransport>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            webhook,
            push: Arc::new(NoopPush),
            attachment: Mutex::new(None),
        }
    }

    /// Use `push` for websocket subscriptions
    #[must_use]
    pub fn with_push(mut self, push: Arc<dyn PushTransport>) -> Self {
        self.push = push;
        self
    }

    /// Register a subscription; it starts active
    #[instrument(skip(self))]
    pub fn subscribe(&self, request: NewSubscription) -> Result<Subscription> {
        request.validate()?;

        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            pattern: request.pattern.clone(),
            mode: request.mode,
            endpoint: request.endpoint,
            secret: request.secret,
            active: true,
            created_at: Utc::now(),
        };
        let entry = Entry {
            subscription: subscription.clone(),
            matcher: Matcher::parse(&request.pattern),
            handler: request.handler,
        };

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        info!(id = %subscription.id, mode = %subscription.mode, "Subscribed to {}", subscription.pattern);
        Ok(subscription)
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.subscription.id != id);
        before != entries.len()
    }

    /// Resume delivery; returns whether the subscription exists
    pub fn activate(&self, id: &str) -> bool {
        self.set_active(id, true)
    }

    /// Pause delivery without removing; returns whether the subscription
    /// exists
    pub fn deactivate(&self, id: &str) -> bool {
        self.set_active(id, false)
    }

    fn set_active(&self, id: &str, active: bool) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|e| e.subscription.id == id) {
            Some(entry) => {
                entry.subscription.active = active;
                true
            }
            None => false,
        }
    }

    /// Look up a subscription
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.subscription.id == id)
            .map(|e| e.subscription.clone())
    }

    /// Subscriptions accepted by `filter`, in registration order
    #[must_use]
    pub fn list(&self, filter: &SubscriptionFilter) -> Vec<Subscription> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| filter.accepts(&e.subscription))
            .map(|e| e.subscription.clone())
            .collect()
    }

    /// Remove every subscription
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered subscriptions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no subscriptions are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every active matching subscription
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let targets: Vec<(Subscription, Option<Arc<dyn EventHandler>>)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.subscription.active && e.matcher.matches(&event.event_type))
            .map(|e| (e.subscription.clone(), e.handler.clone()))
            .collect();

        let deliveries = targets
            .iter()
            .map(|(subscription, handler)| self.deliver(subscription, handler.as_deref(), event));
        let results = futures::future::join_all(deliveries).await;

        let mut report = DispatchReport::default();
        for ((subscription, _), result) in targets.iter().zip(results) {
            let error = match result {
                Ok(()) => {
                    report.delivered += 1;
                    None
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(subscription_id = %subscription.id, mode = %subscription.mode, "Delivery failed: {e}");
                    Some(e.to_string())
                }
            };
            report.outcomes.push(DeliveryOutcome {
                subscription_id: subscription.id.clone(),
                mode: subscription.mode,
                error,
            });
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Dispatched event"
        );
        report
    }

    async fn deliver(
        &self,
        subscription: &Subscription,
        handler: Option<&dyn EventHandler>,
        event: &Event,
    ) -> std::result::Result<(), DeliveryError> {
        match subscription.mode {
            DeliveryMode::Code => match handler {
                Some(handler) => invoke_isolated(handler, event)
                    .await
                    .map_err(DeliveryError::Handler),
                None => Err(DeliveryError::Handler("no handler registered".to_string())),
            },
            DeliveryMode::Websocket => {
                let endpoint = subscription.endpoint.as_deref().unwrap_or_default();
                self.push.push(endpoint, event).await
            }
            DeliveryMode::Webhook => {
                let endpoint = subscription.endpoint.as_deref().unwrap_or_default();
                let request = build_request(endpoint, subscription.secret.as_deref(), event)?;
                let status = self.webhook.post(request).await?;
                if (200..300).contains(&status) {
                    Ok(())
                } else {
                    Err(DeliveryError::Status(status))
                }
            }
        }
    }

    /// Dispatch every event appended to `log` from now on.
    ///
    /// A manager is attached to at most one log; attaching again detaches
    /// from the previous one first. The log holds only a weak reference.
    pub fn attach(self: &Arc<Self>, log: &dyn EventLog) {
        let handler = Arc::new(AttachedDispatcher {
            manager: Arc::downgrade(self),
        });
        let unsubscribe = log.subscribe("*", handler);

        let previous = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(unsubscribe);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        info!("Subscription manager attached to {} log", log.name());
    }

    /// Stop dispatching from the attached log; returns whether one was
    /// attached
    pub fn detach(&self) -> bool {
        let attachment = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        attachment.is_some_and(|unsubscribe| unsubscribe.unsubscribe())
    }

    /// Check if the manager is attached to a log
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

struct AttachedDispatcher {
    manager: Weak<SubscriptionManager>,
}

#[async_trait]
impl EventHandler for AttachedDispatcher {
    async fn handle(&self, event: &Event) -> HandlerResult {
        if let Some(manager) = self.manager.upgrade() {
            manager.dispatch(event).await;
        }
        Ok(())
    }
}
