//! Subscription - Registered interest in a set of event types

use chrono::{DateTime, Utc};
use eventide_core::{Error, EventHandler, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How matching events reach a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// In-process handler
    Code,
    /// Push over a live connection
    Websocket,
    /// Signed HTTP POST
    Webhook,
}

impl DeliveryMode {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Websocket => "websocket",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Unique subscription ID
    pub id: String,
    /// Event type pattern (globs, comma lists and `!` negation)
    pub pattern: String,
    /// Delivery mode
    pub mode: DeliveryMode,
    /// Push or webhook target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Webhook signing key
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Inactive subscriptions are kept but skipped
    pub active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Registration request
#[derive(Clone)]
pub struct NewSubscription {
    pub(crate) pattern: String,
    pub(crate) mode: DeliveryMode,
    pub(crate) endpoint: Option<String>,
    pub(crate) secret: Option<String>,
    pub(crate) handler: Option<Arc<dyn EventHandler>>,
}

impl NewSubscription {
    /// Run `handler` in-process for matching events
    #[must_use]
    pub fn code(pattern: &str, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode: DeliveryMode::Code,
            endpoint: None,
            secret: None,
            handler: Some(handler),
        }
    }

    /// Push matching events to a live connection
    #[must_use]
    pub fn websocket(pattern: &str, endpoint: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode: DeliveryMode::Websocket,
            endpoint: Some(endpoint.to_string()),
            secret: None,
            handler: None,
        }
    }

    /// POST matching events to `endpoint`
    #[must_use]
    pub fn webhook(pattern: &str, endpoint: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            mode: DeliveryMode::Webhook,
            endpoint: Some(endpoint.to_string()),
            secret: None,
            handler: None,
        }
    }

    /// Sign webhook payloads with `secret`
    #[must_use]
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    /// Delivery mode of the request
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.pattern.split(',').any(|clause| {
            let clause = clause.trim();
            clause.trim_start_matches('!').is_empty()
        }) {
            return Err(Error::InvalidSubscription(format!(
                "invalid pattern: {:?}",
                self.pattern
            )));
        }

        match self.mode {
            DeliveryMode::Code if self.handler.is_none() => Err(Error::InvalidSubscription(
                "code subscriptions need a handler".to_string(),
            )),
            DeliveryMode::Websocket | DeliveryMode::Webhook
                if self.endpoint.as_deref().map_or(true, str::is_empty) =>
            {
                Err(Error::InvalidSubscription(format!(
                    "{} subscriptions need an endpoint",
                    self.mode
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for NewSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSubscription")
            .field("pattern", &self.pattern)
            .field("mode", &self.mode)
            .field("endpoint", &self.endpoint)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Filter for [`crate::SubscriptionManager::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Exact pattern string
    pub pattern: Option<String>,
    /// Delivery mode
    pub mode: Option<DeliveryMode>,
    /// Active flag
    pub active: Option<bool>,
}

impl SubscriptionFilter {
    /// Match every subscription
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only subscriptions registered with exactly `pattern`
    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    /// Only subscriptions using `mode`
    #[must_use]
    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Only active (or only inactive) subscriptions
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Check a subscription against the filter
    #[must_use]
    pub fn accepts(&self, subscription: &Subscription) -> bool {
        self.pattern
            .as_deref()
            .map_or(true, |p| p == subscription.pattern)
            && self.mode.map_or(true, |m| m == subscription.mode)
            && self.active.map_or(true, |a| a == subscription.active)
    }
}
