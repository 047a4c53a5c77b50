//! Eventide Subscriptions - Fan-out of appended events
//!
//! This crate keeps a registry of subscriptions independent of any log:
//! - Subscription: Pattern, delivery mode and lifecycle flags
//! - Manager: Registry, concurrent dispatch and log attachment
//! - Webhook: Signed HTTP POST delivery
//! - Push: Live-connection delivery seam

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod manager;
pub mod push;
pub mod subscription;
pub mod webhook;

pub use error::DeliveryError;
pub use manager::{DeliveryOutcome, DispatchReport, SubscriptionManager};
pub use push::{NoopPush, PushTransport};
pub use subscription::{DeliveryMode, NewSubscription, Subscription, SubscriptionFilter};
pub use webhook::{
    build_request, sign_payload, ReqwestTransport, WebhookConfig, WebhookRequest,
    WebhookTransport, EVENT_ID_HEADER, EVENT_TYPE_HEADER, SIGNATURE_HEADER,
};
