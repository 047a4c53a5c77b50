//! Webhook - Signed HTTP delivery

use crate::error::DeliveryError;
use async_trait::async_trait;
use eventide_core::Event;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

/// Header carrying the event type
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";
/// Header carrying the per-delivery identifier (the event id)
pub const EVENT_ID_HEADER: &str = "X-Event-Id";
/// Header carrying `sha256=<hex>` when a secret is configured
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// HTTP client settings for webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: format!("eventide-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// A fully built webhook request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    /// Target URL
    pub url: String,
    /// Headers in send order
    pub headers: Vec<(String, String)>,
    /// Raw JSON body; the signature covers exactly these bytes
    pub body: String,
}

impl WebhookRequest {
    /// Look up a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends webhook requests
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST the request and return the response status code
    async fn post(&self, request: WebhookRequest) -> Result<u16, DeliveryError>;
}

/// Compute `sha256=<hex HMAC-SHA256 of body keyed by secret>`
pub fn sign_payload(secret: &str, body: &str) -> Result<String, DeliveryError> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DeliveryError::Payload("Invalid signing secret".to_string()))?;
    mac.update(body.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Build the request for one event
pub fn build_request(
    endpoint: &str,
    secret: Option<&str>,
    event: &Event,
) -> Result<WebhookRequest, DeliveryError> {
    let body = serde_json::to_string(event)
        .map_err(|e| DeliveryError::Payload(format!("failed to serialize event: {e}")))?;

    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        (EVENT_TYPE_HEADER.to_string(), event.event_type.clone()),
        (EVENT_ID_HEADER.to_string(), event.id.clone()),
    ];
    if let Some(secret) = secret {
        headers.push((SIGNATURE_HEADER.to_string(), sign_payload(secret, &body)?));
    }

    Ok(WebhookRequest {
        url: endpoint.to_string(),
        headers,
        body,
    })
}

/// Webhook transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the configured timeout and user agent
    pub fn new(config: &WebhookConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DeliveryError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: WebhookRequest) -> Result<u16, DeliveryError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(url = %request.url, status, "Webhook delivered");
        Ok(status)
    }
}
