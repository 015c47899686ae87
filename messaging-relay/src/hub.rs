//! Hub notifications.
//!
//! Normalized events are POSTed to the Hub as
//! `{"event_type": "...", "payload": {...}}` with the shared secret in
//! `X-Webhook-Secret` and an HMAC of the body in `X-Hub-Signature-256`.

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::ledger::DeliveryStatus;
use crate::webhook::signature::{sign, SignatureError, SIGNATURE_HEADER};
use crate::Config;

pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Event forwarded to the Hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum HubEvent {
    #[serde(rename = "message.status_changed")]
    StatusChanged(StatusChanged),
    #[serde(rename = "message.received")]
    MessageReceived(MessageReceived),
    #[serde(rename = "contact.opted_out")]
    ContactOptedOut(ContactOptedOut),
}

impl HubEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "message.status_changed",
            Self::MessageReceived(_) => "message.received",
            Self::ContactOptedOut(_) => "contact.opted_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChanged {
    /// Relay message id, when the ledger knows the message
    pub message_id: Option<String>,
    pub channel_message_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageReceived {
    pub channel_message_id: String,
    /// Sender in E.164 form
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    pub message_type: String,
    pub body: String,
    /// Provider id of the message this one replies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactOptedOut {
    pub phone: String,
    pub channel_message_id: String,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to encode hub event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to sign hub event: {0}")]
    Sign(#[from] SignatureError),

    #[error("hub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("hub returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends events to the Hub webhook.
#[derive(Clone)]
pub struct HubNotifier {
    http: Client,
    url: String,
    secret: String,
}

impl HubNotifier {
    /// Build a notifier from configuration.
    ///
    /// Returns `None` when no Hub URL is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, reqwest::Error> {
        let (Some(url), Some(secret)) = (&config.hub_webhook_url, &config.hub_webhook_secret) else {
            return Ok(None);
        };

        let http = Client::builder().timeout(config.hub_timeout()).build()?;

        Ok(Some(Self {
            http,
            url: url.clone(),
            secret: secret.clone(),
        }))
    }

    /// Deliver one event. Any non-2xx response is a failure.
    pub async fn notify(&self, event: &HubEvent) -> Result<(), HubError> {
        let body = serde_json::to_vec(event)?;
        let signature = sign(&self.secret, &body)?;

        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SECRET_HEADER, &self.secret)
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(event_type = event.event_type(), error = %e, "hub_notify_transport_error");
                HubError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            error!(
                event_type = event.event_type(),
                status_code = status.as_u16(),
                "hub_notify_rejected"
            );
            return Err(HubError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            event_type = event.event_type(),
            status_code = status.as_u16(),
            "hub_notify_complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, dead_addr, serve};
    use crate::webhook::signature::verify_signature;
    use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, routing::post, Router};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Captured = Arc<Mutex<Vec<(HeaderMap, Bytes)>>>;

    async fn capture(State(seen): State<Captured>, headers: HeaderMap, body: Bytes) -> StatusCode {
        seen.lock().await.push((headers, body));
        StatusCode::OK
    }

    fn status_event() -> HubEvent {
        HubEvent::StatusChanged(StatusChanged {
            message_id: Some("7d0c".to_string()),
            channel_message_id: "wamid.1".to_string(),
            status: DeliveryStatus::Delivered,
            recipient_id: Some("15615551234".to_string()),
            error: None,
            timestamp: None,
        })
    }

    fn notifier_for(url: &str) -> HubNotifier {
        let cfg = config(&[
            ("HUB_WEBHOOK_URL", url),
            ("HUB_WEBHOOK_SECRET", "hub-secret"),
            ("HUB_TIMEOUT_MS", "2000"),
        ]);
        HubNotifier::from_config(&cfg).unwrap().unwrap()
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(status_event()).unwrap();
        assert_eq!(
            value,
            json!({
                "event_type": "message.status_changed",
                "payload": {
                    "message_id": "7d0c",
                    "channel_message_id": "wamid.1",
                    "status": "delivered",
                    "recipient_id": "15615551234"
                }
            })
        );
    }

    #[test]
    fn test_not_configured_without_url() {
        assert!(HubNotifier::from_config(&config(&[])).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notify_sends_secret_and_signature() {
        let seen: Captured = Arc::default();
        let router = Router::new()
            .route("/hooks/messaging", post(capture))
            .with_state(seen.clone());
        let addr = serve(router).await;
        let notifier = notifier_for(&format!("http://{addr}/hooks/messaging"));

        notifier.notify(&status_event()).await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        let (headers, body) = &seen[0];
        assert_eq!(headers.get(SECRET_HEADER).unwrap(), "hub-secret");
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        assert_eq!(verify_signature("hub-secret", body, signature), Ok(()));

        let value: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(value["event_type"], "message.status_changed");
        assert_eq!(value["payload"]["status"], "delivered");
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let router = Router::new().route(
            "/hooks/messaging",
            post(|| async { (StatusCode::BAD_GATEWAY, "hub down") }),
        );
        let addr = serve(router).await;
        let notifier = notifier_for(&format!("http://{addr}/hooks/messaging"));

        let err = notifier.notify(&status_event()).await.unwrap_err();
        match err {
            HubError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "hub down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_transport_error() {
        let addr = dead_addr().await;
        let notifier = notifier_for(&format!("http://{addr}/hooks/messaging"));

        let err = notifier.notify(&status_event()).await.unwrap_err();
        assert!(matches!(err, HubError::Transport(_)));
    }
}
