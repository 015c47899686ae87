//! Endpoint handlers.
//!
//! Each handler takes the shared [`AppState`] and an [`ApiRequest`] and
//! returns an [`ApiResponse`]. Nothing here depends on the HTTP framework;
//! see `routes` for the axum adapters.

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::auth::ApiKeyAuthenticator;
use crate::error::RelayError;
use crate::hub::{HubEvent, HubNotifier};
use crate::ledger::{DeliveryStatus, InMemoryLedger, MessageLedger, MessageRecord};
use crate::provider::{OutgoingMessage, WhatsAppClient};
use crate::rate_limit::RateLimiter;
use crate::webhook::{normalize, verify_signature, verify_subscription, WebhookPayload, SIGNATURE_HEADER};
use crate::Config;

use super::request::{ApiRequest, ApiResponse};
use super::schemas::{PingResponse, SendMessageRequest, SendMessageResponse};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: ApiKeyAuthenticator,
    /// `None` when provider credentials are not configured
    pub provider: Option<WhatsAppClient>,
    /// `None` when no Hub URL is configured
    pub hub: Option<HubNotifier>,
    pub ledger: Arc<dyn MessageLedger>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build state with the in-memory ledger.
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        Self::with_ledger(config, Arc::new(InMemoryLedger::new()))
    }

    pub fn with_ledger(config: Config, ledger: Arc<dyn MessageLedger>) -> Result<Self, reqwest::Error> {
        let provider = WhatsAppClient::from_config(&config)?;
        let hub = HubNotifier::from_config(&config)?;

        Ok(Self {
            auth: ApiKeyAuthenticator::new(config.api_key.clone()),
            limiter: Arc::new(RateLimiter::new(config.rate_limit_per_hour, config.rate_limit_per_day)),
            config: Arc::new(config),
            provider,
            hub,
            ledger,
        })
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Liveness check. Never authenticated.
pub async fn ping() -> ApiResponse {
    ApiResponse::json(StatusCode::OK, &PingResponse { status: "pong" })
}

// =============================================================================
// Outbound API
// =============================================================================

/// `POST /api/v1/messages/send/`
pub async fn send_message(state: &AppState, request: ApiRequest) -> ApiResponse {
    match try_send_message(state, &request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, status_code = e.status().as_u16(), "send_message_failed");
            e.into()
        }
    }
}

async fn try_send_message(state: &AppState, request: &ApiRequest) -> Result<ApiResponse, RelayError> {
    state.auth.authenticate(&request.headers)?;

    let body: SendMessageRequest = serde_json::from_slice(&request.body)
        .map_err(|e| RelayError::Validation(format!("Invalid request body: {e}")))?;
    let to = body.to.clone();
    let content = body.into_content(&state.config.whatsapp_template_language)?;

    let provider = state
        .provider
        .as_ref()
        .ok_or(RelayError::ConfigurationMissing("WhatsApp sending"))?;

    let reservation = state.limiter.reserve(&to).await?;

    let channel_message_id = match provider.send(&OutgoingMessage::new(&to, content)).await {
        Ok(id) => id,
        Err(e) => {
            state.limiter.release(reservation).await;
            return Err(e.into());
        }
    };

    let record = MessageRecord::sent(channel_message_id, to.as_str());
    state.ledger.record_sent(record.clone()).await;

    info!(
        message_id = %record.message_id,
        channel_message_id = %record.channel_message_id,
        "send_message_complete"
    );

    Ok(ApiResponse::json(
        StatusCode::OK,
        &SendMessageResponse {
            message_id: record.message_id,
            status: DeliveryStatus::Sent,
            channel_message_id: record.channel_message_id,
        },
    ))
}

/// `GET /api/v1/messages/status/{message_id}/`
pub async fn message_status(state: &AppState, request: ApiRequest, message_id: &str) -> ApiResponse {
    if let Err(e) = state.auth.authenticate(&request.headers) {
        warn!(error = %e, "message_status_unauthorized");
        return RelayError::from(e).into();
    }

    match state.ledger.get(message_id).await {
        Some(record) => ApiResponse::json(StatusCode::OK, &record),
        None => {
            debug!(message_id, "message_status_not_found");
            RelayError::NotFound("Message").into()
        }
    }
}

// =============================================================================
// WhatsApp Webhook
// =============================================================================

/// `GET /webhooks/whatsapp/`: subscription handshake.
pub async fn verify_webhook(state: &AppState, request: ApiRequest) -> ApiResponse {
    match verify_subscription(&request.query, state.config.whatsapp_verify_token.as_deref()) {
        Ok(challenge) => {
            info!("webhook_verified");
            ApiResponse::text(StatusCode::OK, challenge)
        }
        Err(e) => {
            warn!(reason = %e, "webhook_verification_failed");
            ApiResponse::text(StatusCode::FORBIDDEN, "Verification failed")
        }
    }
}

/// `POST /webhooks/whatsapp/`: signed event delivery.
///
/// The signature is checked over the raw body before anything is parsed.
/// Once accepted, the payload is acknowledged with 200 even when some
/// events could not be forwarded to the Hub.
pub async fn receive_webhook(state: &AppState, request: ApiRequest) -> ApiResponse {
    let Some(app_secret) = state.config.whatsapp_app_secret.as_deref() else {
        error!("webhook_app_secret_missing");
        return ApiResponse::text(StatusCode::SERVICE_UNAVAILABLE, "Webhook not configured");
    };

    if let Err(e) = verify_signature(app_secret, &request.body, request.header(SIGNATURE_HEADER)) {
        warn!(reason = %e, "webhook_signature_invalid");
        return ApiResponse::text(StatusCode::FORBIDDEN, "Invalid signature");
    }

    let payload: WebhookPayload = match serde_json::from_slice(&request.body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "webhook_payload_invalid");
            return ApiResponse::text(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let events = normalize(&payload);
    info!(object = %payload.object, event_count = events.len(), "webhook_received");

    for mut event in events {
        if !reconcile_status(state, &mut event).await {
            continue;
        }
        if let Err(e) = forward_event(state, &event).await {
            warn!(event_type = event.event_type(), error = %e, "webhook_event_not_forwarded");
        }
    }

    ApiResponse::text(StatusCode::OK, "OK")
}

/// Apply a status event to the ledger and rewrite it from the stored record.
///
/// Returns whether the event should reach the Hub. Updates the ledger
/// ignored for a tracked message (regressions, repeats, anything after
/// `failed`) are dropped. Untracked messages pass through with no
/// `message_id`.
async fn reconcile_status(state: &AppState, event: &mut HubEvent) -> bool {
    let HubEvent::StatusChanged(update) = event else {
        return true;
    };

    let applied = state
        .ledger
        .apply_status(&update.channel_message_id, update.status, update.error.clone())
        .await;

    match applied {
        Some(applied) if applied.changed => {
            update.message_id = Some(applied.record.message_id);
            update.status = applied.record.status;
            update.error = applied.record.error;
            true
        }
        Some(applied) => {
            debug!(
                message_id = %applied.record.message_id,
                current = %applied.record.status,
                incoming = %update.status,
                "webhook_status_not_forwarded"
            );
            false
        }
        None => {
            debug!(channel_message_id = %update.channel_message_id, "webhook_status_untracked");
            true
        }
    }
}

async fn forward_event(state: &AppState, event: &HubEvent) -> Result<(), RelayError> {
    let hub = state
        .hub
        .as_ref()
        .ok_or(RelayError::ConfigurationMissing("Hub webhook"))?;
    hub.notify(event).await?;
    Ok(())
}
