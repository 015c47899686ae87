//! WhatsApp Business Cloud API client.

use std::sync::Arc;

use reqwest::Client;
use tracing::{error, info, warn};

use super::errors::{ErrorTable, ProviderError, ProviderErrorKind};
use super::types::{ErrorEnvelope, OutgoingMessage, SendResponse};
use crate::Config;

/// Client for the provider's send-message endpoint.
///
/// The client does not retry; transient failures are reported as such and
/// retrying is left to the caller's infrastructure.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    messages_url: String,
    access_token: Arc<str>,
    errors: Arc<ErrorTable>,
}

impl WhatsAppClient {
    /// Build a client from configuration.
    ///
    /// Returns `None` when the provider credentials are not configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, reqwest::Error> {
        let (Some(phone_number_id), Some(access_token)) = (
            config.whatsapp_phone_number_id.as_deref(),
            config.whatsapp_access_token.as_deref(),
        ) else {
            return Ok(None);
        };

        let http = Client::builder()
            .timeout(config.provider_timeout())
            .build()?;

        Ok(Some(Self {
            http,
            messages_url: format!("{}/{}/messages", config.whatsapp_api_base_url, phone_number_id),
            access_token: Arc::from(access_token),
            errors: Arc::new(ErrorTable::with_overrides(&config.whatsapp_error_codes)),
        }))
    }

    #[cfg(test)]
    pub(crate) fn messages_url(&self) -> &str {
        &self.messages_url
    }

    /// Send a message and return the provider message id.
    pub async fn send(&self, message: &OutgoingMessage) -> Result<String, ProviderError> {
        info!(
            message_type = message.content.type_name(),
            "provider_send_starting"
        );

        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&*self.access_token)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(error = %e, "provider_send_timeout");
                } else {
                    error!(error = %e, "provider_send_transport_error");
                }
                ProviderError::transport(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            let err = self.classify_failure(status.as_u16(), &body);
            error!(
                status_code = status.as_u16(),
                error_code = ?err.code,
                kind = %err.kind,
                transient = err.kind.is_transient(),
                "provider_send_failed"
            );
            return Err(err);
        }

        let parsed: SendResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "provider_response_unreadable");
            ProviderError::unconfirmed(status.as_u16(), "unreadable success response")
        })?;

        let Some(sent) = parsed.messages.into_iter().next() else {
            warn!("provider_response_missing_message_id");
            return Err(ProviderError::unconfirmed(
                status.as_u16(),
                "success response carried no message id",
            ));
        };

        info!(channel_message_id = %sent.id, "provider_send_complete");
        Ok(sent.id)
    }

    fn classify_failure(&self, status: u16, body: &str) -> ProviderError {
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (None, body.chars().take(500).collect()),
        };

        ProviderError {
            kind: self.errors.classify(status, code),
            status: Some(status),
            code,
            message,
        }
    }
}
