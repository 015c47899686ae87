//! API request and response bodies.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::ledger::DeliveryStatus;
use crate::provider::{MessageContent, MAX_BUTTONS, MAX_BUTTON_TITLE};

/// Provider limit on text message length, in characters.
pub const MAX_BODY_CHARS: usize = 4096;

const MAX_TEMPLATE_NAME: usize = 255;

/// `POST /api/v1/messages/send/` body.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Recipient in E.164 form, e.g. `+15615551234`
    pub to: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub template_params: Option<TemplateParams>,
    #[serde(default)]
    pub template_language: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateParams {
    #[serde(default)]
    pub body_params: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl SendMessageRequest {
    /// Validate and turn into provider content.
    ///
    /// A template takes precedence over a body; buttons turn a body into an
    /// interactive message.
    pub fn into_content(self, default_language: &str) -> Result<MessageContent, RelayError> {
        validate_e164(&self.to)?;

        let body = self.body.filter(|b| !b.trim().is_empty());
        let template_name = self.template_name.filter(|t| !t.trim().is_empty());

        if let Some(body) = &body {
            if body.chars().count() > MAX_BODY_CHARS {
                return Err(invalid(format!("body must be at most {MAX_BODY_CHARS} characters")));
            }
        }

        if let Some(name) = template_name {
            if name.chars().count() > MAX_TEMPLATE_NAME {
                return Err(invalid(format!(
                    "template_name must be at most {MAX_TEMPLATE_NAME} characters"
                )));
            }
            if !self.buttons.is_empty() {
                return Err(invalid("buttons cannot be combined with a template"));
            }
            let params = self.template_params.unwrap_or_default();
            let language = self
                .template_language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| default_language.to_string());
            return Ok(MessageContent::template(name, language, &params.body_params));
        }

        let Some(body) = body else {
            return Err(invalid("Either body or template_name must be provided"));
        };

        if self.buttons.is_empty() {
            return Ok(MessageContent::text(body));
        }

        if self.buttons.len() > MAX_BUTTONS {
            return Err(invalid(format!("Maximum {MAX_BUTTONS} buttons allowed")));
        }
        for button in &self.buttons {
            if button.id.trim().is_empty() || button.title.trim().is_empty() {
                return Err(invalid("Each button must have 'id' and 'title'"));
            }
            if button.title.chars().count() > MAX_BUTTON_TITLE {
                return Err(invalid(format!(
                    "Button title must be {MAX_BUTTON_TITLE} characters or less"
                )));
            }
        }

        let buttons: Vec<(String, String)> = self.buttons.into_iter().map(|b| (b.id, b.title)).collect();
        Ok(MessageContent::buttons(body, &buttons))
    }
}

/// `+` followed by 9 to 15 digits.
pub fn validate_e164(phone: &str) -> Result<(), RelayError> {
    let Some(digits) = phone.strip_prefix('+') else {
        return Err(invalid("Phone must be in E.164 format (e.g., +12345678900)"));
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("Phone must contain only digits after +"));
    }
    if !(10..=16).contains(&phone.len()) {
        return Err(invalid("Phone must be 10-16 characters"));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> RelayError {
    RelayError::Validation(message.into())
}

/// Successful send response.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub status: DeliveryStatus,
    pub channel_message_id: String,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
}
