//! Graph API request and response bodies for the messages endpoint.

use serde::{Deserialize, Serialize};

/// WhatsApp allows at most three reply buttons per interactive message.
pub const MAX_BUTTONS: usize = 3;

/// Maximum reply button title length, in characters.
pub const MAX_BUTTON_TITLE: usize = 20;

/// Body sent to `POST /{phone_number_id}/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    /// Recipient phone number without the leading `+`
    pub to: String,
    #[serde(flatten)]
    pub content: MessageContent,
}

impl OutgoingMessage {
    pub fn new(to_e164: &str, content: MessageContent) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: to_e164.trim_start_matches('+').to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: TextBody },
    Template { template: Template },
    Interactive { interactive: Interactive },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text {
            text: TextBody { body: body.into() },
        }
    }

    /// Template message; body parameters become a single `body` component.
    pub fn template(name: impl Into<String>, language: impl Into<String>, body_params: &[String]) -> Self {
        let components = if body_params.is_empty() {
            None
        } else {
            Some(vec![TemplateComponent {
                kind: "body",
                parameters: body_params
                    .iter()
                    .map(|p| TemplateParameter {
                        kind: "text",
                        text: p.clone(),
                    })
                    .collect(),
            }])
        };

        Self::Template {
            template: Template {
                name: name.into(),
                language: Language { code: language.into() },
                components,
            },
        }
    }

    /// Interactive reply-button message. Extra buttons are dropped and
    /// titles are cut to the provider's limit.
    pub fn buttons(body: impl Into<String>, buttons: &[(String, String)]) -> Self {
        let buttons = buttons
            .iter()
            .take(MAX_BUTTONS)
            .map(|(id, title)| ReplyButton {
                kind: "reply",
                reply: ButtonReply {
                    id: id.clone(),
                    title: title.chars().take(MAX_BUTTON_TITLE).collect(),
                },
            })
            .collect();

        Self::Interactive {
            interactive: Interactive {
                kind: "button",
                body: TextPart { text: body.into() },
                action: Action { buttons },
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Template { .. } => "template",
            Self::Interactive { .. } => "interactive",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<TemplateComponent>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateParameter {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Interactive {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub body: TextPart,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub buttons: Vec<ReplyButton>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyButton {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub reply: ButtonReply,
}

#[derive(Debug, Clone, Serialize)]
pub struct ButtonReply {
    pub id: String,
    pub title: String,
}

// =============================================================================
// Responses
// =============================================================================

/// Successful send response.
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Error envelope returned by the Graph API on failure.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: GraphError,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message_shape() {
        let msg = OutgoingMessage::new("+15615551234", MessageContent::text("hello"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "15615551234",
                "type": "text",
                "text": {"body": "hello"}
            })
        );
    }

    #[test]
    fn test_template_message_shape() {
        let params = vec!["Ana".to_string(), "March".to_string()];
        let msg = OutgoingMessage::new(
            "+15615551234",
            MessageContent::template("monthly_digest", "en_US", &params),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "template");
        assert_eq!(value["template"]["name"], "monthly_digest");
        assert_eq!(value["template"]["language"]["code"], "en_US");
        assert_eq!(value["template"]["components"][0]["type"], "body");
        assert_eq!(value["template"]["components"][0]["parameters"][1]["text"], "March");
    }

    #[test]
    fn test_template_without_params_omits_components() {
        let msg = OutgoingMessage::new("+15615551234", MessageContent::template("hello_world", "en_US", &[]));
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value["template"].get("components").is_none());
    }

    #[test]
    fn test_buttons_are_capped_and_truncated() {
        let buttons: Vec<(String, String)> = (0..5)
            .map(|i| (format!("b{i}"), "A very long button title indeed".to_string()))
            .collect();
        let msg = OutgoingMessage::new("+15615551234", MessageContent::buttons("Pick one", &buttons));
        let value = serde_json::to_value(&msg).unwrap();
        let rendered = value["interactive"]["action"]["buttons"].as_array().unwrap();
        assert_eq!(value["type"], "interactive");
        assert_eq!(value["interactive"]["type"], "button");
        assert_eq!(rendered.len(), MAX_BUTTONS);
        assert_eq!(rendered[0]["reply"]["title"].as_str().unwrap().chars().count(), MAX_BUTTON_TITLE);
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{"error":{"message":"(#131026) Message undeliverable","type":"OAuthException","code":131026,"fbtrace_id":"Az8"}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error.code, Some(131026));
        assert_eq!(envelope.error.fbtrace_id.as_deref(), Some("Az8"));
    }
}
