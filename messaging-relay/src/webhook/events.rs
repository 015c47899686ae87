//! Inbound webhook payloads and their normalization into Hub events.
//!
//! The provider nests everything under `entry[].changes[].value`. Parsing is
//! permissive: unknown fields are ignored and missing ones default, so a
//! payload shape change drops individual items instead of failing the batch.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::hub::{ContactOptedOut, HubEvent, MessageReceived, StatusChanged};
use crate::ledger::DeliveryStatus;

/// Bodies that unsubscribe the sender, compared trimmed and upper-cased.
pub const OPT_OUT_KEYWORDS: &[&str] = &["STOP", "UNSUBSCRIBE", "CANCEL"];

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub button: Option<ButtonContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
    #[serde(default)]
    pub context: Option<MessageContext>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

/// Quick-reply button on a template message.
#[derive(Debug, Default, Deserialize)]
pub struct ButtonContent {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InteractiveContent {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub button_reply: Option<Reply>,
    #[serde(default)]
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageContext {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub errors: Vec<StatusErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Flatten a webhook payload into Hub events, in payload order.
///
/// Status events carry no relay `message_id` yet; the caller fills it in from
/// the ledger.
pub fn normalize(payload: &WebhookPayload) -> Vec<HubEvent> {
    let mut events = Vec::new();

    for change in payload.entry.iter().flat_map(|e| &e.changes) {
        let value = &change.value;

        for update in &value.statuses {
            if let Some(event) = normalize_status(update) {
                events.push(event);
            }
        }

        for message in &value.messages {
            if let Some(event) = normalize_message(message, &value.contacts) {
                events.push(event);
            }
        }
    }

    events
}

fn normalize_status(update: &StatusUpdate) -> Option<HubEvent> {
    if update.id.is_empty() {
        warn!("webhook_status_missing_id");
        return None;
    }

    let Some(status) = DeliveryStatus::from_provider(&update.status) else {
        debug!(status = %update.status, "webhook_status_unknown");
        return None;
    };

    let error = update
        .errors
        .first()
        .and_then(|e| e.message.clone().or_else(|| e.title.clone()));

    Some(HubEvent::StatusChanged(StatusChanged {
        message_id: None,
        channel_message_id: update.id.clone(),
        status,
        recipient_id: update.recipient_id.clone(),
        error,
        timestamp: update.timestamp.clone(),
    }))
}

fn normalize_message(message: &InboundMessage, contacts: &[Contact]) -> Option<HubEvent> {
    let from = message.from.trim();
    if from.is_empty() {
        warn!(channel_message_id = %message.id, "webhook_message_missing_sender");
        return None;
    }

    let phone = to_e164(from);
    let body = extract_body(message);

    if is_opt_out(&body) {
        return Some(HubEvent::ContactOptedOut(ContactOptedOut {
            phone,
            channel_message_id: message.id.clone(),
        }));
    }

    let profile_name = contacts
        .iter()
        .find(|c| same_number(&c.wa_id, from))
        .and_then(|c| c.profile.as_ref())
        .map(|p| p.name.clone())
        .filter(|name| !name.is_empty());

    Some(HubEvent::MessageReceived(MessageReceived {
        channel_message_id: message.id.clone(),
        from: phone,
        profile_name,
        message_type: message.kind.clone(),
        body,
        context_message_id: message.context.as_ref().and_then(|c| c.id.clone()),
        timestamp: message.timestamp.clone(),
    }))
}

/// Text the contact typed or the title of the button they tapped.
fn extract_body(message: &InboundMessage) -> String {
    match message.kind.as_str() {
        "text" => message.text.as_ref().map(|t| t.body.clone()),
        "button" => message.button.as_ref().map(|b| b.text.clone()),
        "interactive" => message.interactive.as_ref().and_then(|i| match i.kind.as_str() {
            "button_reply" => i.button_reply.as_ref().map(|r| r.title.clone()),
            "list_reply" => i.list_reply.as_ref().map(|r| r.title.clone()),
            _ => None,
        }),
        _ => None,
    }
    .unwrap_or_default()
}

fn is_opt_out(body: &str) -> bool {
    let normalized = body.trim().to_uppercase();
    OPT_OUT_KEYWORDS.contains(&normalized.as_str())
}

/// Compare provider phone ids with or without a leading `+`.
fn same_number(a: &str, b: &str) -> bool {
    a.trim().trim_start_matches('+') == b.trim().trim_start_matches('+')
}

fn to_e164(phone: &str) -> String {
    if phone.starts_with('+') {
        phone.to_string()
    } else {
        format!("+{phone}")
    }
}
