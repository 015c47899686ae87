//! Message ledger: what was sent and how far it got.
//!
//! The relay itself keeps no durable state. [`MessageLedger`] is the seam a
//! persistent store plugs into; [`InMemoryLedger`] is the default used by the
//! binary and by tests.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Delivery status of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Map a provider status string. Unknown statuses map to `None`.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    /// Position in the normal delivery progression.
    fn rank(self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Read => 2,
            Self::Failed => 3,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound message as tracked by the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    /// Relay-assigned identifier returned to the API caller
    pub message_id: String,
    /// Provider identifier (`wamid`)
    pub channel_message_id: String,
    /// Recipient in E.164 form
    pub recipient: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    /// Unix seconds
    pub sent_at: u64,
    pub delivered_at: Option<u64>,
    pub read_at: Option<u64>,
}

impl MessageRecord {
    /// New record for a message the provider just accepted.
    pub fn sent(channel_message_id: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            channel_message_id: channel_message_id.into(),
            recipient: recipient.into(),
            status: DeliveryStatus::Sent,
            error: None,
            sent_at: unix_now(),
            delivered_at: None,
            read_at: None,
        }
    }

    /// Apply a status update.
    ///
    /// `failed` always wins; otherwise status only moves forward. Returns
    /// whether the status changed.
    fn apply(&mut self, status: DeliveryStatus, error: Option<String>, at: u64) -> bool {
        if self.status == DeliveryStatus::Failed {
            return false;
        }
        if status != DeliveryStatus::Failed && status.rank() <= self.status.rank() {
            return false;
        }

        self.status = status;
        match status {
            DeliveryStatus::Delivered => {
                self.delivered_at.get_or_insert(at);
            }
            DeliveryStatus::Read => {
                // a read message was necessarily delivered
                self.delivered_at.get_or_insert(at);
                self.read_at.get_or_insert(at);
            }
            DeliveryStatus::Failed => {
                self.error = Some(error.unwrap_or_else(|| "Unknown error".to_string()));
            }
            DeliveryStatus::Sent => {}
        }
        true
    }
}

/// Outcome of a status update on a tracked message.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedStatus {
    /// The record after the update
    pub record: MessageRecord,
    /// `false` when the update was a regression or a repeat and was ignored
    pub changed: bool,
}

/// Storage for message records.
#[async_trait]
pub trait MessageLedger: Send + Sync {
    async fn record_sent(&self, record: MessageRecord);

    /// Apply a provider status update. Returns `None` when the provider id
    /// is unknown.
    async fn apply_status(
        &self,
        channel_message_id: &str,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Option<AppliedStatus>;

    async fn get(&self, message_id: &str) -> Option<MessageRecord>;
}

#[derive(Default)]
struct LedgerInner {
    records: HashMap<String, MessageRecord>,
    /// provider id -> relay id
    by_channel_id: HashMap<String, String>,
}

/// Process-local ledger. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: RwLock<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLedger for InMemoryLedger {
    async fn record_sent(&self, record: MessageRecord) {
        let mut inner = self.inner.write().await;
        inner
            .by_channel_id
            .insert(record.channel_message_id.clone(), record.message_id.clone());
        debug!(message_id = %record.message_id, "ledger_record_sent");
        inner.records.insert(record.message_id.clone(), record);
    }

    async fn apply_status(
        &self,
        channel_message_id: &str,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Option<AppliedStatus> {
        let mut inner = self.inner.write().await;
        let message_id = inner.by_channel_id.get(channel_message_id)?.clone();
        let record = inner.records.get_mut(&message_id)?;

        let changed = record.apply(status, error, unix_now());
        if changed {
            info!(message_id = %message_id, status = %status, "ledger_status_updated");
        } else {
            debug!(
                message_id = %message_id,
                current = %record.status,
                incoming = %status,
                "ledger_status_ignored"
            );
        }

        Some(AppliedStatus {
            record: record.clone(),
            changed,
        })
    }

    async fn get(&self, message_id: &str) -> Option<MessageRecord> {
        self.inner.read().await.records.get(message_id).cloned()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_provider() {
        assert_eq!(DeliveryStatus::from_provider("delivered"), Some(DeliveryStatus::Delivered));
        assert_eq!(DeliveryStatus::from_provider("deleted"), None);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DeliveryStatus::Read).unwrap(), "\"read\"");
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let ledger = InMemoryLedger::new();
        let record = MessageRecord::sent("wamid.1", "+15615551234");
        let id = record.message_id.clone();
        ledger.record_sent(record).await;

        let fetched = ledger.get(&id).await.unwrap();
        assert_eq!(fetched.channel_message_id, "wamid.1");
        assert_eq!(fetched.status, DeliveryStatus::Sent);
        assert!(ledger.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_status_progression() {
        let ledger = InMemoryLedger::new();
        let record = MessageRecord::sent("wamid.1", "+15615551234");
        let id = record.message_id.clone();
        ledger.record_sent(record).await;

        let applied = ledger.apply_status("wamid.1", DeliveryStatus::Delivered, None).await.unwrap();
        assert!(applied.changed);
        assert_eq!(applied.record.message_id, id);
        assert_eq!(applied.record.status, DeliveryStatus::Delivered);
        assert!(applied.record.delivered_at.is_some());

        let applied = ledger.apply_status("wamid.1", DeliveryStatus::Read, None).await.unwrap();
        assert!(applied.changed);
        assert_eq!(applied.record.status, DeliveryStatus::Read);
        assert!(applied.record.read_at.is_some());
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        let ledger = InMemoryLedger::new();
        ledger.record_sent(MessageRecord::sent("wamid.1", "+15615551234")).await;

        ledger.apply_status("wamid.1", DeliveryStatus::Read, None).await;
        let applied = ledger.apply_status("wamid.1", DeliveryStatus::Delivered, None).await.unwrap();
        assert!(!applied.changed);
        assert_eq!(applied.record.status, DeliveryStatus::Read);
        // read implies delivered
        assert!(applied.record.delivered_at.is_some());

        let repeat = ledger.apply_status("wamid.1", DeliveryStatus::Read, None).await.unwrap();
        assert!(!repeat.changed);
    }

    #[tokio::test]
    async fn test_failed_applies_and_sticks() {
        let ledger = InMemoryLedger::new();
        ledger.record_sent(MessageRecord::sent("wamid.1", "+15615551234")).await;

        ledger.apply_status("wamid.1", DeliveryStatus::Delivered, None).await;
        let failed = ledger
            .apply_status("wamid.1", DeliveryStatus::Failed, Some("Message undeliverable".to_string()))
            .await
            .unwrap();
        assert!(failed.changed);
        assert_eq!(failed.record.status, DeliveryStatus::Failed);
        assert_eq!(failed.record.error.as_deref(), Some("Message undeliverable"));

        let after = ledger.apply_status("wamid.1", DeliveryStatus::Read, None).await.unwrap();
        assert!(!after.changed);
        assert_eq!(after.record.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_channel_id() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.apply_status("wamid.x", DeliveryStatus::Read, None).await.is_none());
    }
}
