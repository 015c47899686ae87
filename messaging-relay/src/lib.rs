//! Messaging Relay - WhatsApp transport for the Hub.
//!
//! The relay sits between the Hub and the WhatsApp Business Cloud API:
//! - Outbound: authenticated API calls become provider sends
//! - Inbound: signed provider webhooks become normalized Hub events
//!
//! ## Architecture
//!
//! ```text
//! Hub ── /api/v1/messages/send/ ──→ Relay ──→ WhatsApp Cloud API
//! Hub ←── message.* / contact.* ─── Relay ←── /webhooks/whatsapp/
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod provider;
pub mod rate_limit;
pub mod web;
pub mod webhook;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use error::RelayError;
pub use hub::{HubEvent, HubNotifier};
pub use ledger::{AppliedStatus, InMemoryLedger, MessageLedger, MessageRecord};
pub use provider::WhatsAppClient;
pub use web::{router, AppState};
