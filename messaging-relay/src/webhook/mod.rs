//! Inbound provider webhooks.
//!
//! - `handshake`: the GET subscription check
//! - `signature`: HMAC verification of POST bodies
//! - `events`: payload schema and normalization into Hub events

pub mod events;
pub mod handshake;
pub mod signature;

pub use events::{normalize, WebhookPayload};
pub use handshake::{verify_subscription, HandshakeError};
pub use signature::{sign, verify_signature, SignatureError, SIGNATURE_HEADER};
