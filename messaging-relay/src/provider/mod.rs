//! Outbound messaging through the WhatsApp Business Cloud API.
//!
//! - `types`: request and response bodies of the messages endpoint
//! - `errors`: failure taxonomy and the code table that classifies failures
//! - `client`: the HTTP client itself

pub mod client;
pub mod errors;
pub mod types;

pub use client::WhatsAppClient;
pub use errors::{ErrorTable, ProviderError, ProviderErrorKind};
pub use types::{MessageContent, OutgoingMessage, MAX_BUTTONS, MAX_BUTTON_TITLE};
