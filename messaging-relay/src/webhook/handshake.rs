//! Webhook subscription handshake.
//!
//! When a webhook URL is registered, Meta issues
//! `GET ?hub.mode=subscribe&hub.verify_token=<token>&hub.challenge=<n>` and
//! expects the challenge echoed back when the token matches.

use std::collections::HashMap;

use subtle::ConstantTimeEq;
use thiserror::Error;

pub const MODE_PARAM: &str = "hub.mode";
pub const TOKEN_PARAM: &str = "hub.verify_token";
pub const CHALLENGE_PARAM: &str = "hub.challenge";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("verify token not configured")]
    NotConfigured,

    #[error("hub.mode is not subscribe")]
    WrongMode,

    #[error("verify token does not match")]
    TokenMismatch,

    #[error("hub.challenge missing")]
    MissingChallenge,
}

/// Check a handshake request and return the challenge to echo.
pub fn verify_subscription(
    query: &HashMap<String, String>,
    verify_token: Option<&str>,
) -> Result<String, HandshakeError> {
    let expected = verify_token.ok_or(HandshakeError::NotConfigured)?;

    if query.get(MODE_PARAM).map(String::as_str) != Some("subscribe") {
        return Err(HandshakeError::WrongMode);
    }

    let provided = query.get(TOKEN_PARAM).map(String::as_str).unwrap_or_default();
    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(HandshakeError::TokenMismatch);
    }

    query
        .get(CHALLENGE_PARAM)
        .cloned()
        .ok_or(HandshakeError::MissingChallenge)
}
