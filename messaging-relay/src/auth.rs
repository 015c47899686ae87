//! API key authentication for Hub → relay calls.
//!
//! The key is accepted either as `Api-Key: <key>` or as
//! `Authorization: Api-Key <key>`.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const API_KEY_HEADER: &str = "Api-Key";

const AUTHORIZATION_SCHEME: &str = "Api-Key ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("api key missing")]
    Missing,

    #[error("api key invalid")]
    Mismatch,
}

/// Validates request credentials against the configured key.
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    expected: String,
}

impl ApiKeyAuthenticator {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    /// Accept or reject a request by its headers. No side effects.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let provided = extract_key(headers).ok_or(AuthError::Missing)?;

        if !self.expected.is_empty() && bool::from(provided.as_bytes().ct_eq(self.expected.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::Mismatch)
        }
    }
}

fn extract_key(headers: &HeaderMap) -> Option<&str> {
    let direct = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    let scheme = || {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(AUTHORIZATION_SCHEME))
            .map(str::trim)
    };

    direct.or_else(scheme).filter(|k| !k.is_empty())
}
