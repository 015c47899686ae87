//! WhatsApp webhook signature verification.
//!
//! Meta signs every webhook body with HMAC-SHA256 keyed by the app secret and
//! sends the digest as `X-Hub-Signature-256: sha256=<hex>`.
//! Reference: https://developers.facebook.com/docs/graph-api/webhooks/getting-started#validate-payloads
//!
//! The digest must be computed over the raw request bytes. Parsing and
//! re-serializing the JSON first would change whitespace and break the check.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

const PREFIX: &str = "sha256=";

/// SHA-256 digest length in bytes.
const DIGEST_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("signing key rejected")]
    InvalidKey,
}

/// Verify a webhook signature header against the raw body.
///
/// # Arguments
///
/// * `app_secret` - The WhatsApp app secret
/// * `body` - The raw, unparsed request body
/// * `header` - The `X-Hub-Signature-256` value, if present
pub fn verify_signature(app_secret: &str, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::Missing)?;

    let provided = header
        .strip_prefix(PREFIX)
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .filter(|digest| digest.len() == DIGEST_LEN)
        .ok_or(SignatureError::Malformed)?;

    let expected = digest(app_secret, body)?;

    // Constant-time comparison to prevent timing attacks
    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce the `sha256=<hex>` header value for a body.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    Ok(format!("{PREFIX}{}", hex::encode(digest(secret, body)?)))
}

fn digest(secret: &str, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}
