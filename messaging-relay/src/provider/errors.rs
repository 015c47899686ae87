//! Provider failure taxonomy and the error-code table that feeds it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The recipient cannot receive messages (unknown number, not opted in).
    InvalidRecipient,
    /// The provider throttled us.
    RateLimited,
    /// Our credentials were refused.
    Authentication,
    /// Network failure or provider-side outage.
    Transient,
    /// Any other permanent refusal (bad parameters, unknown template).
    Rejected,
}

impl ProviderErrorKind {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRecipient => "invalid_recipient",
            Self::RateLimited => "rate_limited",
            Self::Authentication => "authentication",
            Self::Transient => "transient",
            Self::Rejected => "rejected",
        }
    }

    /// Fallback classification from the HTTP status alone.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimited,
            500..=599 => Self::Transient,
            _ => Self::Rejected,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown provider error kind: {0}")]
pub struct UnknownErrorKind(String);

impl FromStr for ProviderErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_recipient" => Ok(Self::InvalidRecipient),
            "rate_limited" => Ok(Self::RateLimited),
            "authentication" => Ok(Self::Authentication),
            "transient" => Ok(Self::Transient),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownErrorKind(other.to_string())),
        }
    }
}

/// A failed call to the provider.
#[derive(Debug, Error)]
#[error("provider call failed ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    /// HTTP status, absent for transport failures
    pub status: Option<u16>,
    /// Graph API error code, when the provider returned one
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn transport(err: &reqwest::Error) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            status: None,
            code: None,
            message: err.to_string(),
        }
    }

    /// A 2xx response that did not confirm a message id.
    ///
    /// The provider may already have queued the message, so this is
    /// permanent: retrying could deliver it twice.
    pub fn unconfirmed(status: u16, detail: &str) -> Self {
        Self {
            kind: ProviderErrorKind::Rejected,
            status: Some(status),
            code: None,
            message: format!("delivery outcome unknown: {detail}"),
        }
    }
}

/// Built-in Graph API error codes.
///
/// See <https://developers.facebook.com/docs/whatsapp/cloud-api/support/error-codes>.
const DEFAULT_CODES: &[(i64, ProviderErrorKind)] = &[
    (0, ProviderErrorKind::Authentication),
    (10, ProviderErrorKind::Authentication),
    (190, ProviderErrorKind::Authentication),
    (4, ProviderErrorKind::RateLimited),
    (80007, ProviderErrorKind::RateLimited),
    (130429, ProviderErrorKind::RateLimited),
    (131048, ProviderErrorKind::RateLimited),
    (131056, ProviderErrorKind::RateLimited),
    (131026, ProviderErrorKind::InvalidRecipient),
    (131030, ProviderErrorKind::InvalidRecipient),
    (1, ProviderErrorKind::Transient),
    (2, ProviderErrorKind::Transient),
    (131000, ProviderErrorKind::Transient),
    (131016, ProviderErrorKind::Transient),
];

/// Lookup table from provider error code to [`ProviderErrorKind`].
#[derive(Debug, Clone)]
pub struct ErrorTable {
    codes: HashMap<i64, ProviderErrorKind>,
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self {
            codes: DEFAULT_CODES.iter().copied().collect(),
        }
    }
}

impl ErrorTable {
    /// Default table with the given entries layered on top.
    pub fn with_overrides(overrides: &[(i64, ProviderErrorKind)]) -> Self {
        let mut table = Self::default();
        table.codes.extend(overrides.iter().copied());
        table
    }

    /// Classify a failure by error code first, HTTP status second.
    pub fn classify(&self, status: u16, code: Option<i64>) -> ProviderErrorKind {
        code.and_then(|c| self.codes.get(&c).copied())
            .unwrap_or_else(|| ProviderErrorKind::from_status(status))
    }
}
