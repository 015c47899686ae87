//! Request-level error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;
use crate::hub::HubError;
use crate::provider::{ProviderError, ProviderErrorKind};
use crate::rate_limit::RateLimitExceeded;
use crate::webhook::SignatureError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error("{0} is not configured")]
    ConfigurationMissing(&'static str),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    HubDelivery(#[from] HubError),

    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(#[from] RateLimitExceeded),

    #[error("{0} not found")]
    NotFound(&'static str),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Signature(_) => StatusCode::FORBIDDEN,
            Self::ConfigurationMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider(e) => match e.kind {
                ProviderErrorKind::InvalidRecipient => StatusCode::BAD_REQUEST,
                ProviderErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ProviderErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
                // our credentials or request were refused upstream
                ProviderErrorKind::Authentication | ProviderErrorKind::Rejected => StatusCode::BAD_GATEWAY,
            },
            Self::HubDelivery(_) => StatusCode::BAD_GATEWAY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Authentication(_) => "unauthorized".to_string(),
            Self::Provider(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}
