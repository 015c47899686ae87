//! Framework-neutral request and response values.
//!
//! Handlers take an [`ApiRequest`] and return an [`ApiResponse`]; the axum
//! routes only translate to and from these.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::error::RelayError;

#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    /// Raw body bytes, untouched
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(headers: HeaderMap, query: HashMap<String, String>, body: Bytes) -> Self {
        Self { headers, query, body }
    }

    /// Header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
impl ApiRequest {
    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        use axum::http::{HeaderName, HeaderValue};

        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.insert(name, value);
        }
        self
    }

    pub(crate) fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// JSON response. Serialization failure becomes a 500.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self {
                status,
                body: ResponseBody::Json(value),
            },
            Err(e) => {
                error!(error = %e, "response_serialize_failed");
                Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Text(body.into()),
        }
    }
}

#[cfg(test)]
impl ApiResponse {
    pub(crate) fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    pub(crate) fn text_body(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            ResponseBody::Json(_) => None,
        }
    }
}

impl From<RelayError> for ApiResponse {
    fn from(err: RelayError) -> Self {
        let mut body = json!({ "error": err.public_message() });
        if let RelayError::Provider(e) = &err {
            body["kind"] = json!(e.kind.as_str());
            body["transient"] = json!(e.kind.is_transient());
        }
        Self {
            status: err.status(),
            body: ResponseBody::Json(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, ProviderErrorKind};

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = ApiRequest::default().with_header("api-key", "abc");
        assert_eq!(req.header("Api-Key"), Some("abc"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn test_provider_error_response_carries_kind() {
        let response = ApiResponse::from(RelayError::Provider(ProviderError {
            kind: ProviderErrorKind::RateLimited,
            status: Some(429),
            code: Some(130429),
            message: "Rate limit hit".to_string(),
        }));
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.json_body(),
            Some(&json!({"error": "Rate limit hit", "kind": "rate_limited", "transient": true}))
        );
    }
}
