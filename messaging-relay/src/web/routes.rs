//! axum wiring for the handlers.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::handlers::{self, AppState};
use super::request::{ApiRequest, ApiResponse, ResponseBody};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping/", get(ping))
        .route("/api/v1/messages/send/", post(send_message))
        .route("/api/v1/messages/status/:message_id/", get(message_status))
        .route("/webhooks/whatsapp/", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.body {
            ResponseBody::Json(value) => (self.status, Json(value)).into_response(),
            ResponseBody::Text(text) => (
                self.status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response(),
        }
    }
}

async fn ping() -> ApiResponse {
    handlers::ping().await
}

async fn send_message(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResponse {
    handlers::send_message(&state, ApiRequest::new(headers, HashMap::new(), body)).await
}

async fn message_status(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    handlers::message_status(&state, ApiRequest::new(headers, HashMap::new(), Bytes::new()), &message_id).await
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResponse {
    handlers::verify_webhook(&state, ApiRequest::new(headers, query, Bytes::new())).await
}

async fn receive_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResponse {
    handlers::receive_webhook(&state, ApiRequest::new(headers, HashMap::new(), body)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, API_KEY};
    use crate::webhook::{sign, SIGNATURE_HEADER};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let cfg = config(&[
            ("WHATSAPP_VERIFY_TOKEN", "verify-me"),
            ("WHATSAPP_APP_SECRET", "app-secret"),
        ]);
        router(AppState::new(cfg).unwrap())
    }

    async fn body_bytes(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn test_ping_route() {
        let request = Request::get("/ping/")
            .header("Api-Key", "wrong")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value, json!({"status": "pong"}));
    }

    #[tokio::test]
    async fn test_handshake_route_echoes_plain_text() {
        let request = Request::get(
            "/webhooks/whatsapp/?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=123",
        )
        .body(Body::empty())
        .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_bytes(response).await, "123");
    }

    #[tokio::test]
    async fn test_signed_webhook_route() {
        let raw = r#"{"object":"whatsapp_business_account","entry":[]}"#;
        let signature = sign("app-secret", raw.as_bytes()).unwrap();
        let request = Request::post("/webhooks/whatsapp/")
            .header(SIGNATURE_HEADER, signature)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, "OK");
    }

    #[tokio::test]
    async fn test_status_route_requires_key() {
        let request = Request::get("/api/v1/messages/status/abc/")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::get("/api/v1/messages/status/abc/")
            .header("Api-Key", API_KEY)
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_route_without_provider() {
        let request = Request::post("/api/v1/messages/send/")
            .header("Api-Key", API_KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"to": "+15615551234", "body": "hi"}).to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
