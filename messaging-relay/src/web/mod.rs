//! HTTP surface of the relay.

pub mod handlers;
pub mod request;
pub mod routes;
pub mod schemas;

pub use handlers::{message_status, ping, receive_webhook, send_message, verify_webhook, AppState};
pub use request::{ApiRequest, ApiResponse, ResponseBody};
pub use routes::router;
