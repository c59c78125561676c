//! Gateway: the Messenger webhook endpoint.
//!
//! One port serves `GET /webhook` (subscription handshake and SafeTrek OAuth redirect),
//! `POST /webhook` (event deliveries), and `GET /` (health).

mod protocol;
mod server;

pub use protocol::{classify_delivery, GetRequest, WebhookError, WebhookQuery, EVENT_RECEIVED};
pub use server::{build_http_client, build_state, router, run_gateway, GatewayState};
