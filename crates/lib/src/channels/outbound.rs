//! Outbound sender seam: the gateway replies through this trait so the Messenger
//! implementation can be swapped for a recording one.

use crate::channels::payload::ResponsePayload;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("page access token not configured")]
    NotConfigured,
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("send api error: {0}")]
    Api(String),
}

/// Delivers a reply payload to a user (Messenger PSID).
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Channel id (e.g. "messenger"), used in logs.
    fn id(&self) -> &str;

    async fn send(&self, recipient_id: &str, payload: &ResponsePayload) -> Result<(), SendError>;
}
