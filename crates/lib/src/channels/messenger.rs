//! Messenger channel: webhook body parsing and replies via the Send API.

use crate::channels::inbound::{Attachment, Coordinates, EventKind, InboundEvent};
use crate::channels::outbound::{OutboundSender, SendError};
use crate::channels::payload::ResponsePayload;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// `object` value Messenger sets on page subscription deliveries.
pub const PAGE_OBJECT: &str = "page";

/// Entries of a page delivery, left raw so one malformed entry does not reject the batch.
/// A missing or non-array `entry` yields nothing.
pub fn delivery_entries(body: serde_json::Value) -> Vec<serde_json::Value> {
    match body {
        serde_json::Value::Object(mut map) => match map.remove("entry") {
            Some(serde_json::Value::Array(entries)) => entries,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: WebhookSender,
    #[serde(default)]
    message: Option<WebhookMessage>,
    #[serde(default)]
    postback: Option<WebhookPostback>,
}

#[derive(Debug, Deserialize)]
struct WebhookSender {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    attachments: Vec<WebhookAttachment>,
}

#[derive(Debug, Deserialize)]
struct WebhookAttachment {
    #[serde(default)]
    payload: Option<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    #[serde(default)]
    coordinates: Option<WebhookCoordinates>,
}

#[derive(Debug, Deserialize)]
struct WebhookCoordinates {
    lat: f64,
    long: f64,
}

#[derive(Debug, Deserialize)]
struct WebhookPostback {
    #[serde(default)]
    payload: String,
}

impl MessagingEvent {
    fn into_inbound(self) -> Option<InboundEvent> {
        let sender_id = self.sender.id.trim().to_string();
        if sender_id.is_empty() {
            return None;
        }
        let kind = if let Some(message) = self.message {
            let attachments = message
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    coordinates: a
                        .payload
                        .and_then(|p| p.coordinates)
                        .map(|c| Coordinates { lat: c.lat, long: c.long }),
                })
                .collect();
            EventKind::Message {
                text: message.text,
                attachments,
            }
        } else if let Some(postback) = self.postback {
            EventKind::Postback {
                payload: postback.payload,
            }
        } else {
            return None;
        };
        Some(InboundEvent { sender_id, kind })
    }
}

/// Classify one webhook entry. Messenger batches one messaging event per entry, so only the
/// first is read. Returns None for entries without a usable message or postback.
pub fn parse_entry(entry: serde_json::Value) -> Option<InboundEvent> {
    let entry: WebhookEntry = match serde_json::from_value(entry) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("messenger: skipping malformed entry: {}", e);
            return None;
        }
    };
    entry.messaging.into_iter().next()?.into_inbound()
}

/// Messenger Send API client.
pub struct MessengerChannel {
    id: String,
    page_access_token: Option<String>,
    send_api_url: String,
    client: reqwest::Client,
}

impl MessengerChannel {
    /// `client` should carry the outbound timeout.
    pub fn new(client: reqwest::Client, page_access_token: Option<String>, send_api_url: String) -> Self {
        Self {
            id: "messenger".to_string(),
            page_access_token,
            send_api_url,
            client,
        }
    }

    /// POST `{recipient:{id}, message}` to the Send API with the page token as `access_token`.
    pub async fn send_message(&self, recipient_id: &str, payload: &ResponsePayload) -> Result<(), SendError> {
        let token = self
            .page_access_token
            .as_ref()
            .ok_or(SendError::NotConfigured)?;
        let body = json!({
            "recipient": { "id": recipient_id },
            "message": payload.to_message(),
        });
        let res = self
            .client
            .post(&self.send_api_url)
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SendError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundSender for MessengerChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, recipient_id: &str, payload: &ResponsePayload) -> Result<(), SendError> {
        self.send_message(recipient_id, payload).await
    }
}
