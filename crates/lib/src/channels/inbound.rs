//! Inbound event from Messenger: one classified messaging event, handed to the conversation handler.

/// Latitude/longitude from a shared location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}

/// Message attachment. Only location coordinates matter here; other kinds carry `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attachment {
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Message {
        text: Option<String>,
        attachments: Vec<Attachment>,
    },
    Postback {
        payload: String,
    },
}

/// A messaging event from one sender (PSID).
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub sender_id: String,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: EventKind::Message {
                text: Some(text.into()),
                attachments: Vec::new(),
            },
        }
    }

    pub fn postback(sender_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: EventKind::Postback {
                payload: payload.into(),
            },
        }
    }
}
