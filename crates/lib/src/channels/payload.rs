//! Outbound Messenger message payloads: plain text, button templates, quick replies.
//!
//! Templates are validated when they are built, so anything that reaches the Send API
//! is structurally sound.

use reqwest::Url;
use serde::Serialize;
use serde_json::json;

/// Messenger rejects more buttons than this on a template element.
pub const MAX_TEMPLATE_BUTTONS: usize = 3;
/// Longest button title Messenger renders without truncation.
pub const MAX_BUTTON_TITLE_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed template: {0}")]
    MalformedTemplate(String),
}

fn malformed(msg: impl Into<String>) -> PayloadError {
    PayloadError::MalformedTemplate(msg.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Postback,
    WebUrl,
}

/// A template button. `target` is the postback payload or an absolute http(s) URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    kind: ButtonKind,
    title: String,
    target: String,
}

fn check_title(title: &str) -> Result<(), PayloadError> {
    if title.trim().is_empty() {
        return Err(malformed("button title is empty"));
    }
    if title.chars().count() > MAX_BUTTON_TITLE_CHARS {
        return Err(malformed(format!(
            "button title {:?} exceeds {} characters",
            title, MAX_BUTTON_TITLE_CHARS
        )));
    }
    Ok(())
}

impl Button {
    pub fn postback(title: impl Into<String>, payload: impl Into<String>) -> Result<Self, PayloadError> {
        let title = title.into();
        let payload = payload.into();
        check_title(&title)?;
        if payload.is_empty() {
            return Err(malformed(format!("postback button {:?} has no payload", title)));
        }
        Ok(Self {
            kind: ButtonKind::Postback,
            title,
            target: payload,
        })
    }

    pub fn web_url(title: impl Into<String>, url: &Url) -> Result<Self, PayloadError> {
        let title = title.into();
        check_title(&title)?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(malformed(format!("web_url button {:?} must use http(s): {}", title, url)));
        }
        Ok(Self {
            kind: ButtonKind::WebUrl,
            title,
            target: url.to_string(),
        })
    }

    pub fn kind(&self) -> ButtonKind {
        self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn to_json(&self) -> serde_json::Value {
        match self.kind {
            ButtonKind::Postback => json!({
                "type": "postback",
                "title": self.title,
                "payload": self.target,
            }),
            ButtonKind::WebUrl => json!({
                "type": "web_url",
                "title": self.title,
                "url": self.target,
            }),
        }
    }
}

/// Generic template with a single element: a title and 1–3 buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonTemplate {
    title: String,
    buttons: Vec<Button>,
}

impl ButtonTemplate {
    pub fn new(title: impl Into<String>, buttons: Vec<Button>) -> Result<Self, PayloadError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(malformed("template title is empty"));
        }
        if buttons.is_empty() {
            return Err(malformed("template has no buttons"));
        }
        if buttons.len() > MAX_TEMPLATE_BUTTONS {
            return Err(malformed(format!(
                "template has {} buttons, at most {} allowed",
                buttons.len(),
                MAX_TEMPLATE_BUTTONS
            )));
        }
        Ok(Self { title, buttons })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }
}

/// Quick reply offered under a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum QuickReply {
    /// Messenger pre-fills the user's phone number from their profile.
    UserPhoneNumber,
}

/// What the bot sends back to a user.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    PlainText { text: String },
    ButtonTemplate(ButtonTemplate),
    QuickReplyText { text: String, quick_replies: Vec<QuickReply> },
}

impl ResponsePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    /// The `message` object of a Send API request.
    pub fn to_message(&self) -> serde_json::Value {
        match self {
            Self::PlainText { text } => json!({ "text": text }),
            Self::ButtonTemplate(template) => {
                let buttons: Vec<serde_json::Value> =
                    template.buttons.iter().map(Button::to_json).collect();
                json!({
                    "attachment": {
                        "type": "template",
                        "payload": {
                            "template_type": "generic",
                            "elements": [{
                                "title": template.title,
                                "buttons": buttons,
                            }]
                        }
                    }
                })
            }
            Self::QuickReplyText { text, quick_replies } => json!({
                "text": text,
                "quick_replies": quick_replies,
            }),
        }
    }
}
