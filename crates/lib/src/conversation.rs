//! Conversation handler: picks the reply (or dispatch alert) for a classified Messenger event.
//!
//! Every input lands on an explicit [`Decision`]; keywords whose flows are not built yet
//! map to [`Decision::Reserved`] so "send nothing" is a visible outcome rather than a
//! fallthrough.

use crate::channels::{
    Button, ButtonTemplate, EventKind, InboundEvent, PayloadError, QuickReply, ResponsePayload,
};
use reqwest::Url;

pub const INFO_TEXT: &str = "SafeBot is here to help. If you experience an emergency, you can send \"help\" at any time. We will take you through steps to get the help you need and someone from SafeTrek will contact you. For specific situations, send \"police\", \"fire\", or \"medical\" to send an alert to the police, the fire department, or emergency medical services, respectively.";

pub const HELP_TITLE: &str = "If you need help, press one of the buttons below. For more general information about SafeBot, type \"info\".";

pub const LOGIN_TITLE: &str = "Hello! If you need help, press the button below to login to SafeTrek. If you want to learn more about what we can do for you, type \"info\" at any time.";

pub const LOCATION_RECEIVED_TEXT: &str = "Location received. We are sending help. One of our call center employees will be on this conversation in a moment. \nIf you want, you can share your phone number and we will contact you that way.";

pub const THANKS_TEXT: &str = "Thanks!";

pub const RETRY_TEXT: &str = "Sorry about that. Try sending another.";

/// Keywords and postbacks reserved for flows that do not reply yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    Police,
    Fire,
    Medical,
    SafetrekLogin,
    NoHelpWanted,
}

/// Dispatch trigger raised when a user shares their location.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub sender_id: String,
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Reply(ResponsePayload),
    /// Location shared: raise the alert, then reply.
    Dispatch {
        alert: AlertRequest,
        reply: ResponsePayload,
    },
    Reserved(Reserved),
    /// Nothing we answer (unknown postback, attachment without a location, empty message).
    Ignored,
}

impl Decision {
    /// The payload to send, if any. Reserved and Ignored never reach the sender.
    pub fn reply(&self) -> Option<&ResponsePayload> {
        match self {
            Decision::Reply(payload) => Some(payload),
            Decision::Dispatch { reply, .. } => Some(reply),
            Decision::Reserved(_) | Decision::Ignored => None,
        }
    }

    pub fn alert(&self) -> Option<&AlertRequest> {
        match self {
            Decision::Dispatch { alert, .. } => Some(alert),
            _ => None,
        }
    }
}

/// Decides replies. Holds the SafeTrek login URL used by the get-started template.
#[derive(Debug, Clone)]
pub struct ConversationHandler {
    login_url: Option<Url>,
}

impl ConversationHandler {
    /// `login_url` is None when no SafeTrek client id is configured; get_started is then ignored.
    pub fn new(login_url: Option<Url>) -> Self {
        Self { login_url }
    }

    pub fn decide(&self, event: &InboundEvent) -> Result<Decision, PayloadError> {
        match &event.kind {
            EventKind::Message { text: Some(text), .. } => decide_text(text),
            EventKind::Message { text: None, attachments } => {
                let location = attachments.iter().find_map(|a| a.coordinates);
                Ok(match location {
                    Some(c) => Decision::Dispatch {
                        alert: AlertRequest {
                            sender_id: event.sender_id.clone(),
                            lat: c.lat,
                            long: c.long,
                        },
                        reply: ResponsePayload::QuickReplyText {
                            text: LOCATION_RECEIVED_TEXT.to_string(),
                            quick_replies: vec![QuickReply::UserPhoneNumber],
                        },
                    },
                    None => Decision::Ignored,
                })
            }
            EventKind::Postback { payload } => self.decide_postback(payload),
        }
    }

    fn decide_postback(&self, payload: &str) -> Result<Decision, PayloadError> {
        let decision = match payload {
            "yes" => Decision::Reply(ResponsePayload::text(THANKS_TEXT)),
            "no" => Decision::Reply(ResponsePayload::text(RETRY_TEXT)),
            "get_started" => match &self.login_url {
                Some(url) => Decision::Reply(login_template(url)?),
                None => {
                    log::warn!("get_started received but no safetrek client id is configured");
                    Decision::Ignored
                }
            },
            "safetrek_login" => Decision::Reserved(Reserved::SafetrekLogin),
            "police" => Decision::Reserved(Reserved::Police),
            "fire" => Decision::Reserved(Reserved::Fire),
            "medical" => Decision::Reserved(Reserved::Medical),
            "no_help_wanted" => Decision::Reserved(Reserved::NoHelpWanted),
            _ => Decision::Ignored,
        };
        Ok(decision)
    }
}

fn decide_text(text: &str) -> Result<Decision, PayloadError> {
    let decision = match text {
        "info" => Decision::Reply(ResponsePayload::text(INFO_TEXT)),
        "help" => Decision::Reply(help_template()?),
        "police" => Decision::Reserved(Reserved::Police),
        "fire" => Decision::Reserved(Reserved::Fire),
        "medical" => Decision::Reserved(Reserved::Medical),
        other => Decision::Reply(ResponsePayload::text(format!(
            "You sent the message: \"{}\"",
            other
        ))),
    };
    Ok(decision)
}

fn help_template() -> Result<ResponsePayload, PayloadError> {
    let buttons = vec![
        Button::postback("Police", "police")?,
        Button::postback("Fire", "fire")?,
        Button::postback("Medical", "medical")?,
    ];
    Ok(ResponsePayload::ButtonTemplate(ButtonTemplate::new(HELP_TITLE, buttons)?))
}

fn login_template(url: &Url) -> Result<ResponsePayload, PayloadError> {
    let buttons = vec![Button::web_url("Login", url)?];
    Ok(ResponsePayload::ButtonTemplate(ButtonTemplate::new(LOGIN_TITLE, buttons)?))
}
