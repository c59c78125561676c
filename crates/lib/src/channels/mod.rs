//! Messaging channels (Messenger).
//!
//! Inbound webhook entries are classified into [`InboundEvent`]s; replies go out through
//! an [`OutboundSender`].

mod inbound;
mod messenger;
mod outbound;
mod payload;

pub use inbound::{Attachment, Coordinates, EventKind, InboundEvent};
pub use messenger::{delivery_entries, parse_entry, MessengerChannel, PAGE_OBJECT};
pub use outbound::{OutboundSender, SendError};
pub use payload::{
    Button, ButtonKind, ButtonTemplate, PayloadError, QuickReply, ResponsePayload,
    MAX_BUTTON_TITLE_CHARS, MAX_TEMPLATE_BUTTONS,
};
