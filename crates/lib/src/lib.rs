//! SafeBot core library: Messenger webhook routing, conversation replies,
//! and the SafeTrek OAuth token exchange, used by the `safebot` CLI.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod safetrek;
