//! Typed bot events dispatched through the event registry
//!
//! Each event type gets its own subscription list, so subscribers receive a
//! concrete struct instead of an untyped argument list.

use super::Line;
use std::any::Any;

/// Marker for types that can be dispatched through the event registry
pub trait Event: Any + Send + Sync {
    /// Name used in logs
    const KIND: &'static str;
}

/// Plain text sent to a channel
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub line: Line,
    pub channel: String,
    pub text: String,
}

impl Event for ChannelMessage {
    const KIND: &'static str = "PRIVMSG";
}

/// Plain text sent directly to the bot
#[derive(Debug, Clone)]
pub struct Whisper {
    pub line: Line,
    pub text: String,
}

impl Event for Whisper {
    const KIND: &'static str = "WHISPER";
}

/// CTCP ACTION (`/me`)
#[derive(Debug, Clone)]
pub struct Action {
    pub line: Line,
    pub target: String,
    pub text: String,
    pub is_private: bool,
}

impl Event for Action {
    const KIND: &'static str = "ACTION";
}

/// A `!command arg` invocation
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub line: Line,
    pub name: String,
    pub arg: String,
    /// Where replies should go: the channel, or the sender for private commands
    pub reply_to: String,
    pub is_private: bool,
}

impl CommandInvocation {
    pub fn args(&self) -> Vec<&str> {
        self.arg.split_whitespace().collect()
    }
}

impl Event for CommandInvocation {
    const KIND: &'static str = "COMMAND";
}

/// A URL mentioned in a channel
#[derive(Debug, Clone)]
pub struct UrlMention {
    pub line: Line,
    pub channel: String,
    pub url: url::Url,
}

impl Event for UrlMention {
    const KIND: &'static str = "URL";
}
