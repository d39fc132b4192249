//! Domain entities - IRC lines, typed bot events and commands

pub mod command;
pub mod event;
pub mod line;

pub use command::{Command, CommandRegistry, CommandScope};
pub use event::{Action, ChannelMessage, CommandInvocation, Event, UrlMention, Whisper};
pub use line::{is_channel, Line, Source};
