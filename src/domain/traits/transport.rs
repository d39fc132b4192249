use crate::application::errors::BotError;

/// Outbound message understood by every transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Action { target: String, text: String },
    Nick(String),
    Quit(String),
    /// A complete protocol line, sent verbatim
    Raw(String),
}

/// Transport trait - abstraction over the live server connection
pub trait Transport: Send + Sync {
    /// Queue a message for sending
    fn send(&self, message: Outbound) -> Result<(), BotError>;

    /// The nick the server currently knows us by
    fn current_nick(&self) -> String;
}
