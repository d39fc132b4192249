//! Message parser - Classifies incoming PRIVMSG lines into typed events

use crate::domain::entities::{is_channel, Action, ChannelMessage, CommandInvocation, Line, Whisper};

const CTCP_ACTION: &str = "\u{1}ACTION ";

/// What a PRIVMSG line turned out to be
#[derive(Debug, Clone)]
pub enum Classified {
    Command(CommandInvocation),
    Action(Action),
    Channel(ChannelMessage),
    Whisper(Whisper),
    /// Sent to neither a channel nor us
    Unknown,
}

/// Parses PRIVMSG lines into structured events
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Classify a PRIVMSG. Returns `None` for malformed lines.
    pub fn parse(&self, line: &Line, me: &str) -> Option<Classified> {
        if line.command != "PRIVMSG" || line.args.len() != 2 {
            return None;
        }
        let dst = &line.args[0];
        let text = &line.args[1];

        if let Some(action) = text.strip_prefix(CTCP_ACTION) {
            let action = action.strip_suffix('\u{1}').unwrap_or(action);
            return Some(Classified::Action(Action {
                line: line.clone(),
                target: dst.clone(),
                text: action.to_string(),
                is_private: !is_channel(dst),
            }));
        }

        if let Some(command) = self.parse_command(line, dst, text) {
            return Some(Classified::Command(command));
        }

        if is_channel(dst) {
            Some(Classified::Channel(ChannelMessage {
                line: line.clone(),
                channel: dst.clone(),
                text: text.clone(),
            }))
        } else if dst.eq_ignore_ascii_case(me) {
            Some(Classified::Whisper(Whisper {
                line: line.clone(),
                text: text.clone(),
            }))
        } else {
            Some(Classified::Unknown)
        }
    }

    /// A command is the prefix immediately followed by a letter
    fn parse_command(&self, line: &Line, dst: &str, text: &str) -> Option<CommandInvocation> {
        let rest = text.strip_prefix(self.command_prefix.as_str())?;
        if !rest.chars().next().is_some_and(char::is_alphabetic) {
            return None;
        }

        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        let (reply_to, is_private) = if is_channel(dst) {
            (dst.to_string(), false)
        } else {
            (line.source.nick.clone(), true)
        };

        Some(CommandInvocation {
            line: line.clone(),
            name: name.to_string(),
            arg: arg.to_string(),
            reply_to,
            is_private,
        })
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new("!")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privmsg(dst: &str, text: &str) -> Line {
        Line::new("PRIVMSG", vec![dst.into(), text.into()]).with_source("dan!d@host")
    }

    #[test]
    fn detects_channel_commands() {
        let parser = MessageParser::default();
        let Some(Classified::Command(cmd)) = parser.parse(&privmsg("#rust", "!help me please"), "voidbot") else {
            panic!("expected a command");
        };
        assert_eq!(cmd.name, "help");
        assert_eq!(cmd.arg, "me please");
        assert_eq!(cmd.reply_to, "#rust");
        assert!(!cmd.is_private);
    }

    #[test]
    fn private_commands_reply_to_sender() {
        let parser = MessageParser::default();
        let Some(Classified::Command(cmd)) = parser.parse(&privmsg("voidbot", "!version"), "voidbot") else {
            panic!("expected a command");
        };
        assert_eq!(cmd.reply_to, "dan");
        assert!(cmd.is_private);
    }

    #[test]
    fn prefix_must_be_followed_by_a_letter() {
        let parser = MessageParser::default();
        assert!(matches!(
            parser.parse(&privmsg("#rust", "!!!"), "voidbot"),
            Some(Classified::Channel(_))
        ));
        assert!(matches!(
            parser.parse(&privmsg("#rust", "!"), "voidbot"),
            Some(Classified::Channel(_))
        ));
    }

    #[test]
    fn classifies_actions_whispers_and_strangers() {
        let parser = MessageParser::default();
        let Some(Classified::Action(action)) = parser.parse(&privmsg("#rust", "\u{1}ACTION waves\u{1}"), "voidbot") else {
            panic!("expected an action");
        };
        assert_eq!(action.text, "waves");
        assert!(!action.is_private);

        assert!(matches!(
            parser.parse(&privmsg("VoidBot", "psst"), "voidbot"),
            Some(Classified::Whisper(w)) if w.text == "psst"
        ));
        assert!(matches!(parser.parse(&privmsg("someone", "hi"), "voidbot"), Some(Classified::Unknown)));
        assert!(parser.parse(&Line::new("PRIVMSG", vec!["#rust".into()]), "voidbot").is_none());
    }
}
