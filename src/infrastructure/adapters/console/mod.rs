//! Console adapter - operator commands typed on stdin

use std::io::BufRead;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::application::errors::CommandError;
use crate::application::messaging::Connection;
use crate::infrastructure::adapters::irc::Interrupt;

/// A slash command entered on the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Raw(String),
    Msg { target: String, text: String },
    Notice { target: String, text: String },
    Me { target: String, text: String },
    Nick(String),
}

impl ConsoleCommand {
    /// Parse one input line.
    ///
    /// Returns `Ok(None)` for lines that are not commands, and an
    /// [`CommandError::InvalidArgs`] carrying the usage text for malformed ones.
    pub fn parse(input: &str) -> Result<Option<Self>, CommandError> {
        let Some(input) = input.strip_prefix('/') else {
            return Ok(None);
        };
        let (cmd, rest) = input.split_once(' ').unwrap_or((input, ""));

        let command = match cmd {
            "raw" => ConsoleCommand::Raw(required(rest, "/raw line")?.to_string()),
            "msg" => {
                let (target, text) = target_and_text(rest, "/msg target text")?;
                ConsoleCommand::Msg { target, text }
            }
            "notice" => {
                let (target, text) = target_and_text(rest, "/notice target text")?;
                ConsoleCommand::Notice { target, text }
            }
            "me" => {
                let (target, text) = target_and_text(rest, "/me target text")?;
                ConsoleCommand::Me { target, text }
            }
            "nick" => {
                let nick = required(rest, "/nick nickname")?;
                if nick.contains(' ') {
                    return Err(usage("/nick nickname"));
                }
                ConsoleCommand::Nick(nick.to_string())
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn execute(&self, conn: &Connection) {
        match self {
            ConsoleCommand::Raw(line) => conn.raw(line),
            ConsoleCommand::Msg { target, text } => conn.privmsg(target, text),
            ConsoleCommand::Notice { target, text } => conn.notice(target, text),
            ConsoleCommand::Me { target, text } => conn.action(target, text),
            ConsoleCommand::Nick(nick) => conn.nick(nick),
        }
    }
}

fn usage(text: &str) -> CommandError {
    CommandError::InvalidArgs(format!("usage: {}", text))
}

fn required<'a>(rest: &'a str, usage_text: &str) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        return Err(usage(usage_text));
    }
    Ok(rest)
}

fn target_and_text(rest: &str, usage_text: &str) -> Result<(String, String), CommandError> {
    match rest.split_once(' ') {
        Some((target, text)) if !target.is_empty() && !text.is_empty() => Ok((target.to_string(), text.to_string())),
        _ => Err(usage(usage_text)),
    }
}

/// Reads operator commands from stdin and runs them against the current
/// connection. The reader outlives connections; call
/// [`ConsoleAdapter::replace_connection`] after every reconnect.
#[derive(Clone)]
pub struct ConsoleAdapter {
    conn: Arc<RwLock<Option<Connection>>>,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self {
            conn: Arc::new(RwLock::new(None)),
        }
    }

    pub fn replace_connection(&self, conn: Option<Connection>) {
        *self.conn.write().unwrap_or_else(PoisonError::into_inner) = conn;
    }

    /// Run one input line against the current connection
    pub fn handle_line(&self, input: &str) {
        let input = input.trim_end();
        if input.trim().is_empty() {
            return;
        }

        match ConsoleCommand::parse(input) {
            Ok(Some(command)) => match self.conn.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
                Some(conn) => command.execute(conn),
                None => warn!("Not connected; dropped {:?}", command),
            },
            Ok(None) => debug!("Ignoring console input: {}", input),
            Err(e) => error!("{}", e),
        }
    }

    /// Start reading stdin on its own thread. End of input sends an
    /// [`Interrupt`], same as Ctrl-C.
    pub fn spawn(&self, interrupts: mpsc::UnboundedSender<Interrupt>) -> std::io::Result<thread::JoinHandle<()>> {
        let console = self.clone();
        thread::Builder::new().name("console".to_string()).spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => console.handle_line(&line),
                    Err(e) => {
                        error!("Reading standard input: {}", e);
                        return;
                    }
                }
            }
            info!("End of console input");
            let _ = interrupts.send(Interrupt);
        })
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use crate::domain::traits::{Outbound, Transport};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Outbound>>);

    impl Transport for Recorder {
        fn send(&self, message: Outbound) -> Result<(), BotError> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }

        fn current_nick(&self) -> String {
            "voidbot".into()
        }
    }

    #[test]
    fn parses_slash_commands() {
        assert_eq!(
            ConsoleCommand::parse("/msg #c hello there").unwrap(),
            Some(ConsoleCommand::Msg {
                target: "#c".into(),
                text: "hello there".into()
            })
        );
        assert_eq!(
            ConsoleCommand::parse("/raw JOIN #rust").unwrap(),
            Some(ConsoleCommand::Raw("JOIN #rust".into()))
        );
        assert_eq!(ConsoleCommand::parse("/nick voidbot_").unwrap(), Some(ConsoleCommand::Nick("voidbot_".into())));
        assert_eq!(ConsoleCommand::parse("hello").unwrap(), None);
        assert_eq!(ConsoleCommand::parse("/unknown x").unwrap(), None);
    }

    #[test]
    fn reports_usage_for_malformed_commands() {
        for input in ["/msg #c", "/notice", "/me  text", "/nick a b", "/raw"] {
            assert!(
                matches!(ConsoleCommand::parse(input), Err(CommandError::InvalidArgs(msg)) if msg.starts_with("usage: /")),
                "{}",
                input
            );
        }
    }

    #[test]
    fn follows_the_current_connection() {
        let console = ConsoleAdapter::new();
        console.handle_line("/msg #c lost");

        let first = Arc::new(Recorder::default());
        console.replace_connection(Some(Connection::new(first.clone())));
        console.handle_line("/notice #c one");

        let second = Arc::new(Recorder::default());
        console.replace_connection(Some(Connection::new(second.clone())));
        console.handle_line("/me #c waves");

        assert_eq!(
            *first.0.lock().unwrap(),
            vec![Outbound::Notice {
                target: "#c".into(),
                text: "one".into()
            }]
        );
        assert_eq!(
            *second.0.lock().unwrap(),
            vec![Outbound::Action {
                target: "#c".into(),
                text: "waves".into()
            }]
        );
    }
}
