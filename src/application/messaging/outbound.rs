//! Outbound messaging - Splits, logs and sends text through a transport

use std::sync::Arc;

use crate::domain::traits::{Outbound, Transport};

/// Handle to the current server connection, shared with plugin callbacks
#[derive(Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Our current nick
    pub fn me(&self) -> String {
        self.transport.current_nick()
    }

    pub fn privmsg(&self, dst: &str, msg: &str) {
        self.privmsg_n(dst, msg, None)
    }

    /// Send at most `max_lines` lines of `msg` as PRIVMSGs
    pub fn privmsg_n(&self, dst: &str, msg: &str, max_lines: Option<usize>) {
        for line in msg_to_lines_n(msg, max_lines) {
            tracing::info!("--> {}: {}", dst, line);
            self.send(Outbound::Privmsg {
                target: dst.to_string(),
                text: line,
            });
        }
    }

    pub fn notice(&self, dst: &str, msg: &str) {
        self.notice_n(dst, msg, None)
    }

    pub fn notice_n(&self, dst: &str, msg: &str, max_lines: Option<usize>) {
        for line in msg_to_lines_n(msg, max_lines) {
            tracing::info!("--> NOTICE[{}]: {}", dst, line);
            self.send(Outbound::Notice {
                target: dst.to_string(),
                text: line,
            });
        }
    }

    pub fn action(&self, dst: &str, msg: &str) {
        self.action_n(dst, msg, None)
    }

    pub fn action_n(&self, dst: &str, msg: &str, max_lines: Option<usize>) {
        let me = self.me();
        for line in msg_to_lines_n(msg, max_lines) {
            tracing::info!("--> ACTION[{}]: {} {}", dst, me, line);
            self.send(Outbound::Action {
                target: dst.to_string(),
                text: line,
            });
        }
    }

    pub fn nick(&self, nick: &str) {
        tracing::info!("--> NICK: {}", nick);
        self.send(Outbound::Nick(nick.to_string()));
    }

    pub fn raw(&self, line: &str) {
        tracing::info!("--> {}", line);
        self.send(Outbound::Raw(line.to_string()));
    }

    /// Ask the server to close the connection. Returns false if the QUIT
    /// could not be queued, i.e. the connection is already gone.
    pub fn quit(&self, msg: &str) -> bool {
        match self.transport.send(Outbound::Quit(msg.to_string())) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send QUIT: {}", e);
                false
            }
        }
    }

    fn send(&self, message: Outbound) {
        if let Err(e) = self.transport.send(message) {
            tracing::warn!("Failed to send message: {}", e);
        }
    }
}

/// Split text into its non-empty lines
pub fn msg_to_lines(msg: &str) -> Vec<String> {
    msg.split(['\n', '\r'])
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Like [`msg_to_lines`], but caps the output at `max_lines` lines, replacing
/// the last kept line with a note about how many were dropped.
pub fn msg_to_lines_n(msg: &str, max_lines: Option<usize>) -> Vec<String> {
    let mut lines = msg_to_lines(msg);
    if let Some(n) = max_lines.filter(|&n| n > 0) {
        if lines.len() > n {
            let omitted = lines.len() - n + 1;
            lines.truncate(n);
            lines[n - 1] = format!("...{} lines omitted...", omitted);
        }
    }
    lines
}

/// Amount of text that fits in one PRIVMSG to `dst`
pub fn allowed_privmsg_text_length(dst: &str) -> usize {
    510usize.saturating_sub("PRIVMSG ".len() + dst.len() + " :".len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Outbound>>,
    }

    impl Transport for Recorder {
        fn send(&self, message: Outbound) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        fn current_nick(&self) -> String {
            "voidbot".to_string()
        }
    }

    #[test]
    fn splits_on_newlines_and_drops_blank_lines() {
        assert_eq!(msg_to_lines("\none\r\n\ntwo\n"), vec!["one", "two"]);
        assert!(msg_to_lines("\r\n").is_empty());
    }

    #[test]
    fn caps_lines_with_omission_note() {
        let lines = msg_to_lines_n("a\nb\nc\nd", Some(2));
        assert_eq!(lines, vec!["a", "...3 lines omitted..."]);
        assert_eq!(msg_to_lines_n("a\nb", Some(2)), vec!["a", "b"]);
        assert_eq!(msg_to_lines_n("a\nb\nc", None).len(), 3);
    }

    #[test]
    fn privmsg_sends_one_message_per_line() {
        let recorder = Arc::new(Recorder::default());
        let conn = Connection::new(recorder.clone());
        conn.privmsg("#c", "hello\nworld");
        conn.notice("nick", "hi");

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[1],
            Outbound::Privmsg {
                target: "#c".into(),
                text: "world".into()
            }
        );
        assert!(matches!(&sent[2], Outbound::Notice { target, .. } if target == "nick"));
    }

    #[test]
    fn privmsg_length_budget() {
        assert_eq!(allowed_privmsg_text_length("#rust"), 510 - 8 - 5 - 2);
    }
}
