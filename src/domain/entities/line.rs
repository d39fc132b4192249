use std::fmt;

/// Origin of an IRC line (the `:prefix` part)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Source {
    pub nick: String,
    pub user: String,
    pub host: String,
    pub raw: String,
}

impl Source {
    /// Parse a prefix of the form `nick!user@host` or `server.name`.
    pub fn parse(prefix: &str) -> Self {
        let (nick, rest) = match prefix.split_once('!') {
            Some((nick, rest)) => (nick, Some(rest)),
            None => match prefix.split_once('@') {
                Some((nick, host)) => {
                    return Self {
                        nick: nick.to_string(),
                        user: String::new(),
                        host: host.to_string(),
                        raw: prefix.to_string(),
                    }
                }
                None => (prefix, None),
            },
        };

        // A bare server name carries no nick
        if rest.is_none() && nick.contains('.') {
            return Self {
                host: nick.to_string(),
                raw: prefix.to_string(),
                ..Self::default()
            };
        }

        let (user, host) = rest
            .map(|r| r.split_once('@').unwrap_or((r, "")))
            .unwrap_or(("", ""));

        Self {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            raw: prefix.to_string(),
        }
    }

    /// `user@host`, as shown in CTCP and console logs
    pub fn ident(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nick.is_empty() {
            write!(f, "{}", self.raw)
        } else {
            write!(f, "{}", self.nick)
        }
    }
}

/// A single parsed line received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub source: Source,
    pub command: String,
    pub args: Vec<String>,
    pub raw: String,
}

impl Line {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        let command = command.into().to_ascii_uppercase();
        Self {
            raw: Self::render(None, &command, &args),
            source: Source::default(),
            command,
            args,
        }
    }

    pub fn with_source(mut self, prefix: &str) -> Self {
        self.source = Source::parse(prefix);
        self.raw = Self::render(Some(prefix), &self.command, &self.args);
        self
    }

    /// Split a raw line into prefix, command and arguments.
    ///
    /// Message tags are skipped; trailing CR/LF is ignored. Returns `None` for
    /// lines without a command.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_end_matches(['\r', '\n']);
        let mut rest = trimmed;

        if rest.starts_with('@') {
            rest = rest.split_once(' ').map(|(_, r)| r).unwrap_or("");
        }
        rest = rest.trim_start_matches(' ');

        let mut source = Source::default();
        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            source = Source::parse(prefix);
            rest = r.trim_start_matches(' ');
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return None;
        }

        let mut args = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                args.push(trailing.to_string());
                break;
            }
            let (arg, r) = rest.split_once(' ').unwrap_or((rest, ""));
            args.push(arg.to_string());
            rest = r;
        }

        Some(Self {
            source,
            command: command.to_ascii_uppercase(),
            args,
            raw: trimmed.to_string(),
        })
    }

    /// True when the line was sent by the given nick
    pub fn is_from(&self, nick: &str) -> bool {
        !self.source.nick.is_empty() && self.source.nick.eq_ignore_ascii_case(nick)
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    fn render(prefix: Option<&str>, command: &str, args: &[String]) -> String {
        let mut raw = String::new();
        if let Some(prefix) = prefix {
            raw.push(':');
            raw.push_str(prefix);
            raw.push(' ');
        }
        raw.push_str(command);
        for (i, arg) in args.iter().enumerate() {
            raw.push(' ');
            if i + 1 == args.len() && (arg.is_empty() || arg.contains(' ') || arg.starts_with(':')) {
                raw.push(':');
            }
            raw.push_str(arg);
        }
        raw
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// True if `target` names a channel rather than a user
pub fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_trailing() {
        let line = Line::parse(":dan!~d@localhost PRIVMSG #rust :hello there\r\n").unwrap();
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.args, vec!["#rust", "hello there"]);
        assert_eq!(line.source.nick, "dan");
        assert_eq!(line.source.user, "~d");
        assert_eq!(line.source.host, "localhost");
        assert_eq!(line.raw, ":dan!~d@localhost PRIVMSG #rust :hello there");
    }

    #[test]
    fn parses_server_numeric_without_nick() {
        let line = Line::parse(":irc.example.net 001 voidbot :Welcome").unwrap();
        assert_eq!(line.command, "001");
        assert!(line.source.nick.is_empty());
        assert_eq!(line.source.host, "irc.example.net");
        assert_eq!(line.arg(0), Some("voidbot"));
    }

    #[test]
    fn skips_tags_and_handles_missing_prefix() {
        let line = Line::parse("@time=2020 PING :token").unwrap();
        assert_eq!(line.command, "PING");
        assert_eq!(line.args, vec!["token"]);
        assert!(Line::parse("   ").is_none());
    }

    #[test]
    fn constructed_lines_render_raw_text() {
        let line = Line::new("privmsg", vec!["#c".into(), "two words".into()]).with_source("a!b@c");
        assert_eq!(line.raw, ":a!b@c PRIVMSG #c :two words");
        assert!(line.is_from("A"));
        assert!(is_channel("#c"));
        assert!(!is_channel("nick"));
    }
}
