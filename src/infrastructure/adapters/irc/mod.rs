//! IRC adapter built on the `irc` crate
//!
//! The `irc` client takes care of registration, PING replies, CTCP VERSION
//! and channel joins. This adapter turns its messages into [`Line`]s for the
//! handler registry and implements [`Transport`] on top of its sender.

use futures::StreamExt;
use ::irc::client::prelude::{Client, Command, Config as IrcConfig, Message, Sender};
use ::irc::client::ClientStream;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::errors::BotError;
use crate::application::messaging::{Connection, HandlerRegistry};
use crate::domain::entities::Line;
use crate::domain::traits::{Outbound, Transport};
use crate::infrastructure::config::Config;

/// Operator request to stop: first one quits politely, second drops the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the connection on its own
    Disconnected,
    /// We were asked to quit
    Quit,
}

/// Creates IRC sessions from the bot configuration
pub struct IrcAdapter {
    config: IrcConfig,
}

impl IrcAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            config: IrcConfig {
                nickname: Some(config.identity.nick.clone()),
                username: Some(config.identity.user.clone()),
                realname: Some(config.identity.realname.clone()),
                server: Some(config.server.host.clone()),
                port: Some(config.server.port),
                password: config.server.password.clone(),
                use_tls: Some(config.server.tls),
                channels: config.channels.clone(),
                version: Some(format!("voidbot v{}", env!("CARGO_PKG_VERSION"))),
                ..IrcConfig::default()
            },
        }
    }

    /// Connect and register with the server
    pub async fn connect(&self) -> Result<IrcSession, BotError> {
        info!(
            "Connecting to {}:{}...",
            self.config.server.as_deref().unwrap_or_default(),
            self.config.port.unwrap_or_default()
        );
        let mut client = Client::from_config(self.config.clone()).await.map_err(network)?;
        client.identify().map_err(network)?;
        let stream = client.stream().map_err(network)?;

        let transport = Arc::new(IrcTransport {
            sender: client.sender(),
            nick: RwLock::new(self.config.nickname.clone().unwrap_or_default()),
        });
        info!("Connected");

        Ok(IrcSession {
            _client: client,
            stream,
            transport,
        })
    }
}

/// A live server connection
pub struct IrcSession {
    _client: Client,
    stream: ClientStream,
    transport: Arc<IrcTransport>,
}

impl IrcSession {
    pub fn connection(&self) -> Connection {
        Connection::new(self.transport.clone())
    }

    /// Feed incoming lines to `handlers` until the connection ends.
    ///
    /// The first interrupt sends QUIT and keeps reading until the server hangs
    /// up; a second one (or a failed QUIT) drops the connection.
    pub async fn run(
        mut self,
        handlers: &HandlerRegistry,
        interrupts: &mut mpsc::UnboundedReceiver<Interrupt>,
    ) -> Result<SessionEnd, BotError> {
        let conn = self.connection();
        let mut quit_sent = false;

        loop {
            tokio::select! {
                message = self.stream.next() => match message {
                    Some(Ok(message)) => self.handle(&conn, handlers, &message),
                    Some(Err(e)) if quit_sent => {
                        debug!("Connection closed after QUIT: {}", e);
                        return Ok(SessionEnd::Quit);
                    }
                    Some(Err(e)) => return Err(network(e)),
                    None if quit_sent => return Ok(SessionEnd::Quit),
                    None => {
                        info!("Disconnected");
                        return Ok(SessionEnd::Disconnected);
                    }
                },
                interrupt = interrupts.recv() => {
                    if interrupt.is_none() || quit_sent {
                        warn!("Dropping connection");
                        return Ok(SessionEnd::Quit);
                    }
                    quit_sent = true;
                    info!("Quitting...");
                    if !conn.quit("Quitting...") {
                        return Ok(SessionEnd::Quit);
                    }
                }
            }
        }
    }

    fn handle(&self, conn: &Connection, handlers: &HandlerRegistry, message: &Message) {
        let raw = message.to_string();
        let Some(line) = Line::parse(raw.trim_end_matches(['\r', '\n'])) else {
            debug!("Unparsable line: {}", raw.trim_end());
            return;
        };

        match line.command.as_str() {
            // RPL_WELCOME: first argument is the nick we registered with
            "001" => {
                if let Some(nick) = line.arg(0) {
                    self.transport.set_nick(nick);
                }
            }
            "NICK" if line.is_from(&self.transport.current_nick()) => {
                if let Some(nick) = line.arg(0) {
                    info!("Now known as {}", nick);
                    self.transport.set_nick(nick);
                }
            }
            _ => {}
        }

        handlers.dispatch(conn, &line);
    }
}

/// [`Transport`] over an `irc` client sender
pub struct IrcTransport {
    sender: Sender,
    nick: RwLock<String>,
}

impl IrcTransport {
    fn set_nick(&self, nick: &str) {
        *self.nick.write().unwrap_or_else(PoisonError::into_inner) = nick.to_string();
    }
}

impl Transport for IrcTransport {
    fn send(&self, message: Outbound) -> Result<(), BotError> {
        let sent = match message {
            Outbound::Privmsg { target, text } => self.sender.send_privmsg(target, text),
            Outbound::Notice { target, text } => self.sender.send_notice(target, text),
            Outbound::Action { target, text } => self.sender.send_action(target, text),
            Outbound::Nick(nick) => self.sender.send(Command::NICK(nick)),
            Outbound::Quit(msg) => self.sender.send_quit(msg),
            Outbound::Raw(line) => {
                let message = line
                    .parse::<Message>()
                    .map_err(|e| BotError::Network(format!("Invalid raw line '{}': {}", line, e)))?;
                self.sender.send(message)
            }
        };
        sent.map_err(network)
    }

    fn current_nick(&self) -> String {
        self.nick.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn network(e: ::irc::error::Error) -> BotError {
    BotError::Network(e.to_string())
}
