//! Support plugin that turns raw PRIVMSG lines into typed events

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::messaging::{Classified, Connection, EventRegistry, HandlerRegistry, MessageParser};
use crate::domain::entities::Line;
use crate::plugins::trait_def::{InitContext, Plugin, PluginResult};

/// Classifies every PRIVMSG as a command, action, channel message or whisper
/// and dispatches the matching event. Unnamed, so it is always enabled.
pub struct RouterPlugin {
    parser: Arc<MessageParser>,
    events: OnceCell<Arc<EventRegistry>>,
}

impl RouterPlugin {
    pub fn new() -> Self {
        Self::with_prefix("!")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            parser: Arc::new(MessageParser::new(prefix)),
            events: OnceCell::new(),
        }
    }
}

impl Default for RouterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for RouterPlugin {
    fn name(&self) -> &str {
        ""
    }

    fn description(&self) -> &str {
        "Routes PRIVMSG lines to typed events"
    }

    fn init(&self, ctx: &InitContext<'_>) -> PluginResult<()> {
        if self.events.set(ctx.events.clone()).is_err() {
            warn!("Router already initialized; keeping the first event registry");
        }
        Ok(())
    }

    fn new_connection(&self, handlers: &mut HandlerRegistry) {
        let Some(events) = self.events.get().cloned() else {
            warn!("Router was not initialized; PRIVMSG lines will not be routed");
            return;
        };
        let parser = self.parser.clone();
        handlers.add_handler("PRIVMSG", move |conn, line| route(&parser, &events, conn, line));
    }
}

/// Classify `line` and dispatch the resulting event
pub fn route(parser: &MessageParser, events: &EventRegistry, conn: &Connection, line: &Line) {
    let Some(classified) = parser.parse(line, &conn.me()) else {
        debug!("Malformed PRIVMSG: {}", line.raw);
        return;
    };

    match classified {
        Classified::Command(cmd) => {
            events.dispatch(conn, &cmd);
        }
        Classified::Action(action) => {
            events.dispatch(conn, &action);
        }
        Classified::Channel(msg) => {
            events.dispatch(conn, &msg);
        }
        Classified::Whisper(whisper) => {
            events.dispatch(conn, &whisper);
        }
        Classified::Unknown => warn!("Unknown destination on PRIVMSG: {}", line.raw),
    }
}
