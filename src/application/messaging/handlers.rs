//! Per-connection line handlers, keyed by IRC command

use std::collections::HashMap;
use std::sync::Arc;

use super::Connection;
use crate::domain::entities::Line;

/// Handler function type
pub type LineHandler = Arc<dyn Fn(&Connection, &Line) + Send + Sync>;

/// Registry of line handlers for a single connection.
///
/// A fresh registry is built for every connection and filled in during the
/// new-connection phase; handlers for one command run in the order they were
/// added.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<LineHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to lines whose command is `command` (case-insensitive)
    pub fn add_handler<F>(&mut self, command: &str, handler: F)
    where
        F: Fn(&Connection, &Line) + Send + Sync + 'static,
    {
        self.handlers
            .entry(command.to_ascii_uppercase())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run every handler registered for the line's command. Returns how many ran.
    pub fn dispatch(&self, conn: &Connection, line: &Line) -> usize {
        match self.handlers.get(&line.command) {
            Some(handlers) => {
                for handler in handlers {
                    handler(conn, line);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    pub fn handles(&self, command: &str) -> bool {
        self.handlers.contains_key(&command.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
