//! Plugin trait definitions

use std::sync::Arc;

use crate::application::errors::PluginError;
use crate::application::messaging::{EventRegistry, HandlerRegistry};
use crate::infrastructure::config::PluginSettings;
use crate::infrastructure::database::DatabaseRegistry;

/// Result type for plugin callbacks
pub type PluginResult<T> = Result<T, PluginError>;

/// Core plugin trait that all plugins must implement.
///
/// Every lifecycle callback has a no-op default, so a plugin only implements
/// the phases it cares about. Callbacks take `&self`; plugins keep mutable
/// state behind their own locks.
pub trait Plugin: Send + Sync {
    /// Unique identifier for the plugin.
    ///
    /// An empty name marks a support plugin, which is always initialized
    /// regardless of the configured allow-list.
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Called once before the first connection. Subscribe to events and
    /// acquire shared resources here.
    fn init(&self, _ctx: &InitContext<'_>) -> PluginResult<()> {
        Ok(())
    }

    /// Called for every new server connection, to add line handlers
    fn new_connection(&self, _handlers: &mut HandlerRegistry) {}

    /// Called when the connection is lost; drop per-connection state here
    fn disconnected(&self) {}

    /// Called once at shutdown if `init` succeeded. Release resources here.
    fn teardown(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// Everything a plugin receives during init
pub struct InitContext<'a> {
    pub events: &'a Arc<EventRegistry>,
    pub resources: &'a Arc<DatabaseRegistry>,
    pub settings: &'a PluginSettings,
}

impl<'a> InitContext<'a> {
    pub fn new(
        events: &'a Arc<EventRegistry>,
        resources: &'a Arc<DatabaseRegistry>,
        settings: &'a PluginSettings,
    ) -> Self {
        Self {
            events,
            resources,
            settings,
        }
    }

    /// A string setting, or `default` when absent
    pub fn setting_or(&self, key: &str, default: &str) -> PluginResult<String> {
        match self.settings.raw(key) {
            None => Ok(default.to_string()),
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| PluginError::Config(format!("'{}' must be a string", key))),
        }
    }
}

/// Display name used in logs; support plugins have no name of their own
pub fn display_name(plugin: &dyn Plugin) -> &str {
    match plugin.name() {
        "" => "<support>",
        name => name,
    }
}
