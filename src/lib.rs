//! voidbot - a plugin-driven IRC bot
//!
//! Plugins are driven through a once-only lifecycle by
//! [`plugins::PluginManager`] and share databases through
//! [`infrastructure::database::DatabaseRegistry`].

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
