//! Plugin system for voidbot
//!
//! Plugins are registered explicitly, in order, and driven through their
//! lifecycle by the [`PluginManager`].

pub mod builtin;
pub mod manager;
pub mod trait_def;

pub use manager::{PluginInfo, PluginManager, PluginManagerBuilder, SharedPluginManager, TeardownFailure};
pub use trait_def::{display_name, InitContext, Plugin, PluginResult};
