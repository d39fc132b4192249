//! Plugins shipped with the bot

pub mod commands;
pub mod router;
pub mod urls;

use std::sync::Arc;

use super::Plugin;

pub use commands::CommandsPlugin;
pub use router::RouterPlugin;
pub use urls::UrlsPlugin;

/// Every built-in plugin, in registration order. The router comes first so
/// events exist before anything subscribes to them.
pub fn all() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(RouterPlugin::new()),
        Arc::new(CommandsPlugin::new()),
        Arc::new(UrlsPlugin::new()),
    ]
}
