//! Generic command plugin (`!help`, `!version`)

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::CommandError;
use crate::application::messaging::Connection;
use crate::application::services::command_service::CommandService;
use crate::domain::entities::CommandInvocation;
use crate::plugins::trait_def::{InitContext, Plugin, PluginResult};

/// Longest reply, in lines, before the rest is elided
const MAX_REPLY_LINES: usize = 5;

/// Answers the commands registered in its [`CommandService`].
///
/// Commands it does not know are left alone so other plugins can answer them.
pub struct CommandsPlugin {
    service: Arc<CommandService>,
}

impl CommandsPlugin {
    pub fn new() -> Self {
        let mut service = CommandService::new("!");
        service.register_defaults();
        Self::with_service(service)
    }

    pub fn with_service(service: CommandService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl Default for CommandsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CommandsPlugin {
    fn name(&self) -> &str {
        "commands"
    }

    fn description(&self) -> &str {
        "Built-in help and version commands"
    }

    fn init(&self, ctx: &InitContext<'_>) -> PluginResult<()> {
        let service = self.service.clone();
        ctx.events
            .subscribe(move |conn: &Connection, cmd: &CommandInvocation| answer(&service, conn, cmd));
        // `help` is built into the service
        info!("Loaded {} commands", self.service.len() + 1);
        Ok(())
    }
}

fn answer(service: &CommandService, conn: &Connection, cmd: &CommandInvocation) {
    match service.handle(cmd) {
        Ok(reply) => conn.privmsg_n(&cmd.reply_to, &reply, Some(MAX_REPLY_LINES)),
        Err(CommandError::NotFound(name)) => debug!("Ignoring unknown command: {}", name),
        Err(e) => {
            warn!("Command {} failed: {}", cmd.name, e);
            conn.notice(&cmd.reply_to, &e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use crate::application::messaging::EventRegistry;
    use crate::domain::entities::{Command, Line};
    use crate::domain::traits::{Outbound, Transport};
    use crate::infrastructure::config::PluginSettings;
    use crate::infrastructure::database::DatabaseRegistry;
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

    fn invocation(name: &str, arg: &str) -> CommandInvocation {
        CommandInvocation {
            line: Line::new("PRIVMSG", vec!["#c".into(), format!("!{} {}", name, arg)]),
            name: name.into(),
            arg: arg.into(),
            reply_to: "#c".into(),
            is_private: false,
        }
    }

    #[test]
    fn answers_known_commands_and_ignores_others() {
        let mut service = CommandService::new("!");
        service.register_defaults();
        service.register(
            Command::new("fail").with_handler(|_| Err(CommandError::InvalidArgs("need a ticker".into()))),
        );
        let plugin = CommandsPlugin::with_service(service);

        let events = Arc::new(EventRegistry::new());
        let resources = Arc::new(DatabaseRegistry::sqlite());
        let settings = PluginSettings::new();
        plugin.init(&InitContext::new(&events, &resources, &settings)).unwrap();

        let recorder = Arc::new(Recorder::default());
        let conn = Connection::new(recorder.clone());
        events.dispatch(&conn, &invocation("version", ""));
        events.dispatch(&conn, &invocation("stocks", "AAPL"));
        events.dispatch(&conn, &invocation("fail", ""));

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            Outbound::Privmsg {
                target: "#c".into(),
                text: format!("voidbot v{}", env!("CARGO_PKG_VERSION")),
            }
        );
        assert!(matches!(&sent[1], Outbound::Notice { text, .. } if text.contains("need a ticker")));
    }
}
