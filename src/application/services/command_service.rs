use crate::application::errors::CommandError;
use crate::domain::entities::{Command, CommandInvocation, CommandRegistry};

/// Service for managing and executing commands
pub struct CommandService {
    registry: CommandRegistry,
    prefix: String,
}

impl CommandService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            registry: CommandRegistry::new(),
            prefix: prefix.into(),
        }
    }

    pub fn register(&mut self, command: Command) {
        self.registry.register(command);
    }

    /// Register `version`. `help` is answered by [`CommandService::get_help`].
    pub fn register_defaults(&mut self) {
        self.register(
            Command::new("version")
                .with_description("Show bot version")
                .with_handler(|_| Ok(format!("voidbot v{}", env!("CARGO_PKG_VERSION")))),
        );
    }

    /// Run the handler for `invocation`.
    ///
    /// `help` is built in; any other name must be registered.
    pub fn handle(&self, invocation: &CommandInvocation) -> Result<String, CommandError> {
        if invocation.name.eq_ignore_ascii_case("help") {
            return Ok(self.get_help(invocation.args().first().copied()));
        }

        self.registry
            .find(&invocation.name)
            .ok_or_else(|| CommandError::NotFound(invocation.name.clone()))?
            .run(invocation)
    }

    pub fn get_help(&self, command: Option<&str>) -> String {
        if let Some(name) = command {
            let name = name.trim_start_matches(self.prefix.as_str());
            if let Some(cmd) = self.registry.find(name) {
                let mut help = format!(
                    "{}{} - {}",
                    self.prefix,
                    cmd.name,
                    cmd.description.as_deref().unwrap_or("No description")
                );
                if let Some(usage) = &cmd.usage {
                    help.push_str(&format!("\nUsage: {}", usage));
                }
                return help;
            }
            return format!("Command {}{} not found", self.prefix, name);
        }

        let names: Vec<String> = std::iter::once("help")
            .chain(self.registry.all().map(|c| c.name.as_str()))
            .map(|name| format!("{}{}", self.prefix, name))
            .collect();
        format!("Available commands: {}", names.join(", "))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
