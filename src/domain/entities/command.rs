//! Bot commands (`!name arg`) and their registry

use std::collections::{BTreeMap, HashMap};

use super::CommandInvocation;
use crate::application::errors::CommandError;

/// Command handler function type
pub type CommandHandler = Box<dyn Fn(&CommandInvocation) -> Result<String, CommandError> + Send + Sync>;

/// Where a command may be invoked from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandScope {
    #[default]
    Anywhere,
    Channel,
    Private,
}

impl CommandScope {
    pub fn allows(self, invocation: &CommandInvocation) -> bool {
        match self {
            CommandScope::Anywhere => true,
            CommandScope::Channel => !invocation.is_private,
            CommandScope::Private => invocation.is_private,
        }
    }
}

/// A named command with optional aliases
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub usage: Option<String>,
    pub scope: CommandScope,
    pub handler: Option<CommandHandler>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            description: None,
            aliases: Vec::new(),
            usage: None,
            scope: CommandScope::default(),
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_ascii_lowercase());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_scope(mut self, scope: CommandScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CommandInvocation) -> Result<String, CommandError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Run the handler, refusing invocations outside the command's scope
    pub fn run(&self, invocation: &CommandInvocation) -> Result<String, CommandError> {
        if !self.scope.allows(invocation) {
            let place = if invocation.is_private { "in a channel" } else { "in private" };
            return Err(CommandError::InvalidArgs(format!("{} only works {}", self.name, place)));
        }
        match &self.handler {
            Some(handler) => handler(invocation),
            None => Ok(format!("Command {} not implemented", self.name)),
        }
    }
}

/// Commands by lowercase name, plus an alias index.
///
/// Names are kept ordered so help output is stable.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
    aliases: HashMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `command`, replacing any command of the same name
    pub fn register(&mut self, command: Command) {
        for alias in &command.aliases {
            self.aliases.insert(alias.clone(), command.name.clone());
        }
        self.commands.insert(command.name.clone(), command);
    }

    /// Look up a command by name or alias, ignoring case
    pub fn find(&self, input: &str) -> Option<&Command> {
        let key = input.to_ascii_lowercase();
        self.commands
            .get(&key)
            .or_else(|| self.aliases.get(&key).and_then(|name| self.commands.get(name)))
    }

    pub fn all(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
