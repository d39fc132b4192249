//! Application layer errors

use std::fmt;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lifecycle phase of the plugin manager.
///
/// Transitions are monotonic: `PreInit -> PostInit -> PostTeardown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreInit,
    PostInit,
    PostTeardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::PreInit => write!(f, "pre-init"),
            Phase::PostInit => write!(f, "post-init"),
            Phase::PostTeardown => write!(f, "post-teardown"),
        }
    }
}

/// Errors raised by the plugin lifecycle manager.
///
/// Everything except [`LifecycleError::Init`] is a programmer defect and
/// reports `true` from [`LifecycleError::is_fatal`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{operation} is not allowed in the {phase} phase")]
    OutOfPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Plugin '{0}' already registered")]
    DuplicatePlugin(String),

    #[error("init failed in plugin '{plugin}': {source}")]
    Init {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("{0} pass aborted by a panicking plugin")]
    Aborted(&'static str),

    #[error("Lock poisoned")]
    Poisoned,
}

impl LifecycleError {
    /// Fatal errors are state-machine violations; the process must stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LifecycleError::Init { .. })
    }
}

/// Errors reported by plugin callbacks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Failed(String),
}

impl From<rusqlite::Error> for PluginError {
    fn from(e: rusqlite::Error) -> Self {
        PluginError::Database(e.into())
    }
}

/// Resource registry and database errors.
///
/// Cloneable so that sticky open/close errors can be handed out repeatedly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Invalid database path {path}: {reason}")]
    Path { path: String, reason: String },

    #[error("Unknown database driver: {0}")]
    UnknownDriver(String),

    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to close {path}: {reason}")]
    Close { path: String, reason: String },

    #[error("No open database with that driver/path")]
    NotOpen,

    #[error("A database with that driver/path is currently open")]
    StillOpen,

    #[error("Database handle is closed")]
    Closed,

    #[error("Query failed: {0}")]
    Query(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Query(e.to_string())
    }
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
