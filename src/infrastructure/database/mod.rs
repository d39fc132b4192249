//! Shared database access
//!
//! Plugins get their SQLite connections from a [`DatabaseRegistry`] so that
//! several plugins naming the same file share one connection.

pub mod registry;

use rusqlite::Connection;
use std::path::Path;

use crate::application::errors::DatabaseError;

pub use registry::{absolute_path, DbKey, Driver, Handle, Registry};

/// Shared handle to a SQLite connection
pub type Database = Handle<Connection>;

/// Registry of shared SQLite connections
pub type DatabaseRegistry = Registry<SqliteDriver>;

/// Driver identifiers under which [`SqliteDriver`] is registered
pub const SQLITE_DRIVERS: [&str; 2] = ["sqlite", "sqlite3"];

/// Opens SQLite databases with `rusqlite`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Conn = Connection;

    fn open(&self, path: &Path) -> Result<Connection, DatabaseError> {
        Connection::open(path).map_err(|e| DatabaseError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn close(&self, conn: Connection) -> Result<(), DatabaseError> {
        let path = conn.path().unwrap_or_default().to_string();
        conn.close().map_err(|(_, e)| DatabaseError::Close {
            path,
            reason: e.to_string(),
        })
    }
}

impl DatabaseRegistry {
    /// A registry with SQLite available under every name in [`SQLITE_DRIVERS`]
    pub fn sqlite() -> Self {
        SQLITE_DRIVERS
            .iter()
            .fold(Registry::new(), |registry, name| registry.with_driver(*name, SqliteDriver))
    }
}
