//! Reference-counted registry of shared database handles
//!
//! Plugins open databases independently; the registry makes sure a given
//! driver/path pair is opened once, shared, and closed only after the last
//! user lets go. Failures to open or close are cached ("sticky") until the
//! entry is cleared.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::errors::DatabaseError;

/// Handle ids are unique across registries, so a handle is only ever
/// resolved by the registry that issued it.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Opens and closes connections of one kind
pub trait Driver: Send + Sync {
    type Conn: Send + 'static;

    fn open(&self, path: &Path) -> Result<Self::Conn, DatabaseError>;

    fn close(&self, conn: Self::Conn) -> Result<(), DatabaseError>;
}

/// Registry key: driver identifier plus absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbKey {
    pub driver: String,
    pub path: PathBuf,
}

impl fmt::Display for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.driver, self.path.display())
    }
}

struct Shared<C> {
    id: u64,
    key: DbKey,
    conn: Mutex<Option<C>>,
}

/// A shared, reference-counted database handle.
///
/// Clones refer to the same connection. Access to the connection is
/// serialized through [`Handle::with`].
pub struct Handle<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Handle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.shared.id)
            .field("key", &self.shared.key)
            .finish()
    }
}

impl<C> Handle<C> {
    /// Run `f` with exclusive access to the connection
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R, DatabaseError> {
        let mut conn = self.shared.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.as_mut().map(f).ok_or(DatabaseError::Closed)
    }

    pub fn key(&self) -> &DbKey {
        &self.shared.key
    }

    /// True once the underlying connection has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.conn.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// True if both handles refer to the same open
    pub fn same_as(&self, other: &Handle<C>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn take(&self) -> Option<C> {
        self.shared.conn.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

struct Entry<C> {
    handle: Option<Handle<C>>,
    open_err: Option<DatabaseError>,
    close_err: Option<DatabaseError>,
    /// Id of the handle this entry last handed out, kept after a failed close
    handle_id: Option<u64>,
    count: usize,
}

struct Tables<C> {
    entries: HashMap<DbKey, Entry<C>>,
    by_handle: HashMap<u64, DbKey>,
}

/// Reference-counted registry keyed by driver identifier and path
pub struct Registry<D: Driver> {
    drivers: HashMap<String, D>,
    tables: Mutex<Tables<D::Conn>>,
}

impl<D: Driver> Registry<D> {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
            tables: Mutex::new(Tables {
                entries: HashMap::new(),
                by_handle: HashMap::new(),
            }),
        }
    }

    /// Make `driver` available under `name`
    pub fn with_driver(mut self, name: impl Into<String>, driver: D) -> Self {
        self.drivers.insert(name.into(), driver);
        self
    }

    /// Return the database for `driver`/`path`, opening it if necessary.
    ///
    /// Every successful open must be balanced by one [`Registry::close`].
    /// A failed open is remembered and returned again without retrying until
    /// [`Registry::clear`] is called for the same key.
    pub fn open(&self, driver: &str, path: impl AsRef<Path>) -> Result<Handle<D::Conn>, DatabaseError> {
        let key = DbKey {
            driver: driver.to_string(),
            path: absolute_path(path.as_ref())?,
        };
        let mut guard = self.lock();
        let tables = &mut *guard;

        if let Some(entry) = tables.entries.get_mut(&key) {
            if let Some(err) = &entry.open_err {
                return Err(err.clone());
            }
            if let Some(handle) = &entry.handle {
                entry.count += 1;
                tracing::debug!("Reusing database {} (refs: {})", key, entry.count);
                return Ok(handle.clone());
            }
            // Only a failed close is left; a fresh open supersedes it
            if let Some(stale) = entry.handle_id.take() {
                tables.by_handle.remove(&stale);
            }
        }

        let opened = match self.drivers.get(driver) {
            Some(d) => d.open(&key.path),
            None => Err(DatabaseError::UnknownDriver(driver.to_string())),
        };

        match opened {
            Ok(conn) => {
                let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
                let handle = Handle {
                    shared: Arc::new(Shared {
                        id,
                        key: key.clone(),
                        conn: Mutex::new(Some(conn)),
                    }),
                };
                tracing::info!("Opened database {}", key);
                tables.by_handle.insert(id, key.clone());
                tables.entries.insert(
                    key,
                    Entry {
                        handle: Some(handle.clone()),
                        open_err: None,
                        close_err: None,
                        handle_id: Some(id),
                        count: 1,
                    },
                );
                Ok(handle)
            }
            Err(err) => {
                tracing::error!("Failed to open database {}: {}", key, err);
                tables.entries.insert(
                    key,
                    Entry {
                        handle: None,
                        open_err: Some(err.clone()),
                        close_err: None,
                        handle_id: None,
                        count: 1,
                    },
                );
                Err(err)
            }
        }
    }

    /// Release one reference to `handle`, closing the database with the last one.
    ///
    /// If closing fails the error is returned again by every later close of
    /// the same handle until the key is opened again or cleared.
    pub fn close(&self, handle: &Handle<D::Conn>) -> Result<(), DatabaseError> {
        let mut guard = self.lock();
        let tables = &mut *guard;

        let key = tables
            .by_handle
            .get(&handle.shared.id)
            .cloned()
            .ok_or(DatabaseError::NotOpen)?;
        let entry = tables.entries.get_mut(&key).ok_or(DatabaseError::NotOpen)?;

        if let Some(err) = &entry.close_err {
            return Err(err.clone());
        }
        let Some(open) = entry.handle.clone() else {
            return Err(DatabaseError::NotOpen);
        };

        entry.count -= 1;
        if entry.count > 0 {
            tracing::debug!("Released database {} (refs: {})", key, entry.count);
            return Ok(());
        }

        entry.handle = None;
        let result = match (open.take(), self.drivers.get(&key.driver)) {
            (Some(conn), Some(driver)) => driver.close(conn),
            _ => Ok(()),
        };

        match result {
            Ok(()) => {
                tracing::info!("Closed database {}", key);
                tables.entries.remove(&key);
                tables.by_handle.remove(&open.shared.id);
                Ok(())
            }
            Err(err) => {
                tracing::error!("Failed to close database {}: {}", key, err);
                entry.close_err = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Forget any cached open/close error for `driver`/`path`.
    ///
    /// Fails if the database is currently open.
    pub fn clear(&self, driver: &str, path: impl AsRef<Path>) -> Result<(), DatabaseError> {
        let key = DbKey {
            driver: driver.to_string(),
            path: absolute_path(path.as_ref())?,
        };
        let mut guard = self.lock();
        let tables = &mut *guard;

        if let Some(entry) = tables.entries.get(&key) {
            if entry.handle.is_some() {
                return Err(DatabaseError::StillOpen);
            }
            if let Some(id) = entry.handle_id {
                tables.by_handle.remove(&id);
            }
            tables.entries.remove(&key);
            tracing::debug!("Cleared database entry {}", key);
        }
        Ok(())
    }

    /// Outstanding references for `driver`/`path`; zero when not open
    pub fn ref_count(&self, driver: &str, path: impl AsRef<Path>) -> usize {
        let Ok(path) = absolute_path(path.as_ref()) else {
            return 0;
        };
        let key = DbKey {
            driver: driver.to_string(),
            path,
        };
        self.lock()
            .entries
            .get(&key)
            .filter(|e| e.handle.is_some())
            .map_or(0, |e| e.count)
    }

    fn lock(&self) -> MutexGuard<'_, Tables<D::Conn>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: Driver> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Make `path` absolute against the working directory and lexically clean it
/// (`.` dropped, `..` folded), without touching the filesystem.
pub fn absolute_path(path: &Path) -> Result<PathBuf, DatabaseError> {
    if path.as_os_str().is_empty() {
        return Err(DatabaseError::Path {
            path: String::new(),
            reason: "empty path".to_string(),
        });
    }

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = env::current_dir().map_err(|e| DatabaseError::Path {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        cwd.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !matches!(cleaned.components().next_back(), Some(Component::RootDir | Component::Prefix(_)) | None) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_cleans_dot_components() {
        let cwd = env::current_dir().unwrap();
        assert_eq!(absolute_path(Path::new("a/b")).unwrap(), cwd.join("a/b"));
        assert_eq!(absolute_path(Path::new("./a/./b")).unwrap(), cwd.join("a/b"));
        assert_eq!(absolute_path(Path::new("a/x/../b")).unwrap(), cwd.join("a/b"));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_path_keeps_absolute_paths_and_stops_at_root() {
        assert_eq!(absolute_path(Path::new("/tmp/./x.db")).unwrap(), PathBuf::from("/tmp/x.db"));
        assert_eq!(absolute_path(Path::new("/../x.db")).unwrap(), PathBuf::from("/x.db"));
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(absolute_path(Path::new("")), Err(DatabaseError::Path { .. })));
    }
}
