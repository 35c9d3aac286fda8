//! Connection ownership and transactional access to the repositories.

use crate::error::{StorageError, StorageResult};
use crate::repos::Repositories;
use crate::schema::initialize_schema;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Thread-safe handle to the server database.
///
/// Cloning is cheap; clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("opened database at {} (journal_mode={mode})", path.display());
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the connection lock, recovering from poison left by a
    /// panicking holder.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("recovering from poisoned database mutex");
            poisoned.into_inner()
        })
    }

    /// Runs `f` against the connection outside any explicit transaction.
    pub fn read<T, E>(&self, f: impl FnOnce(&Repositories<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let conn = self.lock_conn();
        f(&Repositories::new(&conn))
    }

    /// Runs `f` inside a transaction: committed on `Ok`, rolled back on `Err`.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Repositories<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self.lock_conn();
        let tx = conn.transaction().map_err(StorageError::from)?;
        let value = f(&Repositories::new(&tx))?;
        tx.commit().map_err(StorageError::from)?;
        Ok(value)
    }
}
