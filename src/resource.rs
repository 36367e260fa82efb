//! Pooled connections, caller-owned transactions and logged release.
//!
//! Every connection handed out by this module goes back to the pool when its
//! guard is dropped, on success and on error paths alike. Failures while
//! releasing (closing a connection, finalizing a statement, rolling back an
//! abandoned transaction) are logged and never replace the caller's result.

use crate::config::GpkgConfig;
use crate::error::{GpkgError, Result};
use once_cell::sync::OnceCell;
use rusqlite::{Connection, OpenFlags, Statement};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type Pool = r2d2::Pool<SqliteConnectionManager>;

/// Opens `rusqlite` connections for the pool and applies per-connection
/// pragmas.
#[derive(Debug)]
pub(crate) struct SqliteConnectionManager {
    path: PathBuf,
    config: GpkgConfig,
}

impl SqliteConnectionManager {
    fn flags(&self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;
        if self.config.read_only {
            base | OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        }
    }
}

impl r2d2::ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags())?;
        conn.busy_timeout(self.config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", self.config.foreign_keys)?;
        if !self.config.read_only {
            let mode = self.config.journal_mode.as_str();
            conn.pragma_update_and_check(None, "journal_mode", mode, |row| {
                row.get::<_, String>(0)
            })?;
        }
        debug!(path = %self.path.display(), "opened connection");
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> rusqlite::Result<()> {
        conn.execute_batch("")
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

/// Closes connections evicted from the pool explicitly so close failures
/// are visible in the log.
#[derive(Debug)]
struct CloseLogger;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for CloseLogger {
    fn on_release(&self, conn: Connection) {
        if let Err((_, err)) = conn.close() {
            warn!(error = %err, "error closing database connection");
        }
    }
}

/// Lazily initialized connection pool for one container file.
pub(crate) struct ResourceManager {
    path: PathBuf,
    config: GpkgConfig,
    pool: OnceCell<Pool>,
}

impl ResourceManager {
    pub(crate) fn new(path: PathBuf, config: GpkgConfig) -> Self {
        Self {
            path,
            config,
            pool: OnceCell::new(),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn config(&self) -> &GpkgConfig {
        &self.config
    }

    /// The pool is built on first use. Concurrent first callers block until
    /// one of them has finished; a failed build is not cached.
    fn pool(&self) -> Result<&Pool> {
        self.pool.get_or_try_init(|| {
            debug!(path = %self.path.display(), "initializing connection pool");
            let manager = SqliteConnectionManager {
                path: self.path.clone(),
                config: self.config.clone(),
            };
            let pool = r2d2::Pool::builder()
                .max_size(self.config.max_connections)
                .min_idle(Some(0))
                .connection_timeout(self.config.connection_timeout)
                .connection_customizer(Box::new(CloseLogger))
                .build(manager)?;
            Ok::<_, GpkgError>(pool)
        })
    }

    pub(crate) fn state(&self) -> Result<r2d2::State> {
        Ok(self.pool()?.state())
    }

    /// Check a connection out of the pool.
    pub(crate) fn connection(&self) -> Result<ScopedConnection> {
        let conn = self.pool()?.get()?;
        debug!("acquired connection");
        Ok(ScopedConnection { conn })
    }

    /// Run `f` with a pooled connection in auto-commit mode.
    pub(crate) fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection()?;
        f(&conn)
    }

    /// Run `f` inside one transaction: commit on `Ok`, roll back on `Err`.
    pub(crate) fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let tx = self.begin()?;
        match f(tx.connection()) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback_logged();
                Err(err)
            }
        }
    }

    pub(crate) fn begin(&self) -> Result<Transaction> {
        Transaction::begin(self.connection()?)
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct ScopedConnection {
    conn: r2d2::PooledConnection<SqliteConnectionManager>,
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        debug!("released connection");
    }
}

/// Either a connection owned by a cursor or one borrowed from the caller's
/// [`Transaction`].
pub(crate) enum ConnectionHandle<'a> {
    Pooled(ScopedConnection),
    Borrowed(&'a Connection),
}

impl<'a> ConnectionHandle<'a> {
    pub(crate) fn acquire(
        resources: &ResourceManager,
        tx: Option<&'a Transaction>,
    ) -> Result<Self> {
        match tx {
            Some(tx) => Ok(ConnectionHandle::Borrowed(tx.connection())),
            None => Ok(ConnectionHandle::Pooled(resources.connection()?)),
        }
    }
}

impl Deref for ConnectionHandle<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            ConnectionHandle::Pooled(conn) => conn,
            ConnectionHandle::Borrowed(conn) => conn,
        }
    }
}

/// A caller-scoped transaction holding one pooled connection.
///
/// Dropping a transaction that was neither committed nor rolled back rolls
/// it back.
pub struct Transaction {
    conn: ScopedConnection,
    finished: bool,
}

impl Transaction {
    fn begin(conn: ScopedConnection) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("transaction started");
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                debug!("transaction committed");
                Ok(())
            }
            Err(err) => {
                self.rollback_logged();
                Err(err.into())
            }
        }
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Roll back, logging instead of returning a failure.
    pub(crate) fn rollback_logged(mut self) {
        self.finished = true;
        self.rollback_in_place();
    }

    fn rollback_in_place(&mut self) {
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %err, "error rolling back transaction");
        } else {
            debug!("transaction rolled back");
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_in_place();
        }
    }
}

/// Lifecycle of a caller-owned cursor. There is no way back from `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Iterating,
    Closed,
}

/// Finalize a prepared statement, logging a failure instead of returning it.
pub(crate) fn finalize_statement(stmt: Statement<'_>) {
    if let Err(err) = stmt.finalize() {
        warn!(error = %err, "error closing statement");
    }
}
