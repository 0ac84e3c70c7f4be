//! Engines, pooled connections, sessions and the connection-like union the
//! record functions accept.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{CustomizeConnection, ManageConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::SqliteConfig;
use crate::error::{Error, Result};

/// r2d2 rejects a zero connection timeout.
const MIN_POOL_TIMEOUT: Duration = Duration::from_millis(1);

/// Settings applied to every connection the pool opens.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
    foreign_keys: bool,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> rusqlite::Result<()> {
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)
    }
}

/// A connection checked out of an [`Engine`]'s pool. Any transaction still
/// open when it is dropped is rolled back before the connection is returned.
pub struct PooledConnection {
    conn: r2d2::PooledConnection<SqliteConnectionManager>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "Rollback failed while returning connection to the pool");
            }
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("autocommit", &self.conn.is_autocommit())
            .finish()
    }
}

/// Cloneable handle to a pool of SQLite connections for one database.
#[derive(Clone)]
pub struct Engine {
    pool: r2d2::Pool<SqliteConnectionManager>,
    config: Arc<SqliteConfig>,
}

impl Engine {
    /// Open the database, set up the pool and create the configured schema.
    pub fn new(config: SqliteConfig) -> Result<Self> {
        let manager = if config.is_memory() {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&config.db_path)
        };
        // Open errors surface here rather than after the checkout timeout.
        drop(manager.connect()?);

        let max_size = config.effective_pool_size();
        let mut builder = r2d2::Pool::<SqliteConnectionManager>::builder()
            .max_size(u32::try_from(max_size).unwrap_or(u32::MAX))
            .connection_timeout(config.pool_timeout().max(MIN_POOL_TIMEOUT))
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: config.busy_timeout(),
                foreign_keys: config.foreign_keys,
            }));
        if config.is_memory() {
            // The single in-memory connection holds the data and is never recycled.
            builder = builder.idle_timeout(None).max_lifetime(None);
        }
        let pool = builder
            .build(manager)
            .map_err(|err| Error::Pool(err.to_string()))?;

        let engine = Self {
            pool,
            config: Arc::new(config),
        };
        let conn = engine.connect()?;
        for table in &engine.config.schema.tables {
            conn.execute_batch(&table.create_sql(true))?;
            for sql in table.index_sql() {
                conn.execute_batch(&sql)?;
            }
        }
        drop(conn);

        info!(
            db_path = %engine.config.db_path,
            pool_size = max_size,
            tables = engine.config.schema.tables.len(),
            "Opened SQLite engine"
        );
        Ok(engine)
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(SqliteConfig::from_url(url)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(SqliteConfig::in_memory())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Check out a connection. Blocks up to the pool timeout.
    pub fn connect(&self) -> Result<PooledConnection> {
        let conn = self.pool.get().map_err(|err| {
            debug!(error = %err, "Connection checkout failed");
            Error::PoolTimeout
        })?;
        Ok(PooledConnection { conn })
    }

    /// Start an explicit transactional session.
    pub fn session(&self) -> Result<Session> {
        Session::begin(self.connect()?)
    }

    /// Number of idle connections currently held by the pool.
    pub fn idle_connections(&self) -> usize {
        self.pool.state().idle_connections as usize
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("db_path", &self.config.db_path)
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

/// An open transaction on a pooled connection.
///
/// The write lock is taken when the session begins, so other writers wait
/// (up to the busy timeout) until it finishes.
///
/// The caller decides the outcome with [`Session::commit`] or
/// [`Session::rollback`]. Dropping an unfinished session rolls it back.
#[derive(Debug)]
pub struct Session {
    conn: PooledConnection,
    finished: bool,
}

impl Session {
    fn begin(conn: PooledConnection) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("Session started");
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Commit. If the commit itself fails the transaction is rolled back and
    /// the commit error returned.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if let Err(err) = self.conn.execute_batch("COMMIT") {
            rollback_quietly(&self.conn, "commit");
            return Err(err.into());
        }
        debug!("Session committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        debug!("Session rolled back");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.finished && !self.conn.is_autocommit() {
            debug!("Rolling back unfinished session");
            rollback_quietly(&self.conn, "drop");
        }
    }
}

fn rollback_quietly(conn: &Connection, op: &str) {
    if conn.is_autocommit() {
        return;
    }
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        warn!(op, error = %err, "Rollback failed");
    }
}

/// Anything record functions can run statements through.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionLike<'a> {
    /// A bare connection. Calls commit their own work only while it is in
    /// autocommit mode; inside a caller's transaction they just execute.
    Connection(&'a Connection),
    /// Calls check out a connection and commit or roll back themselves.
    Engine(&'a Engine),
    /// Calls execute inside the session and never commit.
    Session(&'a Session),
}

impl<'a> From<&'a Connection> for ConnectionLike<'a> {
    fn from(conn: &'a Connection) -> Self {
        ConnectionLike::Connection(conn)
    }
}

impl<'a> From<&'a PooledConnection> for ConnectionLike<'a> {
    fn from(conn: &'a PooledConnection) -> Self {
        ConnectionLike::Connection(conn)
    }
}

impl<'a> From<&'a Engine> for ConnectionLike<'a> {
    fn from(engine: &'a Engine) -> Self {
        ConnectionLike::Engine(engine)
    }
}

impl<'a> From<&'a Session> for ConnectionLike<'a> {
    fn from(session: &'a Session) -> Self {
        ConnectionLike::Session(session)
    }
}

/// A resolved connection: borrowed from the caller or checked out of a pool.
#[derive(Debug)]
pub enum ConnectionHandle<'a> {
    Borrowed(&'a Connection),
    Pooled(PooledConnection),
}

impl Deref for ConnectionHandle<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            ConnectionHandle::Borrowed(conn) => conn,
            ConnectionHandle::Pooled(conn) => conn,
        }
    }
}

impl<'a> ConnectionLike<'a> {
    pub fn resolve(self) -> Result<ConnectionHandle<'a>> {
        Ok(match self {
            ConnectionLike::Connection(conn) => ConnectionHandle::Borrowed(conn),
            ConnectionLike::Session(session) => ConnectionHandle::Borrowed(session.connection()),
            ConnectionLike::Engine(engine) => ConnectionHandle::Pooled(engine.connect()?),
        })
    }

    /// Whether a call through this handle must begin and commit its own
    /// transaction.
    pub fn owns_transaction(&self) -> bool {
        match self {
            ConnectionLike::Engine(_) => true,
            ConnectionLike::Connection(conn) => conn.is_autocommit(),
            ConnectionLike::Session(_) => false,
        }
    }

    /// Run `f` as one unit of work: committed on success, rolled back and the
    /// original error returned on failure. Inside a caller-owned transaction
    /// `f` simply runs.
    /// Owned transactions begin `IMMEDIATE`, taking the write lock up front.
    pub(crate) fn transact<T>(
        self,
        op: &str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let owns = self.owns_transaction();
        let conn = self.resolve()?;
        if !owns {
            return f(&*conn);
        }

        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&*conn) {
            Ok(value) => match conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(err) => {
                    rollback_quietly(&conn, op);
                    Err(err.into())
                }
            },
            Err(err) => {
                debug!(op, error = %err, "Rolling back");
                rollback_quietly(&conn, op);
                Err(err)
            }
        }
    }
}

/// Open an engine from a connection URL such as `sqlite:///app.db`.
pub fn create_engine(url: &str) -> Result<Engine> {
    Engine::from_url(url)
}

pub fn get_session(engine: &Engine) -> Result<Session> {
    engine.session()
}

/// Resolve any connection-like handle to a usable connection.
pub fn get_connection<'a>(handle: impl Into<ConnectionLike<'a>>) -> Result<ConnectionHandle<'a>> {
    handle.into().resolve()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{ColumnDefinition, Schema, TableDefinition};
    use crate::schema::SqlType;

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap()
    }

    fn memory_engine() -> Engine {
        let schema = Schema::new().add_table(
            TableDefinition::new("t")
                .add_column(ColumnDefinition::new("id", SqlType::Integer))
                .with_primary_key(&["id"]),
        );
        Engine::new(SqliteConfig::in_memory().with_schema(schema)).unwrap()
    }

    #[test]
    fn test_memory_engine_shares_data() {
        let engine = memory_engine();
        engine.connect().unwrap().execute("INSERT INTO t VALUES (1)", []).unwrap();
        assert_eq!(count(&engine.connect().unwrap()), 1);
        assert_eq!(engine.idle_connections(), 1);
    }

    #[test]
    fn test_pooled_connections_are_configured() {
        let engine = memory_engine();
        let conn = engine.connect().unwrap();
        let foreign_keys: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert!(foreign_keys);
        assert_eq!(engine.idle_connections(), 0);
    }

    #[test]
    fn test_checkout_times_out() {
        let engine = Engine::new(
            SqliteConfig::in_memory().with_pool_timeout(Duration::from_millis(200)),
        )
        .unwrap();
        let _held = engine.connect().unwrap();
        assert!(matches!(engine.connect(), Err(Error::PoolTimeout)));
    }

    #[test]
    fn test_session_commit_and_drop() {
        let engine = memory_engine();
        let session = engine.session().unwrap();
        session.connection().execute("INSERT INTO t VALUES (1)", []).unwrap();
        session.commit().unwrap();

        let session = engine.session().unwrap();
        session.connection().execute("INSERT INTO t VALUES (2)", []).unwrap();
        drop(session);

        let conn = engine.connect().unwrap();
        assert!(conn.is_autocommit());
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_released_connection_is_rolled_back() {
        let engine = memory_engine();
        {
            let conn = engine.connect().unwrap();
            conn.execute_batch("BEGIN; INSERT INTO t VALUES (5);").unwrap();
        }
        assert_eq!(count(&engine.connect().unwrap()), 0);
    }

    #[test]
    fn test_transact_rolls_back_on_error() {
        let engine = memory_engine();
        let result: Result<()> = ConnectionLike::from(&engine).transact("test", |conn| {
            conn.execute("INSERT INTO t VALUES (1)", [])?;
            conn.execute("INSERT INTO t VALUES (1)", [])?;
            Ok(())
        });
        assert!(result.unwrap_err().as_sqlite().is_some());
        assert_eq!(count(&engine.connect().unwrap()), 0);
    }

    #[test]
    fn test_owns_transaction() {
        let engine = memory_engine();
        assert!(ConnectionLike::from(&engine).owns_transaction());

        let conn = Connection::open_in_memory().unwrap();
        assert!(ConnectionLike::from(&conn).owns_transaction());
        conn.execute_batch("BEGIN").unwrap();
        assert!(!ConnectionLike::from(&conn).owns_transaction());

        let session = engine.session().unwrap();
        assert!(!ConnectionLike::from(&session).owns_transaction());
    }

    #[test]
    fn test_transact_inside_session_does_not_commit() {
        let engine = memory_engine();
        let session = engine.session().unwrap();
        ConnectionLike::from(&session)
            .transact("test", |conn| {
                conn.execute("INSERT INTO t VALUES (1)", [])?;
                Ok(())
            })
            .unwrap();
        assert!(!session.connection().is_autocommit());
        session.rollback().unwrap();
        assert_eq!(count(&engine.connect().unwrap()), 0);
    }
}
