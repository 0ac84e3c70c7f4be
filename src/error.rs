//! Error types shared by every record operation.
//!
//! Errors raised by SQLite itself are carried verbatim in [`Error::Sqlite`] so
//! callers can still match on the original `rusqlite::Error`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The operation needs a primary key and the table declares none.
    #[error("table '{table}' has no primary key")]
    MissingPrimaryKey { table: String },

    /// A table or connection reference could not be resolved.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("no such table: {table}")]
    NoSuchTable { table: String },

    #[error("table '{table}' has no column '{column}'")]
    NoSuchColumn { table: String, column: String },

    /// A record value does not fit the reflected column type.
    #[error("column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// A record is missing the columns an operation matches on.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A stored value could not be decoded as its declared column type.
    #[error("cannot decode column '{column}': {message}")]
    Conversion { column: String, message: String },

    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    /// The connection pool could not be set up.
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Returns the underlying SQLite error, if this is one.
    pub fn as_sqlite(&self) -> Option<&rusqlite::Error> {
        match self {
            Error::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}
