//! Record-oriented CRUD helpers over SQLite for the Runar ecosystem.
//!
//! # Intention
//!
//! - Read and write rows as [`Record`]s (ordered column to [`Value`] maps)
//!   without writing SQL.
//! - Accept a bare connection, a pooled [`Engine`] or an explicit [`Session`]
//!   wherever a connection is needed, and own the transaction only when the
//!   caller does not.
//! - Reflect table metadata from the database on every call. Nothing is cached.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - SQL errors are surfaced as [`Error::Sqlite`] unchanged; there is no retry.
//! - No business logic or unrelated utilities.
//!
//! ```
//! use rust_sqlite_records::{create_engine, create_table, insert_records, record,
//!     select_records_all, IfExists, SqlType};
//!
//! let engine = create_engine("sqlite://").unwrap();
//! create_table("xy", &[("id", SqlType::Integer), ("x", SqlType::Integer)], &["id"],
//!     &engine, None, false, IfExists::Error).unwrap();
//! insert_records("xy", &[record! { "id" => 1, "x" => 10 }], &engine).unwrap();
//! assert_eq!(select_records_all("xy", &engine, None).unwrap().len(), 1);
//! ```

pub mod async_api;
pub mod codec;
pub mod config;
pub mod create;
pub mod delete;
pub mod engine;
pub mod error;
pub mod insert;
pub mod record;
pub mod schema;
pub mod select;
pub mod table;
pub mod update;
pub mod value;

pub use async_api::{AsyncEngine, AsyncRecords, AsyncSession};
pub use config::{Schema, SqliteConfig, TableDefinition};
pub use create::{
    column_datatype, copy_table, create_table, create_table_from_records, drop_table,
    CreateTableOptions, IfExists,
};
pub use delete::{
    delete_all_records, delete_all_records_session, delete_record_by_values,
    delete_record_by_values_session, delete_records, delete_records_by_values,
    delete_records_by_values_session, delete_records_session,
};
pub use engine::{
    create_engine, get_connection, get_session, ConnectionHandle, ConnectionLike, Engine,
    PooledConnection, Session,
};
pub use error::{Error, Result};
pub use insert::{insert_from_table, insert_from_table_session, insert_records, insert_records_session};
pub use record::{records_equal, Record};
pub use schema::{
    get_column, get_column_names, get_column_types, get_engine_table, get_primary_key_constraints,
    get_row_count, get_schemas, get_table, get_table_names, missing_primary_key,
    primary_key_columns, primary_key_names, table_exists, tables_metadata_equal, ColumnMetadata,
    PrimaryKeyConstraint, SqlType, TableMetadata, TableName, TableRef,
};
pub use select::{
    select_column_value_by_index, select_column_values_all, select_column_values_by_primary_keys,
    select_column_values_by_slice, select_column_values_chunks, select_existing_values,
    select_primary_key_records_by_slice, select_record_by_index, select_record_by_primary_key,
    select_records_all, select_records_by_primary_keys, select_records_chunks, select_records_slice,
    select_value_by_primary_keys, ColumnChunks, RecordChunks,
};
pub use table::Table;
pub use update::{
    set_column_values, set_column_values_session, update_matching_records,
    update_matching_records_session, update_records, update_records_session,
};
pub use value::Value;
