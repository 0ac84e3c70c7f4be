//! Updating records matched by primary key or by caller-chosen columns.

use rusqlite::Connection;
use tracing::{trace, warn};

use crate::codec::{require_columns, validate_record, UpdateOperation};
use crate::engine::{ConnectionLike, Session};
use crate::error::{Error, Result};
use crate::record;
use crate::record::Record;
use crate::schema::{TableMetadata, TableRef};
use crate::value::Value;

fn update_on<S: AsRef<str>>(
    conn: &Connection,
    table: &TableMetadata,
    records: &[Record],
    match_columns: &[S],
) -> Result<usize> {
    for column in match_columns {
        table.require_column(column.as_ref())?;
    }
    let mut changed = 0;
    for record in records {
        require_columns(record, match_columns)?;
        validate_record(table, record)?;
        match UpdateOperation::from_record(table.table.clone(), record, match_columns).to_sql() {
            Some(query) => {
                trace!(table = %table.table, "Updating record");
                changed += query.execute(conn)?;
            }
            None => warn!(table = %table.table, "Skipping update with nothing to set"),
        }
    }
    Ok(changed)
}

/// Update records matched on `match_columns`, or on the primary key when none
/// are given. Returns the number of rows changed.
///
/// Match columns are used only to find the row; every other column of a
/// record is written.
pub fn update_records<'a, 't>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    handle: impl Into<ConnectionLike<'a>>,
    match_columns: Option<&[&str]>,
) -> Result<usize> {
    let table = table.into();
    handle.into().transact("update_records", |conn| {
        let table = table.resolve(Some(conn))?;
        match match_columns {
            Some(columns) if !columns.is_empty() => update_on(conn, &table, records, columns),
            _ if table.missing_primary_key() => Err(Error::MissingPrimaryKey {
                table: table.table.to_string(),
            }),
            _ => {
                let pk = table.primary_key_names().to_vec();
                update_on(conn, &table, records, pk.as_slice())
            }
        }
    })
}

pub fn update_records_session<'t>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    session: &Session,
    match_columns: Option<&[&str]>,
) -> Result<usize> {
    update_records(table, records, session, match_columns)
}

/// Update records one statement at a time, matched on `match_columns`. Works
/// on tables without a primary key.
pub fn update_matching_records<'a, 't>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    match_columns: &[&str],
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<usize> {
    if match_columns.is_empty() {
        return Err(Error::InvalidRecord("no match columns given".to_string()));
    }
    let table = table.into();
    handle.into().transact("update_matching_records", |conn| {
        let table = table.resolve(Some(conn))?;
        update_on(conn, &table, records, match_columns)
    })
}

pub fn update_matching_records_session<'t>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    match_columns: &[&str],
    session: &Session,
) -> Result<usize> {
    update_matching_records(table, records, match_columns, session)
}

/// Set `column` to `value` in every row.
pub fn set_column_values<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    value: impl Into<Value>,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<usize> {
    let table = table.into();
    let value: Value = value.into();
    let updates = record! { column => value };
    handle.into().transact("set_column_values", |conn| {
        let table = table.resolve(Some(conn))?;
        validate_record(&table, &updates)?;
        match UpdateOperation::new(table.table.clone(), None, updates).to_sql() {
            Some(query) => query.execute(conn),
            None => Ok(0),
        }
    })
}

pub fn set_column_values_session<'t>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    value: impl Into<Value>,
    session: &Session,
) -> Result<usize> {
    set_column_values(table, column, value, session)
}
