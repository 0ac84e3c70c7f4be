//! Deleting records by column values, by matching records, or all at once.

use rusqlite::Connection;
use tracing::{trace, warn};

use crate::codec::{DeleteOperation, Query, QueryOperator, MAX_VARIABLES};
use crate::engine::{ConnectionLike, Session};
use crate::error::Result;
use crate::record::Record;
use crate::schema::{TableMetadata, TableRef};
use crate::value::Value;

fn delete_matching_on(conn: &Connection, table: &TableMetadata, record: &Record) -> Result<usize> {
    for column in record.keys() {
        table.require_column(column)?;
    }
    match DeleteOperation::new(table.table.clone(), Some(Query::from_record(record))).to_sql() {
        Some(query) => {
            trace!(table = %table.table, "Deleting matching record");
            query.execute(conn)
        }
        None => {
            warn!(table = %table.table, "Skipping delete with an empty match record");
            Ok(0)
        }
    }
}

/// Delete rows whose `column` is one of `values`. Returns the number deleted.
/// Long value lists are split across statements within the one transaction.
pub fn delete_records<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    values: &[Value],
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<usize> {
    let table = table.into();
    handle.into().transact("delete_records", |conn| {
        let table = table.resolve(Some(conn))?;
        table.require_column(column)?;
        let mut deleted = 0;
        for batch in values.chunks(MAX_VARIABLES) {
            let query = Query::new().with_condition(column, QueryOperator::In(batch.to_vec()));
            if let Some(query) = DeleteOperation::new(table.table.clone(), Some(query)).to_sql() {
                deleted += query.execute(conn)?;
            }
        }
        Ok(deleted)
    })
}

pub fn delete_records_session<'t>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    values: &[Value],
    session: &Session,
) -> Result<usize> {
    delete_records(table, column, values, session)
}

/// Delete the rows equal to `record` on every column it holds. An empty record
/// deletes nothing.
pub fn delete_record_by_values<'a, 't>(
    table: impl Into<TableRef<'t>>,
    record: &Record,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<usize> {
    delete_records_by_values(table, std::slice::from_ref(record), handle)
}

pub fn delete_record_by_values_session<'t>(
    table: impl Into<TableRef<'t>>,
    record: &Record,
    session: &Session,
) -> Result<usize> {
    delete_record_by_values(table, record, session)
}

/// Delete rows matching each record, one statement per record, in order.
pub fn delete_records_by_values<'a, 't>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<usize> {
    let table = table.into();
    handle.into().transact("delete_records_by_values", |conn| {
        let table = table.resolve(Some(conn))?;
        let mut deleted = 0;
        for record in records {
            deleted += delete_matching_on(conn, &table, record)?;
        }
        Ok(deleted)
    })
}

pub fn delete_records_by_values_session<'t>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    session: &Session,
) -> Result<usize> {
    delete_records_by_values(table, records, session)
}

/// Delete every row of the table.
pub fn delete_all_records<'a, 't>(
    table: impl Into<TableRef<'t>>,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<usize> {
    let table = table.into();
    handle.into().transact("delete_all_records", |conn| {
        let table = table.resolve(Some(conn))?;
        match DeleteOperation::new(table.table.clone(), None).to_sql() {
            Some(query) => query.execute(conn),
            None => Ok(0),
        }
    })
}

pub fn delete_all_records_session<'t>(table: impl Into<TableRef<'t>>, session: &Session) -> Result<usize> {
    delete_all_records(table, session)
}
