//! Inserting records and copying rows between tables.

use rusqlite::Connection;
use tracing::trace;

use crate::codec::{validate_record, CreateOperation, InsertSelectOperation};
use crate::engine::{ConnectionLike, Session};
use crate::error::Result;
use crate::record::Record;
use crate::schema::{TableMetadata, TableRef};

pub(crate) fn insert_on(conn: &Connection, table: &TableMetadata, records: &[Record]) -> Result<()> {
    for record in records {
        validate_record(table, record)?;
    }

    if table.missing_primary_key() {
        for record in records {
            trace!(table = %table.table, "Inserting record");
            for query in CreateOperation::new(table.table.clone(), vec![record.clone()]).to_sql() {
                query.execute(conn)?;
            }
        }
    } else {
        for query in CreateOperation::new(table.table.clone(), records.to_vec()).to_sql() {
            query.execute(conn)?;
        }
    }
    Ok(())
}

pub(crate) fn insert_from_table_on(
    conn: &Connection,
    source: &TableMetadata,
    destination: &TableMetadata,
) -> Result<()> {
    for column in &source.columns {
        destination.require_column(&column.name)?;
    }
    let op = InsertSelectOperation {
        source: source.table.clone(),
        destination: destination.table.clone(),
        columns: source.column_names(),
    };
    if let Some(query) = op.to_sql() {
        query.execute(conn)?;
    }
    Ok(())
}

/// Insert records into a table as one unit of work.
///
/// Tables with a primary key get bulk multi-row statements; tables without one
/// get one statement per record. Either way a failure leaves nothing inserted
/// unless the handle is a session the caller controls.
pub fn insert_records<'a, 't>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<()> {
    let table = table.into();
    handle.into().transact("insert_records", |conn| {
        let table = table.resolve(Some(conn))?;
        insert_on(conn, &table, records)
    })
}

pub fn insert_records_session<'t>(
    table: impl Into<TableRef<'t>>,
    records: &[Record],
    session: &Session,
) -> Result<()> {
    insert_records(table, records, session)
}

/// Copy every row of `source` into `destination`. Every source column must
/// exist in the destination.
pub fn insert_from_table<'a, 's, 'd>(
    source: impl Into<TableRef<'s>>,
    destination: impl Into<TableRef<'d>>,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<()> {
    let (source, destination) = (source.into(), destination.into());
    handle.into().transact("insert_from_table", |conn| {
        let source = source.resolve(Some(conn))?;
        let destination = destination.resolve(Some(conn))?;
        insert_from_table_on(conn, &source, &destination)
    })
}

pub fn insert_from_table_session<'s, 'd>(
    source: impl Into<TableRef<'s>>,
    destination: impl Into<TableRef<'d>>,
    session: &Session,
) -> Result<()> {
    insert_from_table(source, destination, session)
}
