//! Reading records: whole tables, slices, chunks and primary-key lookups.
//!
//! Reads never open a transaction of their own. Results are ordered by primary
//! key ascending when the table has one, so slices and chunks are stable.

use rusqlite::Connection;

use crate::codec::{require_columns, Query, QueryOperator, ReadOperation, MAX_OR_TERMS, MAX_VARIABLES};
use crate::engine::ConnectionLike;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{TableMetadata, TableRef};
use crate::value::Value;

fn read_operation(table: &TableMetadata, include_columns: Option<&[&str]>) -> Result<ReadOperation> {
    let mut op = ReadOperation::new(table.table.clone()).order_by(table.primary_key_names());
    if let Some(columns) = include_columns {
        for column in columns {
            table.require_column(column)?;
        }
        op = op.fields(columns);
    }
    Ok(op)
}

fn column_operation(table: &TableMetadata, column: &str) -> Result<ReadOperation> {
    read_operation(table, Some(std::slice::from_ref(&column)))
}

fn require_primary_key(table: &TableMetadata) -> Result<()> {
    if table.missing_primary_key() {
        return Err(Error::MissingPrimaryKey {
            table: table.table.to_string(),
        });
    }
    Ok(())
}

fn into_values(records: Vec<Record>, column: &str) -> Vec<Value> {
    records
        .into_iter()
        .map(|mut r| r.remove(column).unwrap_or(Value::Null))
        .collect()
}

fn row_count(conn: &Connection, table: &TableMetadata) -> Result<i64> {
    crate::schema::get_row_count(table, conn)
}

/// Resolve Python-style slice bounds against `len` rows into `(offset, limit)`.
fn slice_bounds(start: Option<i64>, stop: Option<i64>, len: i64) -> (u64, u64) {
    let clamp = |index: i64| {
        if index < 0 {
            (len + index).max(0)
        } else {
            index.min(len)
        }
    };
    let start = start.map_or(0, clamp);
    let stop = stop.map_or(len, clamp);
    let limit = (stop - start).max(0);
    (start as u64, limit as u64)
}

fn needs_count(start: Option<i64>, stop: Option<i64>) -> bool {
    stop.is_none() || start.is_some_and(|s| s < 0) || stop.is_some_and(|s| s < 0)
}

fn read_slice(
    conn: &Connection,
    table: &TableMetadata,
    op: ReadOperation,
    start: Option<i64>,
    stop: Option<i64>,
) -> Result<Vec<Record>> {
    let len = if needs_count(start, stop) {
        row_count(conn, table)?
    } else {
        i64::MAX
    };
    let (offset, limit) = slice_bounds(start, stop, len);
    if limit == 0 {
        return Ok(Vec::new());
    }
    op.limit(limit).offset(offset).to_sql().query_records(conn, table)
}

fn read_index(
    conn: &Connection,
    table: &TableMetadata,
    op: ReadOperation,
    index: i64,
) -> Result<Option<Record>> {
    let index = if index < 0 {
        let len = row_count(conn, table)?;
        match len + index {
            i if i < 0 => return Ok(None),
            i => i,
        }
    } else {
        index
    };
    let mut records = op
        .limit(1)
        .offset(index as u64)
        .to_sql()
        .query_records(conn, table)?;
    Ok(records.pop())
}

fn key_query(table: &TableMetadata, key: &Record) -> Result<Query> {
    let pk = table.primary_key_names();
    require_columns(key, pk)?;
    Ok(Query::from_record(&key.project(pk)))
}

/// Every record of the table.
pub fn select_records_all<'a, 't>(
    table: impl Into<TableRef<'t>>,
    handle: impl Into<ConnectionLike<'a>>,
    include_columns: Option<&[&str]>,
) -> Result<Vec<Record>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    read_operation(&table, include_columns)?
        .to_sql()
        .query_records(&conn, &table)
}

/// Lazily read the table in batches of `chunksize` records.
pub fn select_records_chunks<'a, 't>(
    table: impl Into<TableRef<'t>>,
    handle: impl Into<ConnectionLike<'a>>,
    chunksize: usize,
    include_columns: Option<&[&str]>,
) -> Result<RecordChunks<'a>> {
    let handle = handle.into();
    let conn = handle.resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    let op = read_operation(&table, include_columns)?;
    Ok(RecordChunks::new(handle, table, op, chunksize))
}

/// Iterator over batches of records.
///
/// Each batch is a fresh `LIMIT`/`OFFSET` query, so an engine connection is
/// only held while a batch is read. Iteration stops after a short batch.
#[derive(Debug)]
pub struct RecordChunks<'a> {
    handle: ConnectionLike<'a>,
    table: TableMetadata,
    op: ReadOperation,
    chunksize: u64,
    offset: u64,
    done: bool,
}

impl<'a> RecordChunks<'a> {
    fn new(handle: ConnectionLike<'a>, table: TableMetadata, op: ReadOperation, chunksize: usize) -> Self {
        Self {
            handle,
            table,
            op,
            chunksize: chunksize.max(1) as u64,
            offset: 0,
            done: false,
        }
    }

    fn read_batch(&self) -> Result<Vec<Record>> {
        let conn = self.handle.resolve()?;
        self.op
            .clone()
            .limit(self.chunksize)
            .offset(self.offset)
            .to_sql()
            .query_records(&conn, &self.table)
    }
}

impl Iterator for RecordChunks<'_> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => {
                self.offset += batch.len() as u64;
                self.done = (batch.len() as u64) < self.chunksize;
                Some(Ok(batch))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Values of one column, in batches.
#[derive(Debug)]
pub struct ColumnChunks<'a> {
    records: RecordChunks<'a>,
    column: String,
}

impl Iterator for ColumnChunks<'_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let column = &self.column;
        self.records
            .next()
            .map(|batch| batch.map(|records| into_values(records, column)))
    }
}

/// Which of `values` are present in `column`. Long value lists are read in
/// batches, each ordered by primary key.
pub fn select_existing_values<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    values: &[Value],
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Vec<Value>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    let op = column_operation(&table, column)?;
    let mut records = Vec::new();
    for batch in values.chunks(MAX_VARIABLES) {
        let query = Query::new().with_condition(column, QueryOperator::In(batch.to_vec()));
        records.extend(op.clone().filter(query).to_sql().query_records(&conn, &table)?);
    }
    Ok(into_values(records, column))
}

pub fn select_column_values_all<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Vec<Value>> {
    let records = select_records_all(table, handle, Some(std::slice::from_ref(&column)))?;
    Ok(into_values(records, column))
}

pub fn select_column_values_chunks<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    handle: impl Into<ConnectionLike<'a>>,
    chunksize: usize,
) -> Result<ColumnChunks<'a>> {
    Ok(ColumnChunks {
        records: select_records_chunks(table, handle, chunksize, Some(std::slice::from_ref(&column)))?,
        column: column.to_string(),
    })
}

/// Records in `start..stop`, both optional and negative-from-the-end like a
/// Python slice.
pub fn select_records_slice<'a, 't>(
    table: impl Into<TableRef<'t>>,
    start: Option<i64>,
    stop: Option<i64>,
    handle: impl Into<ConnectionLike<'a>>,
    include_columns: Option<&[&str]>,
) -> Result<Vec<Record>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    let op = read_operation(&table, include_columns)?;
    read_slice(&conn, &table, op, start, stop)
}

pub fn select_column_values_by_slice<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    start: Option<i64>,
    stop: Option<i64>,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Vec<Value>> {
    let records = select_records_slice(table, start, stop, handle, Some(std::slice::from_ref(&column)))?;
    Ok(into_values(records, column))
}

/// The value of `column` in the row at `index`. Negative indices count from
/// the end; out-of-range indices give `None`.
pub fn select_column_value_by_index<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    index: i64,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Option<Value>> {
    let record = select_record_by_index(table, index, handle, Some(std::slice::from_ref(&column)))?;
    Ok(record.and_then(|mut r| r.remove(column)))
}

pub fn select_record_by_index<'a, 't>(
    table: impl Into<TableRef<'t>>,
    index: i64,
    handle: impl Into<ConnectionLike<'a>>,
    include_columns: Option<&[&str]>,
) -> Result<Option<Record>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    let op = read_operation(&table, include_columns)?;
    read_index(&conn, &table, op, index)
}

/// Primary-key columns only, for the rows in `start..stop`.
pub fn select_primary_key_records_by_slice<'a, 't>(
    table: impl Into<TableRef<'t>>,
    start: Option<i64>,
    stop: Option<i64>,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Vec<Record>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    require_primary_key(&table)?;
    let pk: Vec<&str> = table.primary_key_names().iter().map(String::as_str).collect();
    let op = read_operation(&table, Some(pk.as_slice()))?;
    read_slice(&conn, &table, op, start, stop)
}

/// The record whose primary key equals `primary_key_value`, if any.
pub fn select_record_by_primary_key<'a, 't>(
    table: impl Into<TableRef<'t>>,
    primary_key_value: &Record,
    handle: impl Into<ConnectionLike<'a>>,
    include_columns: Option<&[&str]>,
) -> Result<Option<Record>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    require_primary_key(&table)?;
    let op = read_operation(&table, include_columns)?
        .filter(key_query(&table, primary_key_value)?)
        .limit(1);
    Ok(op.to_sql().query_records(&conn, &table)?.pop())
}

/// Records matching any of the given primary keys, in primary key order.
/// Long key lists are read in batches, each ordered by primary key.
pub fn select_records_by_primary_keys<'a, 't>(
    table: impl Into<TableRef<'t>>,
    primary_keys_values: &[Record],
    handle: impl Into<ConnectionLike<'a>>,
    include_columns: Option<&[&str]>,
) -> Result<Vec<Record>> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    require_primary_key(&table)?;
    if primary_keys_values.is_empty() {
        return Ok(Vec::new());
    }
    let op = read_operation(&table, include_columns)?;
    let pk = table.primary_key_names();
    let mut records = Vec::new();
    if let [column] = pk {
        let mut values = Vec::with_capacity(primary_keys_values.len());
        for key in primary_keys_values {
            require_columns(key, pk)?;
            values.push(key.get(column).cloned().unwrap_or(Value::Null));
        }
        for batch in values.chunks(MAX_VARIABLES) {
            let query = Query::new().with_condition(column, QueryOperator::In(batch.to_vec()));
            records.extend(op.clone().filter(query).to_sql().query_records(&conn, &table)?);
        }
    } else {
        let queries = primary_keys_values
            .iter()
            .map(|key| key_query(&table, key))
            .collect::<Result<Vec<_>>>()?;
        let per_statement = (MAX_VARIABLES / pk.len()).clamp(1, MAX_OR_TERMS);
        for batch in queries.chunks(per_statement) {
            let op = batch.iter().cloned().fold(op.clone(), ReadOperation::filter);
            records.extend(op.to_sql().query_records(&conn, &table)?);
        }
    }
    Ok(records)
}

pub fn select_column_values_by_primary_keys<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    primary_keys_values: &[Record],
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Vec<Value>> {
    let records = select_records_by_primary_keys(table, primary_keys_values, handle, Some(std::slice::from_ref(&column)))?;
    Ok(into_values(records, column))
}

/// The value of `column` in the row with the given primary key.
pub fn select_value_by_primary_keys<'a, 't>(
    table: impl Into<TableRef<'t>>,
    column: &str,
    primary_key_value: &Record,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<Option<Value>> {
    let record = select_record_by_primary_key(table, primary_key_value, handle, Some(std::slice::from_ref(&column)))?;
    Ok(record.and_then(|mut r| r.remove(column)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn xy() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE xy (id INTEGER PRIMARY KEY, x INTEGER, y INTEGER);
             INSERT INTO xy VALUES (4, 8, 11), (2, 2, 4), (1, 1, 2), (3, 4, 8);",
        )
        .unwrap();
        conn
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_slice_bounds() {
        assert_eq!(slice_bounds(Some(1), Some(3), 4), (1, 2));
        assert_eq!(slice_bounds(None, None, 4), (0, 4));
        assert_eq!(slice_bounds(Some(-2), None, 4), (2, 2));
        assert_eq!(slice_bounds(None, Some(-1), 4), (0, 3));
        assert_eq!(slice_bounds(Some(3), Some(1), 4), (3, 0));
        assert_eq!(slice_bounds(Some(-10), Some(10), 4), (0, 4));
    }

    #[test]
    fn test_all_ordered_by_primary_key() {
        let conn = xy();
        let records = select_records_all("xy", &conn, None).unwrap();
        assert_eq!(ids(&records), vec![1, 2, 3, 4]);
        assert_eq!(records[0], record! { "id" => 1, "x" => 1, "y" => 2 });
    }

    #[test]
    fn test_include_columns() {
        let conn = xy();
        let records = select_records_all("xy", &conn, Some(&["y"][..])).unwrap();
        assert_eq!(records[0], record! { "y" => 2 });
        let err = select_records_all("xy", &conn, Some(&["z"][..])).unwrap_err();
        assert!(matches!(err, Error::NoSuchColumn { .. }));
    }

    #[test]
    fn test_slices_and_indexes() {
        let conn = xy();
        assert_eq!(ids(&select_records_slice("xy", Some(1), Some(3), &conn, None).unwrap()), vec![2, 3]);
        assert_eq!(ids(&select_records_slice("xy", Some(-1), None, &conn, None).unwrap()), vec![4]);
        assert_eq!(
            select_column_values_by_slice("xy", "x", None, Some(2), &conn).unwrap(),
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(
            select_column_value_by_index("xy", "y", -1, &conn).unwrap(),
            Some(Value::Integer(11))
        );
        assert_eq!(select_record_by_index("xy", 4, &conn, None).unwrap(), None);
        assert_eq!(select_record_by_index("xy", -5, &conn, None).unwrap(), None);
        assert_eq!(
            select_primary_key_records_by_slice("xy", Some(2), None, &conn).unwrap(),
            vec![record! { "id" => 3 }, record! { "id" => 4 }]
        );
    }

    #[test]
    fn test_chunks() {
        let conn = xy();
        let mut chunks = select_records_chunks("xy", &conn, 3, None).unwrap();
        assert_eq!(ids(&chunks.next().unwrap().unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(&chunks.next().unwrap().unwrap()), vec![4]);
        assert!(chunks.next().is_none());

        let values: Vec<Vec<Value>> = select_column_values_chunks("xy", "x", &conn, 2)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(values, vec![vec![1.into(), 2.into()], vec![4.into(), 8.into()]]);
    }

    #[test]
    fn test_primary_key_lookups() {
        let conn = xy();
        assert_eq!(
            select_record_by_primary_key("xy", &record! { "id" => 3 }, &conn, None).unwrap(),
            Some(record! { "id" => 3, "x" => 4, "y" => 8 })
        );
        assert_eq!(select_record_by_primary_key("xy", &record! { "id" => 9 }, &conn, None).unwrap(), None);
        let err = select_record_by_primary_key("xy", &record! { "x" => 1 }, &conn, None).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));

        let keys = vec![record! { "id" => 4 }, record! { "id" => 1 }];
        assert_eq!(ids(&select_records_by_primary_keys("xy", &keys, &conn, None).unwrap()), vec![1, 4]);
        assert_eq!(
            select_column_values_by_primary_keys("xy", "y", &keys, &conn).unwrap(),
            vec![Value::Integer(2), Value::Integer(11)]
        );
        assert_eq!(
            select_value_by_primary_keys("xy", "x", &record! { "id" => 2 }, &conn).unwrap(),
            Some(Value::Integer(2))
        );
    }

    #[test]
    fn test_existing_values() {
        let conn = xy();
        let found = select_existing_values("xy", "x", &[1.into(), 3.into(), 8.into()], &conn).unwrap();
        assert_eq!(found, vec![Value::Integer(1), Value::Integer(8)]);
        assert!(select_existing_values("xy", "x", &[], &conn).unwrap().is_empty());
    }

    #[test]
    fn test_long_value_lists_are_batched() {
        let conn = xy();
        let mut values: Vec<Value> = (100..100 + MAX_VARIABLES as i64).map(Value::from).collect();
        values.extend([8.into(), 2.into()]);
        let found = select_existing_values("xy", "x", &values, &conn).unwrap();
        assert_eq!(found, vec![Value::Integer(2), Value::Integer(8)]);

        let keys: Vec<Record> = (0..MAX_VARIABLES as i64 + 2).map(|i| record! { "id" => i }).collect();
        assert_eq!(ids(&select_records_by_primary_keys("xy", &keys, &conn, None).unwrap()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_many_composite_keys() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE pairs (a INTEGER, b INTEGER, v TEXT, PRIMARY KEY (a, b));
             INSERT INTO pairs VALUES (1, 1, 'x'), (2, 5, 'y');",
        )
        .unwrap();
        let mut keys: Vec<Record> = (0..3 * MAX_OR_TERMS as i64).map(|i| record! { "a" => i, "b" => 0 }).collect();
        keys.push(record! { "a" => 2, "b" => 5 });
        let found = select_records_by_primary_keys("pairs", &keys, &conn, None).unwrap();
        assert_eq!(found, vec![record! { "a" => 2, "b" => 5, "v" => "y" }]);
    }

    #[test]
    fn test_lookup_without_primary_key() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE bare (v TEXT)").unwrap();
        let err = select_record_by_primary_key("bare", &record! { "v" => "a" }, &conn, None).unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey { .. }));
    }
}
