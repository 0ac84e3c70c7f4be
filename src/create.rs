//! Table creation, inference of column types from records, dropping and copying.

use rusqlite::Connection;
use tracing::{info, trace};

use crate::config::{ColumnConstraint, ColumnDefinition, TableDefinition};
use crate::engine::ConnectionLike;
use crate::error::{Error, Result};
use crate::insert::insert_on;
use crate::record::Record;
use crate::schema::{reflect, SqlType, TableMetadata, TableName, TableRef};
use crate::value::Value;

/// What to do when the table being created already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IfExists {
    /// Fail with the database's "table already exists" error.
    #[default]
    Error,
    /// Drop the existing table first.
    Replace,
    /// Accepted for compatibility; behaves like [`IfExists::Error`].
    Append,
}

fn build_definition(
    name: &TableName,
    columns: &[(&str, SqlType)],
    primary_key: &[&str],
    autoincrement: bool,
) -> TableDefinition {
    let single_pk = primary_key.len() == 1;
    columns.iter().fold(
        TableDefinition::new(name.name.clone())
            .in_schema(name.schema.as_deref())
            .with_primary_key(primary_key),
        |def, (column, sql_type)| {
            let mut col = ColumnDefinition::new(*column, sql_type.clone());
            if autoincrement && single_pk && primary_key[0] == *column {
                col = col.with_constraint(ColumnConstraint::Autoincrement);
            }
            def.add_column(col)
        },
    )
}

fn create_on(conn: &Connection, def: &TableDefinition, if_exists: IfExists) -> Result<TableMetadata> {
    let name = def.table_name();
    if if_exists == IfExists::Replace {
        let sql = format!("DROP TABLE IF EXISTS {}", name.qualified());
        trace!(sql = %sql, "Dropping before replace");
        conn.execute_batch(&sql)?;
    }
    conn.execute_batch(&def.create_sql(false))?;
    info!(table = %name, columns = def.columns.len(), "Created table");
    reflect(conn, &name.name, name.schema.as_deref())
}

/// Create a table from column names and types and return its reflected
/// metadata.
///
/// With `autoincrement`, a single `INTEGER` primary key is declared
/// `PRIMARY KEY AUTOINCREMENT`.
pub fn create_table<'a>(
    table_name: &str,
    columns: &[(&str, SqlType)],
    primary_key: &[&str],
    handle: impl Into<ConnectionLike<'a>>,
    schema: Option<&str>,
    autoincrement: bool,
    if_exists: IfExists,
) -> Result<TableMetadata> {
    let name = TableName::new(table_name, schema);
    let def = build_definition(&name, columns, primary_key, autoincrement);
    handle
        .into()
        .transact("create_table", |conn| create_on(conn, &def, if_exists))
}

/// Options for [`create_table_from_records`].
#[derive(Debug, Clone)]
pub struct CreateTableOptions {
    /// Explicit column types, one per column. Inferred when `None`.
    pub column_types: Option<Vec<SqlType>>,
    pub schema: Option<String>,
    pub autoincrement: bool,
    pub if_exists: IfExists,
    /// Explicit column order. Defaults to the union of record keys.
    pub columns: Option<Vec<String>>,
    /// Written where a record lacks a column.
    pub missing_value: Value,
}

impl Default for CreateTableOptions {
    fn default() -> Self {
        Self {
            column_types: None,
            schema: None,
            autoincrement: true,
            if_exists: IfExists::Error,
            columns: None,
            missing_value: Value::Null,
        }
    }
}

impl CreateTableOptions {
    pub fn with_column_types(mut self, types: Vec<SqlType>) -> Self {
        self.column_types = Some(types);
        self
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    pub fn with_if_exists(mut self, if_exists: IfExists) -> Self {
        self.if_exists = if_exists;
        self
    }

    pub fn with_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    pub fn with_missing_value(mut self, value: impl Into<Value>) -> Self {
        self.missing_value = value.into();
        self
    }
}

/// Union of record keys, in the order they are first seen.
fn record_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in records.iter().flat_map(Record::keys) {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.to_string());
        }
    }
    columns
}

/// Create a table shaped like `records` and insert them.
pub fn create_table_from_records<'a>(
    table_name: &str,
    records: &[Record],
    primary_key: &[&str],
    handle: impl Into<ConnectionLike<'a>>,
    options: &CreateTableOptions,
) -> Result<TableMetadata> {
    let columns = options
        .columns
        .clone()
        .unwrap_or_else(|| record_columns(records));

    let filled: Vec<Record> = records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| (c.clone(), r.get(c).cloned().unwrap_or_else(|| options.missing_value.clone())))
                .collect::<Record>()
        })
        .collect();

    let types = match &options.column_types {
        Some(types) if types.len() != columns.len() => {
            return Err(Error::InvalidRecord(format!(
                "{} column types given for {} columns",
                types.len(),
                columns.len()
            )))
        }
        Some(types) => types.clone(),
        None => columns
            .iter()
            .map(|c| column_datatype(filled.iter().filter_map(|r| r.get(c))))
            .collect(),
    };

    let typed: Vec<(&str, SqlType)> = columns.iter().map(String::as_str).zip(types).collect();
    let name = TableName::new(table_name, options.schema.as_deref());
    let def = build_definition(&name, &typed, primary_key, options.autoincrement);

    handle.into().transact("create_table_from_records", |conn| {
        let table = create_on(conn, &def, options.if_exists)?;
        insert_on(conn, &table, &filled)?;
        Ok(table)
    })
}

type TypePredicate = fn(&Value) -> bool;

/// Candidate types in precedence order. The first one every value satisfies wins.
const TYPE_PREDICATES: &[(SqlType, TypePredicate)] = &[
    (SqlType::Integer, |v| matches!(v, Value::Integer(_))),
    (SqlType::Text, |v| matches!(v, Value::Text(_))),
    (SqlType::Float, |v| matches!(v, Value::Integer(_) | Value::Real(_))),
    (SqlType::Numeric, |v| matches!(v, Value::Decimal(_))),
    (SqlType::DateTime, |v| matches!(v, Value::DateTime(_))),
    (SqlType::Blob, |v| matches!(v, Value::Blob(_))),
    (SqlType::Boolean, |v| matches!(v, Value::Boolean(_))),
    (SqlType::Date, |v| matches!(v, Value::Date(_))),
    (SqlType::Time, |v| matches!(v, Value::Time(_))),
    (SqlType::Interval, |v| matches!(v, Value::Duration(_))),
    (SqlType::Array, |v| matches!(v, Value::List(_))),
    (SqlType::Json, |v| matches!(v, Value::Map(_))),
];

/// Infer a column type from sample values. Nulls are ignored; with no
/// non-null sample, or no type common to all of them, the column is text.
pub fn column_datatype<'v>(values: impl IntoIterator<Item = &'v Value>) -> SqlType {
    let values: Vec<&Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return SqlType::Text;
    }
    TYPE_PREDICATES
        .iter()
        .find(|(_, accepts)| values.iter().all(|&v| accepts(v)))
        .map_or(SqlType::Text, |(sql_type, _)| sql_type.clone())
}

/// Drop a table. With `if_exists` a missing table is not an error.
pub fn drop_table<'a, 't>(
    table: impl Into<TableRef<'t>>,
    handle: impl Into<ConnectionLike<'a>>,
    if_exists: bool,
    schema: Option<&str>,
) -> Result<()> {
    let name = match table.into() {
        TableRef::Name(name) => TableName::new(name, schema),
        TableRef::Qualified { schema, name } => TableName::new(name, Some(schema)),
        TableRef::Metadata(meta) => meta.table.clone(),
    };
    let sql = format!(
        "DROP TABLE {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        name.qualified()
    );
    handle.into().transact("drop_table", |conn| {
        conn.execute_batch(&sql)?;
        info!(table = %name, "Dropped table");
        Ok(())
    })
}

/// Create `new_name` with the columns and primary key of `table`, then copy
/// every row into it.
pub fn copy_table<'a, 't>(
    new_name: &str,
    table: impl Into<TableRef<'t>>,
    handle: impl Into<ConnectionLike<'a>>,
    if_exists: IfExists,
) -> Result<TableMetadata> {
    let table = table.into();
    handle.into().transact("copy_table", |conn| {
        let source = table.resolve(Some(conn))?;
        let columns: Vec<(&str, SqlType)> = source
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.sql_type.clone()))
            .collect();
        let pk: Vec<&str> = source.primary_key.columns.iter().map(String::as_str).collect();
        let autoincrement = source.columns.iter().any(|c| c.autoincrement);
        let name = TableName::new(new_name, source.schema());
        let def = build_definition(&name, &columns, &pk, autoincrement);

        let copy = create_on(conn, &def, if_exists)?;
        crate::insert::insert_from_table_on(conn, &source, &copy)?;
        Ok(copy)
    })
}
