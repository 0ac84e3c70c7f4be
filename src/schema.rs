//! Schema reflection: table, column and primary-key metadata read from the
//! SQLite catalog.
//!
//! Metadata is never cached. Every call to [`reflect`] reads the catalog again,
//! so the database stays the single source of truth.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::engine::{ConnectionLike, Engine};
use crate::error::{Error, Result};
use crate::value::Value;

/// Column types understood by the table builder and the row decoder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Integer,
    Text,
    Float,
    /// Exact decimal. Columns created here are declared `DECIMAL_TEXT`, which
    /// has text affinity, so values keep every digit as written.
    Numeric,
    DateTime,
    Blob,
    Boolean,
    Date,
    Time,
    Interval,
    Array,
    Json,
    /// No declared type; values are read back in their storage class.
    Any,
}

impl SqlType {
    /// Type name emitted in `CREATE TABLE`.
    pub fn ddl_name(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Text => "TEXT",
            SqlType::Float => "FLOAT",
            SqlType::Numeric => "DECIMAL_TEXT",
            SqlType::DateTime => "DATETIME",
            SqlType::Blob => "BLOB",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Interval => "INTERVAL",
            SqlType::Array => "ARRAY",
            SqlType::Json => "JSON",
            SqlType::Any => "",
        }
    }

    /// Map a declared column type back to a [`SqlType`].
    ///
    /// Exact names written by the table builder are recognised first, then the
    /// SQLite affinity rules decide.
    pub fn from_declared(declared: &str) -> SqlType {
        let upper = declared.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "" => SqlType::Any,
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "DATETIME" | "TIMESTAMP" => SqlType::DateTime,
            "INTERVAL" => SqlType::Interval,
            "DECIMAL_TEXT" | "NUMERIC" | "DECIMAL" => SqlType::Numeric,
            "ARRAY" => SqlType::Array,
            "JSON" => SqlType::Json,
            _ if base.contains("INT") => SqlType::Integer,
            _ if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") => {
                SqlType::Text
            }
            _ if base.contains("BLOB") => SqlType::Blob,
            _ if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") => {
                SqlType::Float
            }
            _ => SqlType::Numeric,
        }
    }

    /// Whether a value may be written to a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (SqlType::Any, _) => true,
            (SqlType::Integer, Value::Integer(_)) => true,
            (SqlType::Text, Value::Text(_)) => true,
            (SqlType::Float, Value::Integer(_) | Value::Real(_) | Value::Decimal(_)) => true,
            (SqlType::Numeric, Value::Integer(_) | Value::Real(_) | Value::Decimal(_)) => true,
            (SqlType::DateTime, Value::DateTime(_) | Value::Date(_)) => true,
            (SqlType::Blob, Value::Blob(_)) => true,
            (SqlType::Boolean, Value::Boolean(_)) => true,
            (SqlType::Date, Value::Date(_)) => true,
            (SqlType::Time, Value::Time(_)) => true,
            (SqlType::Interval, Value::Duration(_)) => true,
            (SqlType::Array, Value::List(_)) => true,
            (SqlType::Json, Value::Map(_) | Value::List(_)) => true,
            _ => false,
        }
    }
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A table name with an optional schema (attached database) qualifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>, schema: Option<&str>) -> Self {
        Self {
            name: name.into(),
            schema: schema.map(str::to_owned),
        }
    }

    /// Quoted, schema-qualified form for use in SQL text.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    pub(crate) fn schema_or_main(&self) -> &str {
        self.schema.as_deref().unwrap_or("main")
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
}

/// Primary key constraint. SQLite does not name primary keys, so `name` is
/// normally `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimaryKeyConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Reflected description of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub table: TableName,
    pub columns: Vec<ColumnMetadata>,
    pub primary_key: PrimaryKeyConstraint,
}

impl TableMetadata {
    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.table.schema.as_deref()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`TableMetadata::column`], failing with `NoSuchColumn`.
    pub fn require_column(&self, name: &str) -> Result<&ColumnMetadata> {
        self.column(name).ok_or_else(|| Error::NoSuchColumn {
            table: self.table.to_string(),
            column: name.to_string(),
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn primary_key_names(&self) -> &[String] {
        &self.primary_key.columns
    }

    pub fn missing_primary_key(&self) -> bool {
        self.primary_key.columns.is_empty()
    }

    pub(crate) fn sql_type_of(&self, column: &str) -> SqlType {
        self.column(column)
            .map_or(SqlType::Any, |c| c.sql_type.clone())
    }
}

/// How a table is named by a caller: by name, or by already reflected metadata.
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    Name(&'a str),
    Qualified { schema: &'a str, name: &'a str },
    Metadata(&'a TableMetadata),
}

impl<'a> From<&'a str> for TableRef<'a> {
    fn from(name: &'a str) -> Self {
        TableRef::Name(name)
    }
}

impl<'a> From<&'a String> for TableRef<'a> {
    fn from(name: &'a String) -> Self {
        TableRef::Name(name)
    }
}

impl<'a> From<&'a TableMetadata> for TableRef<'a> {
    fn from(table: &'a TableMetadata) -> Self {
        TableRef::Metadata(table)
    }
}

impl<'a> TableRef<'a> {
    /// Resolve to metadata, reflecting through `conn` when only a name is known.
    pub fn resolve(self, conn: Option<&Connection>) -> Result<TableMetadata> {
        match (self, conn) {
            (TableRef::Metadata(table), _) => Ok(table.clone()),
            (TableRef::Name(name), Some(conn)) => reflect(conn, name, None),
            (TableRef::Qualified { schema, name }, Some(conn)) => reflect(conn, name, Some(schema)),
            (TableRef::Name(name) | TableRef::Qualified { name, .. }, None) => Err(
                Error::InvalidReference(format!("table '{name}' given by name without a connection")),
            ),
        }
    }
}

/// Read column, type and primary-key metadata for one table.
pub fn reflect(conn: &Connection, table_name: &str, schema: Option<&str>) -> Result<TableMetadata> {
    let table = TableName::new(table_name, schema);
    let mut stmt =
        conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
    let rows = stmt.query_map(params![table_name, table.schema_or_main()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, bool>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut raw = Vec::new();
    for row in rows {
        raw.push(row?);
    }
    if raw.is_empty() {
        return Err(Error::NoSuchTable {
            table: table.to_string(),
        });
    }

    let mut pk: Vec<(i64, String)> = raw
        .iter()
        .filter(|(_, _, _, pk)| *pk > 0)
        .map(|(name, _, _, pk)| (*pk, name.clone()))
        .collect();
    pk.sort_by_key(|(pos, _)| *pos);
    let pk_columns: Vec<String> = pk.into_iter().map(|(_, name)| name).collect();

    let autoincrement = pk_columns.len() == 1 && declares_autoincrement(conn, &table)?;

    let columns = raw
        .into_iter()
        .map(|(name, declared, notnull, pk)| {
            let sql_type = SqlType::from_declared(&declared);
            let autoincrement = autoincrement && pk > 0 && sql_type == SqlType::Integer;
            ColumnMetadata {
                name,
                sql_type,
                nullable: !notnull && pk == 0,
                primary_key: pk > 0,
                autoincrement,
            }
        })
        .collect();

    tracing::trace!(table = %table, "Reflected table metadata");
    Ok(TableMetadata {
        table,
        columns,
        primary_key: PrimaryKeyConstraint {
            name: None,
            columns: pk_columns,
        },
    })
}

fn declares_autoincrement(conn: &Connection, table: &TableName) -> Result<bool> {
    let sql = format!(
        "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
        quote_ident(table.schema_or_main())
    );
    let ddl: Option<Option<String>> = conn
        .query_row(&sql, params![table.name], |row| row.get(0))
        .optional()?;
    Ok(ddl
        .flatten()
        .is_some_and(|ddl| ddl.to_ascii_uppercase().contains("AUTOINCREMENT")))
}

/// Reflect a table through any connection-like handle.
pub fn get_table<'a>(
    table_name: &str,
    handle: impl Into<ConnectionLike<'a>>,
    schema: Option<&str>,
) -> Result<TableMetadata> {
    let conn = handle.into().resolve()?;
    reflect(&conn, table_name, schema)
}

/// Open an engine and reflect one of its tables.
pub fn get_engine_table(
    url: &str,
    table_name: &str,
    schema: Option<&str>,
) -> Result<(Engine, TableMetadata)> {
    let engine = Engine::from_url(url)?;
    let table = get_table(table_name, &engine, schema)?;
    Ok((engine, table))
}

/// Names of user tables in a schema, sorted.
pub fn get_table_names<'a>(
    handle: impl Into<ConnectionLike<'a>>,
    schema: Option<&str>,
) -> Result<Vec<String>> {
    let conn = handle.into().resolve()?;
    table_names(&conn, schema)
}

pub(crate) fn table_names(conn: &Connection, schema: Option<&str>) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(schema.unwrap_or("main"))
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

pub fn table_exists<'a>(
    table_name: &str,
    handle: impl Into<ConnectionLike<'a>>,
    schema: Option<&str>,
) -> Result<bool> {
    let names = get_table_names(handle, schema)?;
    Ok(names.iter().any(|n| n == table_name))
}

/// Names of the attached databases (`main`, `temp`, ...).
pub fn get_schemas<'a>(handle: impl Into<ConnectionLike<'a>>) -> Result<Vec<String>> {
    let conn = handle.into().resolve()?;
    let mut stmt = conn.prepare("SELECT name FROM pragma_database_list ORDER BY seq")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

pub fn get_row_count<'a, 't>(
    table: impl Into<TableRef<'t>>,
    handle: impl Into<ConnectionLike<'a>>,
) -> Result<i64> {
    let conn = handle.into().resolve()?;
    let table = table.into().resolve(Some(&*conn))?;
    let sql = format!("SELECT COUNT(*) FROM {}", table.table.qualified());
    tracing::debug!(sql = %sql, "Counting rows");
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

pub fn get_column_names(table: &TableMetadata) -> Vec<String> {
    table.column_names()
}

pub fn get_column_types(table: &TableMetadata) -> Vec<(String, SqlType)> {
    table
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.sql_type.clone()))
        .collect()
}

pub fn get_column<'t>(table: &'t TableMetadata, column_name: &str) -> Result<&'t ColumnMetadata> {
    table.require_column(column_name)
}

pub fn primary_key_names(table: &TableMetadata) -> Vec<String> {
    table.primary_key.columns.clone()
}

pub fn primary_key_columns(table: &TableMetadata) -> Vec<&ColumnMetadata> {
    table
        .primary_key
        .columns
        .iter()
        .filter_map(|name| table.column(name))
        .collect()
}

/// The table's primary key constraint, or `None` when it has none.
pub fn get_primary_key_constraints(table: &TableMetadata) -> Option<&PrimaryKeyConstraint> {
    (!table.missing_primary_key()).then_some(&table.primary_key)
}

pub fn missing_primary_key(table: &TableMetadata) -> bool {
    table.missing_primary_key()
}

/// Tables match when their names and primary key column sets match.
pub fn tables_metadata_equal(left: &TableMetadata, right: &TableMetadata) -> bool {
    if left.table.name != right.table.name {
        return false;
    }
    let mut l = left.primary_key.columns.clone();
    let mut r = right.primary_key.columns.clone();
    l.sort();
    r.sort();
    l == r
}
