//! Statement builders: turn records and simple equality queries into SQL text
//! with positional parameters, and decode result rows back into records.

use rusqlite::{params_from_iter, Connection};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{quote_ident, TableMetadata, TableName};
use crate::value::Value;

/// Upper bound on bound parameters per statement (SQLite's default
/// `SQLITE_MAX_VARIABLE_NUMBER` since 3.32).
pub const MAX_VARIABLES: usize = 32_766;

/// Upper bound on `OR`ed filters per `SELECT`. Each one nests the expression
/// tree a level deeper, and SQLite caps the depth at 1000.
pub const MAX_OR_TERMS: usize = 500;

/// SQL Query with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Execute a statement that returns no rows. Returns the affected row count.
    pub fn execute(&self, conn: &Connection) -> Result<usize> {
        debug!(sql = %self.statement, params = self.params.len(), "Executing statement");
        let mut stmt = conn.prepare_cached(&self.statement)?;
        Ok(stmt.execute(params_from_iter(self.params.iter()))?)
    }

    /// Run a query and decode every row using the column types of `table`.
    pub fn query_records(&self, conn: &Connection, table: &TableMetadata) -> Result<Vec<Record>> {
        debug!(sql = %self.statement, params = self.params.len(), "Running query");
        let mut stmt = conn.prepare_cached(&self.statement)?;
        let columns: Vec<(String, _)> = stmt
            .column_names()
            .into_iter()
            .map(|name| (name.to_string(), table.sql_type_of(name)))
            .collect();

        let mut rows = stmt.query(params_from_iter(self.params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (idx, (name, sql_type)) in columns.iter().enumerate() {
                let value = Value::from_sql(row.get_ref(idx)?, sql_type, name)?;
                record.insert(name, value);
            }
            records.push(record);
        }
        trace!(rows = records.len(), "Query returned");
        Ok(records)
    }
}

/// Query operators for building predicates
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    /// `column = value`, or `column IS NULL` for a null value.
    Equal(Value),
    /// `column IN (...)`. An empty list matches nothing.
    In(Vec<Value>),
}

impl QueryOperator {
    fn render(&self, column: &str, params: &mut Vec<Value>) -> String {
        let column = quote_ident(column);
        match self {
            QueryOperator::Equal(Value::Null) => format!("{column} IS NULL"),
            QueryOperator::Equal(value) => {
                params.push(value.clone());
                format!("{column} = ?")
            }
            QueryOperator::In(values) if values.is_empty() => "1 = 0".to_string(),
            QueryOperator::In(values) => {
                params.extend(values.iter().cloned());
                let marks = vec!["?"; values.len()].join(", ");
                format!("{column} IN ({marks})")
            }
        }
    }
}

/// A conjunction of column conditions, rendered in insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: Vec<(String, QueryOperator)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.push((field.to_string(), op));
        self
    }

    /// One equality per column of the record.
    pub fn from_record(record: &Record) -> Self {
        record.iter().fold(Query::new(), |q, (column, value)| {
            q.with_condition(column, QueryOperator::Equal(value.clone()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Render as a predicate, or `None` when there are no conditions.
    pub fn render(&self, params: &mut Vec<Value>) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(column, op)| op.render(column, params))
            .collect();
        Some(parts.join(" AND "))
    }
}

fn column_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row `INSERT`. Consecutive records sharing the same column set go in
/// one statement, split so no statement exceeds [`MAX_VARIABLES`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: TableName,
    pub rows: Vec<Record>,
}

impl CreateOperation {
    pub fn new(table: TableName, rows: Vec<Record>) -> Self {
        Self { table, rows }
    }

    pub fn to_sql(&self) -> Vec<SqlQuery> {
        let mut statements = Vec::new();
        let mut start = 0;
        while start < self.rows.len() {
            let first = &self.rows[start];
            let columns: Vec<&str> = first.keys().collect();
            let mut end = start + 1;
            while end < self.rows.len() && same_columns(first, &self.rows[end]) {
                end += 1;
            }
            self.push_group(&columns, &self.rows[start..end], &mut statements);
            start = end;
        }
        statements
    }

    fn push_group(&self, columns: &[&str], rows: &[Record], out: &mut Vec<SqlQuery>) {
        let target = self.table.qualified();
        if columns.is_empty() {
            for _ in rows {
                out.push(SqlQuery::new(&format!("INSERT INTO {target} DEFAULT VALUES")));
            }
            return;
        }

        let per_statement = (MAX_VARIABLES / columns.len()).max(1);
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        for chunk in rows.chunks(per_statement) {
            let mut params = Vec::with_capacity(chunk.len() * columns.len());
            for row in chunk {
                for column in columns {
                    params.push(row.get(column).cloned().unwrap_or(Value::Null));
                }
            }
            let statement = format!(
                "INSERT INTO {target} ({}) VALUES {}",
                column_list(columns),
                vec![tuple.as_str(); chunk.len()].join(", ")
            );
            out.push(SqlQuery::new(&statement).with_params(params));
        }
    }
}

fn same_columns(left: &Record, right: &Record) -> bool {
    left.len() == right.len() && left.keys().all(|k| right.contains_key(k))
}

/// `SELECT` with an optional projection, an OR of conjunctive filters,
/// ordering and paging.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: TableName,
    pub fields: Option<Vec<String>>,
    /// Rows matching any of these queries. Empty selects every row.
    pub filter: Vec<Query>,
    pub order_by: Vec<(String, bool)>, // (field, is_ascending)
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ReadOperation {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            fields: None,
            filter: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }

    pub fn order_by<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.order_by
            .extend(columns.iter().map(|c| (c.as_ref().to_string(), true)));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), false));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_sql(&self) -> SqlQuery {
        let projection = match &self.fields {
            Some(fields) => column_list(fields),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {projection} FROM {}", self.table.qualified());
        let mut params = Vec::new();

        // An empty query inside the OR matches every row.
        if !self.filter.is_empty() && !self.filter.iter().any(Query::is_empty) {
            let parts: Vec<String> = self
                .filter
                .iter()
                .filter_map(|q| q.render(&mut params))
                .map(|p| format!("({p})"))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" OR "));
        }
        if !self.order_by.is_empty() {
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, asc)| format!("{} {}", quote_ident(c), if *asc { "ASC" } else { "DESC" }))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        SqlQuery::new(&sql).with_params(params)
    }
}

/// `UPDATE ... SET ... WHERE ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: TableName,
    /// `None` updates every row. An empty query updates nothing.
    pub query: Option<Query>,
    pub updates: Record,
}

impl UpdateOperation {
    pub fn new(table: TableName, query: Option<Query>, updates: Record) -> Self {
        Self {
            table,
            query,
            updates,
        }
    }

    /// Split a record into match columns (the predicate) and new values.
    pub fn from_record<S: AsRef<str>>(table: TableName, record: &Record, match_columns: &[S]) -> Self {
        let (matched, updates) = record.partition(match_columns);
        Self::new(table, Some(Query::from_record(&matched)), updates)
    }

    /// `None` when there is nothing to set or the predicate is empty.
    pub fn to_sql(&self) -> Option<SqlQuery> {
        if self.updates.is_empty() {
            return None;
        }
        let mut params = Vec::new();
        let assignments: Vec<String> = self
            .updates
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{} = ?", quote_ident(column))
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table.qualified(),
            assignments.join(", ")
        );
        if let Some(query) = &self.query {
            sql.push_str(" WHERE ");
            sql.push_str(&query.render(&mut params)?);
        }
        Some(SqlQuery::new(&sql).with_params(params))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: TableName,
    /// `None` deletes every row. An empty query deletes nothing.
    pub query: Option<Query>,
}

impl DeleteOperation {
    pub fn new(table: TableName, query: Option<Query>) -> Self {
        Self { table, query }
    }

    pub fn to_sql(&self) -> Option<SqlQuery> {
        let mut sql = format!("DELETE FROM {}", self.table.qualified());
        let mut params = Vec::new();
        if let Some(query) = &self.query {
            sql.push_str(" WHERE ");
            sql.push_str(&query.render(&mut params)?);
        }
        Some(SqlQuery::new(&sql).with_params(params))
    }
}

/// `INSERT INTO destination (cols) SELECT cols FROM source`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSelectOperation {
    pub source: TableName,
    pub destination: TableName,
    pub columns: Vec<String>,
}

impl InsertSelectOperation {
    pub fn to_sql(&self) -> Option<SqlQuery> {
        if self.columns.is_empty() {
            return None;
        }
        let cols = column_list(&self.columns);
        Some(SqlQuery::new(&format!(
            "INSERT INTO {} ({cols}) SELECT {cols} FROM {}",
            self.destination.qualified(),
            self.source.qualified()
        )))
    }
}

/// Check every column of a record against the table: it must exist and the
/// value must fit the column type.
pub fn validate_record(table: &TableMetadata, record: &Record) -> Result<()> {
    for (column, value) in record.iter() {
        let meta = table.require_column(column)?;
        if !meta.sql_type.accepts(value) {
            return Err(Error::TypeMismatch {
                column: column.to_string(),
                expected: meta.sql_type.ddl_name().to_lowercase(),
                found: value.kind().to_string(),
            });
        }
    }
    Ok(())
}

/// Require the listed columns to be present in the record.
pub(crate) fn require_columns<S: AsRef<str>>(record: &Record, columns: &[S]) -> Result<()> {
    match columns.iter().find(|c| !record.contains_key(c.as_ref())) {
        Some(missing) => Err(Error::InvalidRecord(format!(
            "record is missing match column '{}'",
            missing.as_ref()
        ))),
        None => Ok(()),
    }
}
