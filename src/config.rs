//! Engine configuration and declarative table definitions.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::schema::{quote_ident, SqlType, TableName};

pub const MEMORY_PATH: &str = ":memory:";

/// Schema definition for the SQLite database
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(str::to_owned);
        self
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.primary_key = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn add_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn add_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn table_name(&self) -> TableName {
        TableName::new(self.name.clone(), self.schema.as_deref())
    }

    /// Primary key columns: the table-level list followed by any column
    /// carrying a `PrimaryKey` constraint.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        let mut pk: Vec<&str> = self.primary_key.iter().map(String::as_str).collect();
        for column in &self.columns {
            if column.constraints.contains(&ColumnConstraint::PrimaryKey)
                && !pk.contains(&column.name.as_str())
            {
                pk.push(&column.name);
            }
        }
        pk
    }

    /// Render the `CREATE TABLE` statement.
    pub fn create_sql(&self, if_not_exists: bool) -> String {
        let pk = self.primary_key_columns();
        // SQLite only allows AUTOINCREMENT on an inline single-column key.
        let inline_pk = match pk.as_slice() {
            [only] => self
                .columns
                .iter()
                .find(|c| c.name == *only && c.is_autoincrement())
                .map(|c| c.name.as_str()),
            _ => None,
        };

        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.render(inline_pk == Some(c.name.as_str())))
            .collect();
        if inline_pk.is_none() && !pk.is_empty() {
            let cols: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
            parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }
        for fk in &self.foreign_keys {
            parts.push(fk.render());
        }

        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.table_name().qualified(),
            parts.join(", ")
        )
    }

    pub fn index_sql(&self) -> Vec<String> {
        let schema_prefix = self
            .schema
            .as_deref()
            .map(|s| format!("{}.", quote_ident(s)))
            .unwrap_or_default();
        self.indexes
            .iter()
            .map(|index| {
                let cols: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
                format!(
                    "CREATE {}INDEX IF NOT EXISTS {}{} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    schema_prefix,
                    quote_ident(&index.name),
                    quote_ident(&self.name),
                    cols.join(", ")
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: SqlType,
    #[serde(default)]
    pub constraints: Vec<ColumnConstraint>,
    #[serde(default)]
    pub default_value: Option<DefaultValue>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: SqlType) -> Self {
        Self {
            name: name.into(),
            data_type,
            constraints: Vec::new(),
            default_value: None,
        }
    }

    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn with_default(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    fn is_autoincrement(&self) -> bool {
        self.data_type == SqlType::Integer
            && self.constraints.contains(&ColumnConstraint::Autoincrement)
    }

    fn render(&self, inline_pk: bool) -> String {
        let mut sql = quote_ident(&self.name);
        let ddl = self.data_type.ddl_name();
        if !ddl.is_empty() {
            sql.push(' ');
            sql.push_str(ddl);
        }
        if inline_pk {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        for constraint in &self.constraints {
            match constraint {
                ColumnConstraint::NotNull => sql.push_str(" NOT NULL"),
                ColumnConstraint::Unique => sql.push_str(" UNIQUE"),
                ColumnConstraint::PrimaryKey | ColumnConstraint::Autoincrement => {}
            }
        }
        if let Some(default) = &self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.render());
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
    Autoincrement,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Null,
    CurrentTimestamp,
}

impl DefaultValue {
    fn render(&self) -> String {
        match self {
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Real(f) => format!("{f:?}"),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    fn render(&self) -> String {
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_ident(&self.column),
            quote_ident(&self.foreign_table),
            quote_ident(&self.foreign_column),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    fn as_sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// Tables created (if missing) when the engine opens
    pub schema: Schema,
    /// Upper bound on pooled connections. Forced to 1 for in-memory databases.
    pub pool_size: usize,
    pub pool_timeout_ms: u64,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: MEMORY_PATH.to_string(),
            schema: Schema::new(),
            pool_size: 5,
            pool_timeout_ms: 30_000,
            busy_timeout_ms: 5_000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new SQLite config with path and schema
    pub fn new(db_path: impl Into<String>, schema: Schema) -> Self {
        Self {
            db_path: db_path.into(),
            schema,
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parse a connection URL.
    ///
    /// Accepts `sqlite://` (in memory), `sqlite:///:memory:`, `sqlite:///relative.db`,
    /// `sqlite:////absolute/path.db` and plain file paths. Query strings are ignored.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();
        let path = match url.split_once("://") {
            Some((scheme, rest)) => {
                let driver = scheme.split('+').next().unwrap_or(scheme);
                if !driver.eq_ignore_ascii_case("sqlite") {
                    return Err(Error::InvalidReference(format!(
                        "unsupported database url '{url}'"
                    )));
                }
                let rest = rest.split('?').next().unwrap_or("");
                if rest.is_empty() {
                    MEMORY_PATH
                } else if let Some(path) = rest.strip_prefix('/') {
                    if path.is_empty() {
                        MEMORY_PATH
                    } else {
                        path
                    }
                } else {
                    return Err(Error::InvalidReference(format!(
                        "sqlite urls take no host: '{url}'"
                    )));
                }
            }
            None if url.is_empty() => MEMORY_PATH,
            None => url,
        };
        Ok(Self::new(path, Schema::new()))
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.db_path.is_empty() || self.db_path == MEMORY_PATH
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Effective pool size after the in-memory restriction.
    pub fn effective_pool_size(&self) -> usize {
        if self.is_memory() {
            1
        } else {
            self.pool_size.max(1)
        }
    }
}
