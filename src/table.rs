//! A table name bound to an engine, exposing the record functions as methods.

use crate::create::{drop_table, IfExists};
use crate::delete;
use crate::engine::Engine;
use crate::error::Result;
use crate::insert;
use crate::record::Record;
use crate::schema::{self, SqlType, TableMetadata, TableRef};
use crate::select::{self, ColumnChunks, RecordChunks};
use crate::update;
use crate::value::Value;

/// A table on an engine. Every call reflects the table again and runs as its
/// own unit of work.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    schema: Option<String>,
    engine: Engine,
}

impl Table {
    pub fn new(name: impl Into<String>, engine: &Engine, schema: Option<&str>) -> Self {
        Self {
            name: name.into(),
            schema: schema.map(str::to_owned),
            engine: engine.clone(),
        }
    }

    /// Open an engine from a URL and bind a table on it. Fails if the table
    /// does not exist.
    pub fn open(url: &str, name: &str, schema: Option<&str>) -> Result<Self> {
        let (engine, _) = schema::get_engine_table(url, name, schema)?;
        Ok(Self::new(name, &engine, schema))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn table_ref(&self) -> TableRef<'_> {
        match &self.schema {
            Some(schema) => TableRef::Qualified {
                schema,
                name: &self.name,
            },
            None => TableRef::Name(&self.name),
        }
    }

    pub fn metadata(&self) -> Result<TableMetadata> {
        schema::get_table(&self.name, &self.engine, self.schema())
    }

    pub fn row_count(&self) -> Result<i64> {
        schema::get_row_count(self.table_ref(), &self.engine)
    }

    pub fn primary_key_names(&self) -> Result<Vec<String>> {
        Ok(schema::primary_key_names(&self.metadata()?))
    }

    pub fn column_names(&self) -> Result<Vec<String>> {
        Ok(schema::get_column_names(&self.metadata()?))
    }

    pub fn column_types(&self) -> Result<Vec<(String, SqlType)>> {
        Ok(schema::get_column_types(&self.metadata()?))
    }

    pub fn drop_table(self, if_exists: bool) -> Result<()> {
        drop_table(self.table_ref(), &self.engine, if_exists, None)
    }

    /// Replicate this table under `new_name` and return the copy.
    pub fn copy(&self, new_name: &str, if_exists: IfExists) -> Result<Table> {
        crate::create::copy_table(new_name, self.table_ref(), &self.engine, if_exists)?;
        Ok(Table::new(new_name, &self.engine, self.schema()))
    }

    pub fn insert_records(&self, records: &[Record]) -> Result<()> {
        insert::insert_records(self.table_ref(), records, &self.engine)
    }

    /// Copy every row of `source` into this table.
    pub fn insert_from_table(&self, source: &Table) -> Result<()> {
        insert::insert_from_table(source.table_ref(), self.table_ref(), &self.engine)
    }

    pub fn delete_records(&self, column: &str, values: &[Value]) -> Result<usize> {
        delete::delete_records(self.table_ref(), column, values, &self.engine)
    }

    pub fn delete_records_by_values(&self, records: &[Record]) -> Result<usize> {
        delete::delete_records_by_values(self.table_ref(), records, &self.engine)
    }

    pub fn delete_all_records(&self) -> Result<usize> {
        delete::delete_all_records(self.table_ref(), &self.engine)
    }

    pub fn update_records(&self, records: &[Record], match_columns: Option<&[&str]>) -> Result<usize> {
        update::update_records(self.table_ref(), records, &self.engine, match_columns)
    }

    pub fn update_matching_records(&self, records: &[Record], match_columns: &[&str]) -> Result<usize> {
        update::update_matching_records(self.table_ref(), records, match_columns, &self.engine)
    }

    pub fn set_column_values(&self, column: &str, value: impl Into<Value>) -> Result<usize> {
        update::set_column_values(self.table_ref(), column, value, &self.engine)
    }

    pub fn select_records_all(&self, include_columns: Option<&[&str]>) -> Result<Vec<Record>> {
        select::select_records_all(self.table_ref(), &self.engine, include_columns)
    }

    pub fn select_records_chunks(
        &self,
        chunksize: usize,
        include_columns: Option<&[&str]>,
    ) -> Result<RecordChunks<'_>> {
        select::select_records_chunks(self.table_ref(), &self.engine, chunksize, include_columns)
    }

    pub fn select_existing_values(&self, column: &str, values: &[Value]) -> Result<Vec<Value>> {
        select::select_existing_values(self.table_ref(), column, values, &self.engine)
    }

    pub fn select_column_values_all(&self, column: &str) -> Result<Vec<Value>> {
        select::select_column_values_all(self.table_ref(), column, &self.engine)
    }

    pub fn select_column_values_chunks(&self, column: &str, chunksize: usize) -> Result<ColumnChunks<'_>> {
        select::select_column_values_chunks(self.table_ref(), column, &self.engine, chunksize)
    }

    pub fn select_records_slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        include_columns: Option<&[&str]>,
    ) -> Result<Vec<Record>> {
        select::select_records_slice(self.table_ref(), start, stop, &self.engine, include_columns)
    }

    pub fn select_column_values_by_slice(
        &self,
        column: &str,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> Result<Vec<Value>> {
        select::select_column_values_by_slice(self.table_ref(), column, start, stop, &self.engine)
    }

    pub fn select_column_value_by_index(&self, column: &str, index: i64) -> Result<Option<Value>> {
        select::select_column_value_by_index(self.table_ref(), column, index, &self.engine)
    }

    pub fn select_record_by_index(&self, index: i64) -> Result<Option<Record>> {
        select::select_record_by_index(self.table_ref(), index, &self.engine, None)
    }

    pub fn select_primary_key_records_by_slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
    ) -> Result<Vec<Record>> {
        select::select_primary_key_records_by_slice(self.table_ref(), start, stop, &self.engine)
    }

    pub fn select_record_by_primary_key(&self, key: &Record) -> Result<Option<Record>> {
        select::select_record_by_primary_key(self.table_ref(), key, &self.engine, None)
    }

    pub fn select_records_by_primary_keys(&self, keys: &[Record]) -> Result<Vec<Record>> {
        select::select_records_by_primary_keys(self.table_ref(), keys, &self.engine, None)
    }

    pub fn select_column_values_by_primary_keys(&self, column: &str, keys: &[Record]) -> Result<Vec<Value>> {
        select::select_column_values_by_primary_keys(self.table_ref(), column, keys, &self.engine)
    }

    pub fn select_value_by_primary_keys(&self, column: &str, key: &Record) -> Result<Option<Value>> {
        select::select_value_by_primary_keys(self.table_ref(), column, key, &self.engine)
    }
}

/// Two tables are equal when their names and primary keys match. A table
/// that cannot be reflected equals nothing.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        match (self.metadata(), other.metadata()) {
            (Ok(left), Ok(right)) => schema::tables_metadata_equal(&left, &right),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create::create_table;
    use crate::record;

    fn engine() -> Engine {
        let engine = Engine::in_memory().unwrap();
        create_table(
            "xy",
            &[("id", SqlType::Integer), ("x", SqlType::Integer), ("y", SqlType::Integer)],
            &["id"],
            &engine,
            None,
            false,
            IfExists::Error,
        )
        .unwrap();
        engine
    }

    #[test]
    fn test_table_roundtrip() {
        let engine = engine();
        let table = Table::new("xy", &engine, None);
        table
            .insert_records(&[record! { "id" => 1, "x" => 1, "y" => 2 }, record! { "id" => 2, "x" => 2, "y" => 4 }])
            .unwrap();
        assert_eq!(table.row_count().unwrap(), 2);
        assert_eq!(table.primary_key_names().unwrap(), vec!["id"]);
        assert_eq!(table.column_names().unwrap(), vec!["id", "x", "y"]);
        assert_eq!(
            table.select_record_by_index(-1).unwrap(),
            Some(record! { "id" => 2, "x" => 2, "y" => 4 })
        );
        assert_eq!(table.set_column_values("y", 0).unwrap(), 2);
        assert_eq!(table.delete_all_records().unwrap(), 2);
    }

    #[test]
    fn test_table_equality_and_copy() {
        let engine = engine();
        let table = Table::new("xy", &engine, None);
        assert_eq!(table, Table::new("xy", &engine, None));
        let copy = table.copy("xy_copy", IfExists::Error).unwrap();
        assert_ne!(table, copy);
        assert_ne!(table, Table::new("missing", &engine, None));
        copy.drop_table(false).unwrap();
    }
}
