//! Async wrappers. Each call runs the blocking record function on tokio's
//! blocking pool; there is no other coordination.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, Stream};

use crate::create::{self, IfExists};
use crate::engine::{ConnectionLike, Engine, Session};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::schema::{SqlType, TableMetadata};
use crate::value::Value;
use crate::{delete, insert, select, update};

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| Error::Task(err.to_string()))?
}

/// Record operations available on both [`AsyncEngine`] and [`AsyncSession`].
///
/// On an engine every call commits on its own. On a session nothing is
/// committed until [`AsyncSession::commit`].
#[async_trait]
pub trait AsyncRecords: Send + Sync {
    /// Run `f` on the blocking pool against this handle.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(ConnectionLike<'c>) -> Result<T> + Send + 'static;

    async fn insert_records(&self, table: &str, records: Vec<Record>) -> Result<()> {
        let table = table.to_string();
        self.run(move |handle| insert::insert_records(&table, &records, handle))
            .await
    }

    async fn insert_from_table(&self, source: &str, destination: &str) -> Result<()> {
        let (source, destination) = (source.to_string(), destination.to_string());
        self.run(move |handle| insert::insert_from_table(&source, &destination, handle))
            .await
    }

    async fn delete_records(&self, table: &str, column: &str, values: Vec<Value>) -> Result<usize> {
        let (table, column) = (table.to_string(), column.to_string());
        self.run(move |handle| delete::delete_records(&table, &column, &values, handle))
            .await
    }

    async fn delete_records_by_values(&self, table: &str, records: Vec<Record>) -> Result<usize> {
        let table = table.to_string();
        self.run(move |handle| delete::delete_records_by_values(&table, &records, handle))
            .await
    }

    async fn delete_all_records(&self, table: &str) -> Result<usize> {
        let table = table.to_string();
        self.run(move |handle| delete::delete_all_records(&table, handle))
            .await
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<Record>,
        match_columns: Option<Vec<String>>,
    ) -> Result<usize> {
        let table = table.to_string();
        self.run(move |handle| {
            let columns: Option<Vec<&str>> = match_columns
                .as_ref()
                .map(|cols| cols.iter().map(String::as_str).collect());
            update::update_records(&table, &records, handle, columns.as_deref())
        })
        .await
    }

    async fn update_matching_records(
        &self,
        table: &str,
        records: Vec<Record>,
        match_columns: Vec<String>,
    ) -> Result<usize> {
        let table = table.to_string();
        self.run(move |handle| {
            let columns: Vec<&str> = match_columns.iter().map(String::as_str).collect();
            update::update_matching_records(&table, &records, &columns, handle)
        })
        .await
    }

    async fn set_column_values(&self, table: &str, column: &str, value: Value) -> Result<usize> {
        let (table, column) = (table.to_string(), column.to_string());
        self.run(move |handle| update::set_column_values(&table, &column, value, handle))
            .await
    }

    async fn select_records_all(&self, table: &str) -> Result<Vec<Record>> {
        let table = table.to_string();
        self.run(move |handle| select::select_records_all(&table, handle, None))
            .await
    }

    async fn select_record_by_primary_key(&self, table: &str, key: Record) -> Result<Option<Record>> {
        let table = table.to_string();
        self.run(move |handle| select::select_record_by_primary_key(&table, &key, handle, None))
            .await
    }
}

#[derive(Debug, Clone)]
pub struct AsyncEngine {
    engine: Engine,
}

impl AsyncEngine {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Open an engine from a URL without blocking the runtime.
    pub async fn connect(url: &str) -> Result<Self> {
        let url = url.to_string();
        let engine = run_blocking(move || Engine::from_url(&url)).await?;
        Ok(Self::new(engine))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn session(&self) -> Result<AsyncSession> {
        let engine = self.engine.clone();
        let session = run_blocking(move || engine.session()).await?;
        Ok(AsyncSession {
            session: Arc::new(Mutex::new(Some(session))),
        })
    }

    pub async fn create_table(
        &self,
        table_name: &str,
        columns: Vec<(String, SqlType)>,
        primary_key: Vec<String>,
        autoincrement: bool,
        if_exists: IfExists,
    ) -> Result<TableMetadata> {
        let table_name = table_name.to_string();
        self.run(move |handle| {
            let columns: Vec<(&str, SqlType)> = columns
                .iter()
                .map(|(name, sql_type)| (name.as_str(), sql_type.clone()))
                .collect();
            let pk: Vec<&str> = primary_key.iter().map(String::as_str).collect();
            create::create_table(&table_name, &columns, &pk, handle, None, autoincrement, if_exists)
        })
        .await
    }

    pub async fn drop_table(&self, table_name: &str, if_exists: bool) -> Result<()> {
        let table_name = table_name.to_string();
        self.run(move |handle| create::drop_table(table_name.as_str(), handle, if_exists, None))
            .await
    }

    /// Stream the table in batches of `chunksize`, ordered by primary key.
    /// Each batch is read with its own blocking call.
    pub fn select_records_chunks(
        &self,
        table: &str,
        chunksize: usize,
    ) -> impl Stream<Item = Result<Vec<Record>>> + Send + 'static {
        let engine = self.engine.clone();
        let table = table.to_string();
        let chunksize = chunksize.max(1);
        stream::try_unfold(Some(0i64), move |offset| {
            let engine = engine.clone();
            let table = table.clone();
            async move {
                let Some(offset) = offset else {
                    return Ok(None);
                };
                let stop = offset + chunksize as i64;
                let batch = run_blocking(move || {
                    select::select_records_slice(table.as_str(), Some(offset), Some(stop), &engine, None)
                })
                .await?;
                if batch.is_empty() {
                    return Ok(None);
                }
                let next = (batch.len() == chunksize).then_some(stop);
                Ok::<_, Error>(Some((batch, next)))
            }
        })
    }
}

#[async_trait]
impl AsyncRecords for AsyncEngine {
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(ConnectionLike<'c>) -> Result<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        run_blocking(move || f(ConnectionLike::Engine(&engine))).await
    }
}

/// An explicit transaction driven from async code. Dropping it without
/// committing rolls back.
#[derive(Debug, Clone)]
pub struct AsyncSession {
    session: Arc<Mutex<Option<Session>>>,
}

impl AsyncSession {
    fn take(&self) -> Result<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(finished)
    }

    pub async fn commit(&self) -> Result<()> {
        let session = self.take()?;
        run_blocking(move || session.commit()).await
    }

    pub async fn rollback(&self) -> Result<()> {
        let session = self.take()?;
        run_blocking(move || session.rollback()).await
    }
}

fn finished() -> Error {
    Error::InvalidReference("session already committed or rolled back".to_string())
}

#[async_trait]
impl AsyncRecords for AsyncSession {
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(ConnectionLike<'c>) -> Result<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        run_blocking(move || {
            let guard = session.lock().unwrap_or_else(PoisonError::into_inner);
            let session = guard.as_ref().ok_or_else(finished)?;
            f(ConnectionLike::Session(session))
        })
        .await
    }
}
