//! Synchronous facade.
//!
//! [`Database`] wraps the async [`crate::Database`] with an owned
//! current-thread tokio runtime and blocks on every operation. It must not be
//! used from inside another async runtime.

use crate::config::{ConnectionStore, DatabaseOptions};
use crate::db::connection::{ConnectionHandle, Transaction};
use crate::db::reader::DataReader;
use crate::db::scalar::FromScalar;
use crate::db::table::DataTable;
use crate::error::{DbError, DbResult};
use crate::models::{Command, ConnectionDescriptor, DbValue, Parameter};
use crate::orm::record::Record;
use crate::orm::select::{PagedList, SelectQuery};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// Blocking counterpart of [`crate::Database`].
#[derive(Debug)]
pub struct Database {
    inner: crate::Database,
    runtime: Runtime,
}

impl Database {
    pub fn new(provider: &str, connection_string: &str) -> DbResult<Self> {
        Self::wrap(crate::Database::new(provider, connection_string)?)
    }

    pub fn from_url(connection_string: &str) -> DbResult<Self> {
        Self::wrap(crate::Database::from_url(connection_string)?)
    }

    pub fn with_options(descriptor: ConnectionDescriptor, options: DatabaseOptions) -> DbResult<Self> {
        Self::wrap(crate::Database::with_options(descriptor, options)?)
    }

    pub fn from_store(store: &ConnectionStore, name: &str) -> DbResult<Self> {
        Self::wrap(crate::Database::from_store(store, name)?)
    }

    /// Wrap an existing async database.
    pub fn wrap(inner: crate::Database) -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))?;
        Ok(Self { inner, runtime })
    }

    /// The wrapped async database.
    pub fn inner(&self) -> &crate::Database {
        &self.inner
    }

    /// Block on any future, such as a fluent query built from [`Self::select`].
    pub fn run<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn create_connection(&self, use_default: bool) -> ConnectionHandle {
        self.inner.create_connection(use_default)
    }

    pub fn open_connection(&self) -> DbResult<ConnectionHandle> {
        self.run(self.inner.open_connection())
    }

    pub fn open(&self, connection: &ConnectionHandle) -> DbResult<()> {
        self.run(connection.open())
    }

    pub fn close(&self, connection: &ConnectionHandle) -> DbResult<()> {
        self.run(connection.close())
    }

    pub fn close_default_connection(&self) -> DbResult<()> {
        self.run(self.inner.close_default_connection())
    }

    pub fn create_command(&self, text: &str, use_default: bool) -> Command {
        self.inner.create_command(text, use_default)
    }

    pub fn create_command_with_timeout(
        &self,
        text: &str,
        timeout: Duration,
        use_default: bool,
    ) -> Command {
        self.inner.create_command_with_timeout(text, timeout, use_default)
    }

    pub fn stored_procedure_command(&self, name: &str) -> Command {
        self.inner.stored_procedure_command(name)
    }

    pub fn create_parameter(&self, name: &str) -> Parameter {
        self.inner.create_parameter(name)
    }

    pub fn begin_transaction(&self, connection: &ConnectionHandle) -> DbResult<Transaction> {
        self.run(self.inner.begin_transaction(connection))
    }

    pub fn commit(&self, transaction: Transaction) -> DbResult<()> {
        self.run(transaction.commit())
    }

    pub fn rollback(&self, transaction: Transaction) -> DbResult<()> {
        self.run(transaction.rollback())
    }

    pub fn execute_non_query(&self, command: &Command) -> DbResult<u64> {
        self.run(self.inner.execute_non_query(command))
    }

    pub fn execute_scalar(&self, command: &Command) -> DbResult<DbValue> {
        self.run(self.inner.execute_scalar(command))
    }

    pub fn execute_scalar_as<T: FromScalar>(&self, command: &Command) -> DbResult<T> {
        self.run(self.inner.execute_scalar_as(command))
    }

    /// Execute a query and return a reader that closes itself on drop.
    pub fn execute_reader(&self, command: &Command) -> DbResult<Reader<'_>> {
        let reader = self.run(self.inner.execute_reader(command))?;
        Ok(Reader {
            reader: Some(reader),
            runtime: &self.runtime,
        })
    }

    pub fn with_reader<R, F>(&self, command: &Command, f: F) -> DbResult<R>
    where
        F: FnOnce(&mut DataReader) -> DbResult<R>,
    {
        self.run(self.inner.with_reader(command, f))
    }

    pub fn fill_table(&self, command: &Command) -> DbResult<DataTable> {
        self.run(self.inner.fill_table(command))
    }

    pub fn query<T: Record>(&self, command: &Command) -> DbResult<Vec<T>> {
        self.run(self.inner.query(command))
    }

    pub fn query_paged<T: Record>(
        &self,
        command: &Command,
        skip: usize,
        take: usize,
    ) -> DbResult<Vec<T>> {
        self.run(self.inner.query_paged(command, skip, take))
    }

    pub fn select(&self, columns: &str) -> SelectQuery<'_> {
        self.inner.select(columns)
    }

    pub fn to_list<T: Record>(&self, query: &SelectQuery<'_>) -> DbResult<Vec<T>> {
        self.run(query.to_list())
    }

    pub fn to_paged_list<T: Record>(
        &self,
        query: &SelectQuery<'_>,
        skip: usize,
        take: usize,
    ) -> DbResult<PagedList<T>> {
        self.run(query.to_paged_list(skip, take))
    }
}

/// A [`DataReader`] closed on the blocking runtime when dropped.
pub struct Reader<'db> {
    reader: Option<DataReader>,
    runtime: &'db Runtime,
}

impl Reader<'_> {
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.runtime.block_on(reader.close());
        }
    }
}

impl Deref for Reader<'_> {
    type Target = DataReader;

    fn deref(&self) -> &DataReader {
        // Only `finish` empties the slot, and it consumes or drops the reader
        match &self.reader {
            Some(reader) => reader,
            None => unreachable!("reader used after close"),
        }
    }
}

impl DerefMut for Reader<'_> {
    fn deref_mut(&mut self) -> &mut DataReader {
        match &mut self.reader {
            Some(reader) => reader,
            None => unreachable!("reader used after close"),
        }
    }
}

impl Drop for Reader<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
