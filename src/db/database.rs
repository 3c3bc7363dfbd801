//! The data-access facade.
//!
//! [`Database`] ties a connection descriptor to a resolved driver factory and
//! runs commands through the same pipeline for every operation:
//!
//! 1. adapt the command to the driver's marker convention and the engine's
//!    dialect,
//! 2. acquire a connection lease,
//! 3. execute, with the command timeout applied by the driver,
//! 4. release the lease, restoring the connection state the call found.
//!
//! Driver failures are wrapped with the provider, connection string and the
//! adapted command text.

use crate::config::{ConnectionStore, DatabaseOptions};
use crate::db::adapter::CommandAdapter;
use crate::db::connection::{ConnectionHandle, Transaction};
use crate::db::driver::{AdaptedCommand, DriverError, DriverFactory, DriverResult, RowSet};
use crate::db::lifecycle::{ConnectionLease, ConnectionLifecycleManager};
use crate::db::provider::ProviderRegistry;
use crate::db::reader::DataReader;
use crate::db::scalar::FromScalar;
use crate::db::table::DataTable;
use crate::error::{DbError, DbResult};
use crate::models::{
    Command, ConnectionDescriptor, DbValue, DriverFamily, EngineKind, Parameter,
};
use crate::orm::mapper::BindingCache;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

const NON_QUERY_FAILED: &str = "Could not execute non-query command.";
const SCALAR_FAILED: &str = "Could not execute the ExecuteScalar command.";
const READER_FAILED: &str = "Could not execute the ExecuteReader command.";

/// Database access for one connection descriptor.
pub struct Database {
    descriptor: Arc<ConnectionDescriptor>,
    factory: Arc<dyn DriverFactory>,
    engine: EngineKind,
    adapter: CommandAdapter,
    lifecycle: ConnectionLifecycleManager,
    options: DatabaseOptions,
    default_connection: OnceLock<ConnectionHandle>,
    bindings: BindingCache,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("provider", &self.descriptor.provider())
            .field("factory", &self.factory.type_name())
            .field("engine", &self.engine)
            .field("family", &self.adapter.family())
            .field("options", &self.options)
            .finish()
    }
}

impl Database {
    /// Create a database for a provider identifier and connection string,
    /// resolved against the built-in drivers.
    pub fn new(provider: &str, connection_string: &str) -> DbResult<Self> {
        let descriptor = ConnectionDescriptor::new(provider, connection_string)?;
        Self::with_options(descriptor, DatabaseOptions::default())
    }

    /// Create a database whose provider is inferred from the URL scheme.
    pub fn from_url(connection_string: &str) -> DbResult<Self> {
        let descriptor = ConnectionDescriptor::from_url(connection_string)?;
        Self::with_options(descriptor, DatabaseOptions::default())
    }

    pub fn with_options(descriptor: ConnectionDescriptor, options: DatabaseOptions) -> DbResult<Self> {
        Self::with_registry(&ProviderRegistry::with_defaults(), descriptor, options)
    }

    /// Create a database resolving the provider against `registry`.
    pub fn with_registry(
        registry: &ProviderRegistry,
        descriptor: ConnectionDescriptor,
        options: DatabaseOptions,
    ) -> DbResult<Self> {
        let (factory, engine) = registry.resolve_descriptor(&descriptor)?;
        let descriptor = Arc::new(descriptor);
        let adapter = CommandAdapter::new(engine, factory.family());
        let lifecycle = ConnectionLifecycleManager::new(
            Arc::clone(&descriptor),
            Arc::clone(&factory),
            options.connect_timeout,
        );

        debug!(
            provider = %descriptor.provider(),
            factory = %factory.type_name(),
            engine = %engine,
            "Database created"
        );

        Ok(Self {
            descriptor,
            factory,
            engine,
            adapter,
            lifecycle,
            options,
            default_connection: OnceLock::new(),
            bindings: BindingCache::new(),
        })
    }

    /// Create a database from a named entry of a connection store.
    pub fn from_store(store: &ConnectionStore, name: &str) -> DbResult<Self> {
        let descriptor = store.get(name).cloned().ok_or_else(|| {
            DbError::missing_connection_info(format!(
                "No connection named '{}' in the connection store",
                name
            ))
        })?;
        Self::with_options(descriptor, store.options())
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn family(&self) -> DriverFamily {
        self.adapter.family()
    }

    pub fn adapter(&self) -> &CommandAdapter {
        &self.adapter
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Column bindings cached per record type and result shape.
    pub fn binding_cache(&self) -> &BindingCache {
        &self.bindings
    }

    // =========================================================================
    // Connections and commands
    // =========================================================================

    /// Create a closed connection.
    ///
    /// With `use_default`, returns the default connection, creating it on
    /// first use. The default connection is never replaced.
    pub fn create_connection(&self, use_default: bool) -> ConnectionHandle {
        if use_default {
            self.default_connection
                .get_or_init(|| self.lifecycle.create_connection())
                .clone()
        } else {
            self.lifecycle.create_connection()
        }
    }

    /// Create a new connection and open it.
    pub async fn open_connection(&self) -> DbResult<ConnectionHandle> {
        let handle = self.lifecycle.create_connection();
        handle.open().await?;
        Ok(handle)
    }

    /// The default connection, if one was created.
    pub fn default_connection(&self) -> Option<ConnectionHandle> {
        self.default_connection.get().cloned()
    }

    /// Close the default connection without discarding it.
    pub async fn close_default_connection(&self) -> DbResult<()> {
        match self.default_connection.get() {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }

    /// Create a text command with the configured timeout.
    ///
    /// With `use_default`, the command is bound to the default connection.
    /// Otherwise every execution runs on a transient connection.
    pub fn create_command(&self, text: &str, use_default: bool) -> Command {
        self.create_command_with_timeout(text, self.options.command_timeout, use_default)
    }

    pub fn create_command_with_timeout(
        &self,
        text: &str,
        timeout: Duration,
        use_default: bool,
    ) -> Command {
        let command = Command::new(text).with_timeout(timeout);
        if use_default {
            command.with_connection(self.create_connection(true))
        } else {
            command
        }
    }

    pub fn stored_procedure_command(&self, name: &str) -> Command {
        Command::stored_procedure(name).with_timeout(self.options.command_timeout)
    }

    /// Create an input parameter with a null value.
    pub fn create_parameter(&self, name: &str) -> Parameter {
        Parameter::new(name, DbValue::Null)
    }

    /// Begin a transaction on an open connection.
    pub async fn begin_transaction(&self, connection: &ConnectionHandle) -> DbResult<Transaction> {
        Transaction::begin(connection).await
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a statement and return the affected row count.
    pub async fn execute_non_query(&self, command: &Command) -> DbResult<u64> {
        let adapted = self.prepare(command, "Executing non-query")?;
        let lease = self.lifecycle.acquire(command).await?;

        let result = {
            let mut conn = lease.handle().lock().await;
            match conn.driver_mut() {
                Ok(driver) => driver.execute(&adapted).await,
                Err(e) => Err(e),
            }
        };
        lease.release().await;

        result.map_err(|e| self.execution_error(NON_QUERY_FAILED, &adapted, e))
    }

    /// Execute a query and return the first column of the first row.
    ///
    /// No row yields `DbValue::Null`.
    pub async fn execute_scalar(&self, command: &Command) -> DbResult<DbValue> {
        let adapted = self.prepare(command, "Executing scalar")?;
        let lease = self.lifecycle.acquire(command).await?;
        let result = fetch(&lease, &adapted).await;
        lease.release().await;

        result
            .map(|rows| rows.first_value())
            .map_err(|e| self.execution_error(SCALAR_FAILED, &adapted, e))
    }

    /// Execute a query and convert its scalar to `T`.
    ///
    /// Null or no row yields `T::default()`.
    pub async fn execute_scalar_as<T: FromScalar>(&self, command: &Command) -> DbResult<T> {
        let value = self.execute_scalar(command).await?;
        T::from_scalar(value)
    }

    /// Execute a query and return a reader over its rows.
    ///
    /// The reader owns the connection lease: closing it closes a connection
    /// opened for this call.
    pub async fn execute_reader(&self, command: &Command) -> DbResult<DataReader> {
        let adapted = self.prepare(command, "Executing reader")?;
        let lease = self.lifecycle.acquire(command).await?;

        match fetch(&lease, &adapted).await {
            Ok(rows) => Ok(DataReader::with_lease(rows, Some(lease))),
            Err(e) => {
                lease.release().await;
                Err(self.execution_error(READER_FAILED, &adapted, e))
            }
        }
    }

    /// Run `f` over a reader and close it before returning, whatever `f`
    /// returned.
    pub async fn with_reader<R, F>(&self, command: &Command, f: F) -> DbResult<R>
    where
        F: FnOnce(&mut DataReader) -> DbResult<R>,
    {
        let mut reader = self.execute_reader(command).await?;
        let result = f(&mut reader);
        reader.close().await;
        result
    }

    /// Execute a query and buffer its result into a table.
    pub async fn fill_table(&self, command: &Command) -> DbResult<DataTable> {
        let adapted = self.prepare(command, "Filling table")?;
        let lease = self.lifecycle.acquire(command).await?;
        let result = fetch(&lease, &adapted).await;
        lease.release().await;

        result
            .map(DataTable::from_row_set)
            .map_err(|e| self.execution_error(READER_FAILED, &adapted, e))
    }

    fn prepare(&self, command: &Command, operation: &str) -> DbResult<AdaptedCommand> {
        let adapted = self.adapter.adapt(command)?;
        debug!(
            sql = %adapted.text,
            params = adapted.args.len(),
            timeout_secs = ?adapted.timeout.map(|t| t.as_secs()),
            "{}",
            operation
        );
        Ok(adapted)
    }

    fn execution_error(&self, message: &str, adapted: &AdaptedCommand, source: DriverError) -> DbError {
        DbError::command_execution(
            message,
            self.descriptor.provider(),
            self.descriptor.connection_string(),
            adapted.text.as_str(),
            source,
        )
    }
}

async fn fetch(lease: &ConnectionLease, adapted: &AdaptedCommand) -> DriverResult<RowSet> {
    let mut conn = lease.handle().lock().await;
    let driver = conn.driver_mut()?;
    driver.query(adapted).await
}
