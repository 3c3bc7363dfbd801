//! Shared test helpers.
//!
//! `MockFactory` is an in-memory driver that records every statement it is
//! asked to run and counts the physical connections it hands out, so tests
//! can check what the facade sent and which connections it left open.

#![allow(dead_code)]

use async_trait::async_trait;
use db_facade::Database;
use db_facade::config::DatabaseOptions;
use db_facade::db::{
    AdaptedCommand, DriverConnection, DriverError, DriverFactory, DriverResult, ProviderRegistry,
    RowSet,
};
use db_facade::models::{ConnectionDescriptor, DriverFamily};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Counters and recordings shared by a factory and its connections.
#[derive(Default)]
pub struct MockStats {
    pub opened: AtomicUsize,
    pub dropped: AtomicUsize,
    pub begun: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
    pub fail_commands: AtomicBool,
    pub fail_connect: AtomicBool,
    pub commands: Mutex<Vec<AdaptedCommand>>,
    pub result: Mutex<RowSet>,
}

impl MockStats {
    /// Physical connections currently alive.
    pub fn live(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.dropped.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_command(&self) -> Option<AdaptedCommand> {
        self.commands.lock().unwrap().last().cloned()
    }

    pub fn set_result(&self, rows: RowSet) {
        *self.result.lock().unwrap() = rows;
    }
}

pub struct MockFactory {
    type_name: String,
    family: DriverFamily,
    pub stats: Arc<MockStats>,
}

impl MockFactory {
    pub fn new(type_name: &str, family: DriverFamily) -> Self {
        Self {
            type_name: type_name.to_string(),
            family,
            stats: Arc::new(MockStats::default()),
        }
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn family(&self) -> DriverFamily {
        self.family
    }

    async fn connect(&self, _connection_string: &str) -> DriverResult<Box<dyn DriverConnection>> {
        if self.stats.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::message("login failed"));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            stats: Arc::clone(&self.stats),
        }))
    }
}

pub struct MockConnection {
    stats: Arc<MockStats>,
}

impl MockConnection {
    fn record(&self, command: &AdaptedCommand) -> DriverResult<()> {
        self.stats.commands.lock().unwrap().push(command.clone());
        if self.stats.fail_commands.load(Ordering::SeqCst) {
            return Err(DriverError::message("syntax error near FROM"));
        }
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn execute(&mut self, command: &AdaptedCommand) -> DriverResult<u64> {
        self.record(command)?;
        Ok(1)
    }

    async fn query(&mut self, command: &AdaptedCommand) -> DriverResult<RowSet> {
        self.record(command)?;
        Ok(self.stats.result.lock().unwrap().clone())
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.stats.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.stats.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.stats.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.stats.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// A database backed by a mock driver registered as provider "mock".
pub fn mock_database(
    type_name: &str,
    family: DriverFamily,
    connection_string: &str,
) -> (Database, Arc<MockStats>) {
    let factory = MockFactory::new(type_name, family);
    let stats = Arc::clone(&factory.stats);
    let mut registry = ProviderRegistry::new();
    registry.register("mock", factory);
    let descriptor = ConnectionDescriptor::new("mock", connection_string).unwrap();
    let db = Database::with_registry(&registry, descriptor, DatabaseOptions::default()).unwrap();
    (db, stats)
}

/// A SQLite database in a temp file that outlives the test.
pub fn sqlite_database() -> (Database, String) {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let url = format!("sqlite:{}?mode=rwc", db_path);
    (Database::new("sqlite", &url).unwrap(), db_path)
}
