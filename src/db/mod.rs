//! Database access layer.
//!
//! This module provides the facade and its collaborators:
//! - Provider resolution and engine classification
//! - Command adaptation (parameter markers, dialect tokens, GUIDs)
//! - Connections, transactions and per-call connection leases
//! - The [`Database`] facade and its result types
//! - The built-in sqlx driver and its type mappings

pub mod adapter;
pub mod connection;
pub mod database;
pub mod driver;
pub mod lifecycle;
#[macro_use]
pub mod macros;
pub mod provider;
pub mod reader;
pub mod scalar;
pub mod sqlx_driver;
pub mod table;
pub mod types;

pub use adapter::{CommandAdapter, replace_sql_tokens};
pub use connection::{Connection, ConnectionHandle, Transaction, TransactionRef};
pub use database::Database;
pub use driver::{
    AdaptedCommand, BoundArg, ColumnInfo, DriverConnection, DriverError, DriverFactory,
    DriverResult, RowSet, RowShape,
};
pub use lifecycle::{ConnectionLease, ConnectionLifecycleManager, ConnectionPlan};
pub use macros::Backend;
pub use provider::{ProviderRegistry, classify_engine, supports_guid};
pub use reader::{DataReader, Records, RowSource};
pub use scalar::FromScalar;
pub use sqlx_driver::SqlxFactory;
pub use table::{DataRow, DataTable};
