//! db-facade library
//!
//! A cross-provider data-access facade over SQLite, PostgreSQL and MySQL.
//! Commands are written once with `@name` markers and adapted to each
//! driver's conventions; results map onto plain record structs.

pub mod blocking;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod orm;

pub use config::{Config, ConnectionStore, DatabaseOptions};
pub use db::{ConnectionHandle, DataReader, DataTable, Database, Transaction};
pub use error::{DbError, DbResult};
pub use models::{Command, DbValue, Parameter};
pub use orm::{PagedList, Record};
