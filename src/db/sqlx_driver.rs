//! Built-in driver backed by sqlx.
//!
//! # Architecture
//!
//! `SqlxFactory` opens one physical sqlx connection per facade connection.
//! Statement execution is organized in backend submodules:
//! - `mysql`: MySQL statements, `?` placeholders
//! - `postgres`: PostgreSQL statements, `$n` placeholders
//! - `sqlite`: SQLite statements, `?` placeholders
//!
//! Each submodule provides identical functionality adapted to the backend's
//! type system. Command timeouts are enforced here with `tokio::time::timeout`.

use crate::db::driver::{
    AdaptedCommand, BoundArg, DriverConnection, DriverError, DriverFactory, DriverResult, RowSet,
};
use crate::db::macros::Backend;
use crate::db::types;
use crate::models::{CommandKind, DbType, DbValue, DriverFamily, ParameterDirection};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::Connection as _;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::sqlite::SqliteConnection;
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

// =============================================================================
// Factory
// =============================================================================

/// Driver factory for one sqlx backend.
#[derive(Debug, Clone, Copy)]
pub struct SqlxFactory {
    backend: Backend,
}

impl SqlxFactory {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn sqlite() -> Self {
        Self::new(Backend::SQLite)
    }

    pub fn postgres() -> Self {
        Self::new(Backend::Postgres)
    }

    pub fn mysql() -> Self {
        Self::new(Backend::MySql)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

#[async_trait]
impl DriverFactory for SqlxFactory {
    fn type_name(&self) -> &str {
        match self.backend {
            Backend::MySql => "sqlx::mysql::MySqlConnection",
            Backend::Postgres => "sqlx::postgres::PgConnection",
            Backend::SQLite => "sqlx::sqlite::SqliteConnection",
        }
    }

    fn family(&self) -> DriverFamily {
        match self.backend {
            Backend::Postgres => DriverFamily::Numbered,
            Backend::MySql | Backend::SQLite => DriverFamily::Positional,
        }
    }

    async fn connect(&self, connection_string: &str) -> DriverResult<Box<dyn DriverConnection>> {
        let conn = match self.backend {
            Backend::MySql => SqlxConnection::MySql(MySqlConnection::connect(connection_string).await?),
            Backend::Postgres => {
                SqlxConnection::Postgres(PgConnection::connect(connection_string).await?)
            }
            Backend::SQLite => {
                SqlxConnection::SQLite(SqliteConnection::connect(connection_string).await?)
            }
        };
        debug!(backend = %self.backend, "Physical connection established");
        Ok(Box::new(SqlxDriverConnection {
            backend: self.backend,
            conn: Some(conn),
        }))
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A physical sqlx connection.
pub enum SqlxConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

/// `DriverConnection` over a single sqlx connection.
pub struct SqlxDriverConnection {
    backend: Backend,
    conn: Option<SqlxConnection>,
}

impl SqlxDriverConnection {
    fn connection(&mut self) -> DriverResult<&mut SqlxConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DriverError::message("Connection is closed"))
    }

    async fn run_raw(&mut self, sql: &'static str) -> DriverResult<()> {
        dispatch_connection!(self.connection()?, {
            MySql(c) => mysql::execute_raw(c, sql).await,
            Postgres(c) => postgres::execute_raw(c, sql).await,
            SQLite(c) => sqlite::execute_raw(c, sql).await,
        })
    }
}

#[async_trait]
impl DriverConnection for SqlxDriverConnection {
    async fn execute(&mut self, command: &AdaptedCommand) -> DriverResult<u64> {
        let sql = render_sql(command, self.backend)?;
        dispatch_connection!(self.connection()?, {
            MySql(c) => mysql::execute(c, &sql, &command.args, command.timeout).await,
            Postgres(c) => postgres::execute(c, &sql, &command.args, command.timeout).await,
            SQLite(c) => sqlite::execute(c, &sql, &command.args, command.timeout).await,
        })
    }

    async fn query(&mut self, command: &AdaptedCommand) -> DriverResult<RowSet> {
        let sql = render_sql(command, self.backend)?;
        dispatch_connection!(self.connection()?, {
            MySql(c) => mysql::fetch(c, &sql, &command.args, command.timeout).await,
            Postgres(c) => postgres::fetch(c, &sql, &command.args, command.timeout).await,
            SQLite(c) => sqlite::fetch(c, &sql, &command.args, command.timeout).await,
        })
    }

    async fn begin(&mut self) -> DriverResult<()> {
        let sql = match self.backend {
            Backend::MySql => "START TRANSACTION",
            Backend::Postgres | Backend::SQLite => "BEGIN",
        };
        self.run_raw(sql).await
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.run_raw("COMMIT").await
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.run_raw("ROLLBACK").await
    }

    async fn close(&mut self) -> DriverResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        dispatch_connection!(conn, {
            MySql(c) => c.close().await?,
            Postgres(c) => c.close().await?,
            SQLite(c) => c.close().await?,
        });
        Ok(())
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Final SQL for a command. Stored procedures are rendered as `CALL`.
fn render_sql(command: &AdaptedCommand, backend: Backend) -> DriverResult<Cow<'_, str>> {
    match command.kind {
        CommandKind::Text => Ok(Cow::Borrowed(command.text.as_str())),
        CommandKind::StoredProcedure => {
            let placeholders: Vec<String> = (1..=command.args.len())
                .map(|i| match backend {
                    Backend::Postgres => format!("${}", i),
                    _ => "?".to_string(),
                })
                .collect();
            match backend {
                Backend::SQLite => Err(DriverError::unsupported(
                    "SQLite does not support stored procedures",
                )),
                _ => Ok(Cow::Owned(format!(
                    "CALL {}({})",
                    command.text,
                    placeholders.join(", ")
                ))),
            }
        }
    }
}

/// Values actually sent to the server. Output-only parameters bind null.
fn bind_value(arg: &BoundArg) -> &DbValue {
    static NULL: DbValue = DbValue::Null;
    match arg.direction {
        ParameterDirection::Output | ParameterDirection::ReturnValue => &NULL,
        ParameterDirection::Input | ParameterDirection::InputOutput => &arg.value,
    }
}

async fn with_timeout<F, T>(limit: Option<Duration>, operation: &str, fut: F) -> DriverResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match limit {
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result.map_err(DriverError::from),
            Err(_) => Err(DriverError::timeout(operation, limit.as_secs())),
        },
        None => fut.await.map_err(DriverError::from),
    }
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its backend.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use sqlx::Executor;
    use sqlx::mysql::{MySqlArguments, MySqlRow};

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        args: &[BoundArg],
        limit: Option<Duration>,
    ) -> DriverResult<u64> {
        // Without parameters, run raw SQL so statements that cannot be
        // prepared (e.g. CREATE PROCEDURE) still work
        let result = if args.is_empty() {
            with_timeout(limit, "command execution", conn.execute(sql)).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_arg(query, arg);
            }
            with_timeout(limit, "command execution", query.execute(&mut *conn)).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch(
        conn: &mut MySqlConnection,
        sql: &str,
        args: &[BoundArg],
        limit: Option<Duration>,
    ) -> DriverResult<RowSet> {
        let rows: Vec<MySqlRow> = if args.is_empty() {
            with_timeout(limit, "query execution", conn.fetch(sql).try_collect()).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_arg(query, arg);
            }
            with_timeout(
                limit,
                "query execution",
                query.fetch(&mut *conn).try_collect(),
            )
            .await?
        };
        types::mysql_row_set(&rows)
    }

    pub async fn execute_raw(conn: &mut MySqlConnection, sql: &'static str) -> DriverResult<()> {
        conn.execute(sql).await?;
        Ok(())
    }

    fn bind_arg<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>,
        arg: &'q BoundArg,
    ) -> sqlx::query::Query<'q, sqlx::MySql, MySqlArguments> {
        match bind_value(arg) {
            DbValue::Null => match arg.db_type {
                DbType::Boolean => query.bind(None::<bool>),
                DbType::Byte | DbType::Int16 => query.bind(None::<i16>),
                DbType::Int32 => query.bind(None::<i32>),
                DbType::Int64 => query.bind(None::<i64>),
                DbType::Single => query.bind(None::<f32>),
                DbType::Double => query.bind(None::<f64>),
                DbType::Decimal => query.bind(None::<rust_decimal::Decimal>),
                DbType::Date | DbType::DateTime => query.bind(None::<chrono::NaiveDateTime>),
                DbType::Guid | DbType::Binary => query.bind(None::<Vec<u8>>),
                _ => query.bind(None::<String>),
            },
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Byte(v) => query.bind(*v),
            DbValue::Int16(v) => query.bind(*v),
            DbValue::Int32(v) => query.bind(*v),
            DbValue::Int64(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::Double(v) => query.bind(*v),
            DbValue::Decimal(v) => query.bind(*v),
            DbValue::Text(v) => query.bind(v.as_str()),
            DbValue::DateTime(v) => query.bind(*v),
            // MySQL has no UUID type, store as BINARY(16)
            DbValue::Guid(v) => query.bind(v.as_bytes().as_slice()),
            DbValue::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::Executor;
    use sqlx::postgres::{PgArguments, PgRow};

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        args: &[BoundArg],
        limit: Option<Duration>,
    ) -> DriverResult<u64> {
        let result = if args.is_empty() {
            with_timeout(limit, "command execution", conn.execute(sql)).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_arg(query, arg);
            }
            with_timeout(limit, "command execution", query.execute(&mut *conn)).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch(
        conn: &mut PgConnection,
        sql: &str,
        args: &[BoundArg],
        limit: Option<Duration>,
    ) -> DriverResult<RowSet> {
        let rows: Vec<PgRow> = if args.is_empty() {
            with_timeout(limit, "query execution", conn.fetch(sql).try_collect()).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_arg(query, arg);
            }
            with_timeout(
                limit,
                "query execution",
                query.fetch(&mut *conn).try_collect(),
            )
            .await?
        };
        types::postgres_row_set(&rows)
    }

    pub async fn execute_raw(conn: &mut PgConnection, sql: &'static str) -> DriverResult<()> {
        conn.execute(sql).await?;
        Ok(())
    }

    fn bind_arg<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        arg: &'q BoundArg,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match bind_value(arg) {
            DbValue::Null => match arg.db_type {
                DbType::Boolean => query.bind(None::<bool>),
                DbType::Byte | DbType::Int16 => query.bind(None::<i16>),
                DbType::Int32 => query.bind(None::<i32>),
                DbType::Int64 => query.bind(None::<i64>),
                DbType::Single => query.bind(None::<f32>),
                DbType::Double => query.bind(None::<f64>),
                DbType::Decimal => query.bind(None::<rust_decimal::Decimal>),
                DbType::Date | DbType::DateTime => query.bind(None::<chrono::NaiveDateTime>),
                DbType::Guid => query.bind(None::<uuid::Uuid>),
                DbType::Binary => query.bind(None::<Vec<u8>>),
                _ => query.bind(None::<String>),
            },
            DbValue::Bool(v) => query.bind(*v),
            // PostgreSQL has no unsigned byte type
            DbValue::Byte(v) => query.bind(i16::from(*v)),
            DbValue::Int16(v) => query.bind(*v),
            DbValue::Int32(v) => query.bind(*v),
            DbValue::Int64(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::Double(v) => query.bind(*v),
            DbValue::Decimal(v) => query.bind(*v),
            DbValue::Text(v) => query.bind(v.as_str()),
            DbValue::DateTime(v) => query.bind(*v),
            DbValue::Guid(v) => query.bind(*v),
            DbValue::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::Executor;
    use sqlx::sqlite::{SqliteArguments, SqliteRow};

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        args: &[BoundArg],
        limit: Option<Duration>,
    ) -> DriverResult<u64> {
        let result = if args.is_empty() {
            with_timeout(limit, "command execution", conn.execute(sql)).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_arg(query, arg);
            }
            with_timeout(limit, "command execution", query.execute(&mut *conn)).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch(
        conn: &mut SqliteConnection,
        sql: &str,
        args: &[BoundArg],
        limit: Option<Duration>,
    ) -> DriverResult<RowSet> {
        let rows: Vec<SqliteRow> = if args.is_empty() {
            with_timeout(limit, "query execution", conn.fetch(sql).try_collect()).await?
        } else {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = bind_arg(query, arg);
            }
            with_timeout(
                limit,
                "query execution",
                query.fetch(&mut *conn).try_collect(),
            )
            .await?
        };
        types::sqlite_row_set(&rows)
    }

    pub async fn execute_raw(conn: &mut SqliteConnection, sql: &'static str) -> DriverResult<()> {
        conn.execute(sql).await?;
        Ok(())
    }

    fn bind_arg<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        arg: &'q BoundArg,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
        match bind_value(arg) {
            DbValue::Null => match arg.db_type {
                DbType::Boolean => query.bind(None::<bool>),
                DbType::Byte | DbType::Int16 | DbType::Int32 | DbType::Int64 => {
                    query.bind(None::<i64>)
                }
                DbType::Single | DbType::Double => query.bind(None::<f64>),
                DbType::Guid | DbType::Binary => query.bind(None::<Vec<u8>>),
                _ => query.bind(None::<String>),
            },
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Byte(v) => query.bind(i16::from(*v)),
            DbValue::Int16(v) => query.bind(*v),
            DbValue::Int32(v) => query.bind(*v),
            DbValue::Int64(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::Double(v) => query.bind(*v),
            // SQLite has no exact numeric storage, keep the text representation
            DbValue::Decimal(v) => query.bind(v.to_string()),
            DbValue::Text(v) => query.bind(v.as_str()),
            DbValue::DateTime(v) => query.bind(*v),
            DbValue::Guid(v) => query.bind(v.as_bytes().as_slice()),
            DbValue::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}
