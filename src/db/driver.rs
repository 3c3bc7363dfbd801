//! Driver boundary.
//!
//! The facade talks to databases only through [`DriverFactory`] and
//! [`DriverConnection`]. A factory creates connections for one provider and
//! declares the parameter marker convention its statements expect; a
//! connection runs already adapted statements and returns buffered rows.

use crate::models::{CommandKind, DbType, DbValue, DriverFamily, FieldType, ParameterDirection};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Failure reported by a driver. Wrapped by the facade before reaching callers.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    #[error("{message}")]
    Message { message: String },
}

impl DriverError {
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// SQLSTATE or vendor error code, when the database reported one.
    pub fn sql_state(&self) -> Option<String> {
        match self {
            Self::Sqlx(sqlx::Error::Database(db_err)) => db_err.code().map(|c| c.to_string()),
            _ => None,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

// =============================================================================
// Statements
// =============================================================================

/// A parameter value in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArg {
    /// Bare parameter name, without marker prefix
    pub name: String,
    pub value: DbValue,
    pub db_type: DbType,
    pub direction: ParameterDirection,
}

/// A command after dialect adaptation, ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptedCommand {
    pub text: String,
    pub kind: CommandKind,
    pub args: Vec<BoundArg>,
    pub timeout: Option<Duration>,
}

// =============================================================================
// Result Shapes
// =============================================================================

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnInfo {
    pub name: String,
    pub field_type: FieldType,
    /// Type name as reported by the database, e.g. `SMALLINT`
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            type_name: type_name.into(),
        }
    }
}

/// Ordered column list of a result set.
///
/// Two shapes are equal when every column has the same name, field type and
/// declared type name, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RowShape {
    columns: Vec<ColumnInfo>,
}

impl RowShape {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, ordinal: usize) -> Option<&ColumnInfo> {
        self.columns.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Case-insensitive ordinal lookup.
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Buffered result of a query.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub shape: Arc<RowShape>,
    pub rows: Vec<Vec<DbValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<DbValue>>) -> Self {
        Self {
            shape: Arc::new(RowShape::new(columns)),
            rows,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// First column of the first row, or null.
    pub fn first_value(&self) -> DbValue {
        self.rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(DbValue::Null)
    }
}

// =============================================================================
// Driver Traits
// =============================================================================

/// Creates connections for one provider.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Implementation type name, used for engine classification.
    fn type_name(&self) -> &str;

    /// Parameter marker convention expected by statements.
    fn family(&self) -> DriverFamily;

    /// Open a new physical connection.
    async fn connect(&self, connection_string: &str) -> DriverResult<Box<dyn DriverConnection>>;
}

/// An open physical connection.
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement and return the affected row count.
    async fn execute(&mut self, command: &AdaptedCommand) -> DriverResult<u64>;

    /// Run a statement and buffer every returned row.
    async fn query(&mut self, command: &AdaptedCommand) -> DriverResult<RowSet>;

    async fn begin(&mut self) -> DriverResult<()>;

    async fn commit(&mut self) -> DriverResult<()>;

    async fn rollback(&mut self) -> DriverResult<()>;

    /// Close the connection. Further calls fail.
    async fn close(&mut self) -> DriverResult<()>;
}
