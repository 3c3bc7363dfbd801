//! Backend dispatch macros for the sqlx driver.
//!
//! The sqlx driver keeps one connection enum with a variant per backend. These
//! macros generate the repetitive match arms while keeping each arm readable.

/// Database backend served by the built-in sqlx driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    MySql,
    Postgres,
    SQLite,
}

impl Backend {
    /// Provider identifier registered for this backend.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::SQLite => "sqlite",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Macro for generating backend dispatch match arms over `SqlxConnection`.
///
/// # Example
///
/// ```ignore
/// dispatch_connection!(conn, {
///     MySql(c) => mysql::execute(c, command).await,
///     Postgres(c) => postgres::execute(c, command).await,
///     SQLite(c) => sqlite::execute(c, command).await,
/// });
/// ```
#[macro_export]
macro_rules! dispatch_connection {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::sqlx_driver::SqlxConnection::$variant($c) => $body,
            )+
        }
    };
}

pub use dispatch_connection;
