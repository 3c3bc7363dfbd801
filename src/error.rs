//! Error types for the data access facade.
//!
//! All failures surfaced to callers are `DbError` values. Errors raised by a
//! driver are never returned directly: they are wrapped in
//! [`DbError::ConnectionOpen`] or [`DbError::CommandExecution`] together with
//! the provider, connection string and command text that produced them.
//!
//! Connection strings are carried as fields for diagnostics but never appear
//! in the `Display` output, so logging an error does not leak credentials.

use crate::db::driver::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Provider not recognized: {provider}")]
    UnrecognizedProvider { provider: String },

    #[error("Missing connection information: {message}")]
    MissingConnectionInfo { message: String },

    #[error("{message} (provider: {provider})")]
    ConnectionOpen {
        message: String,
        provider: String,
        /// Contains sensitive data - never log
        connection_string: String,
        suggestion: String,
        #[source]
        source: DriverError,
    },

    #[error("{message} (provider: {provider}, command: {command_text})")]
    CommandExecution {
        message: String,
        provider: String,
        /// Contains sensitive data - never log
        connection_string: String,
        command_text: String,
        #[source]
        source: DriverError,
    },

    #[error("Error setting property for {column}: {message}")]
    MappingConversion { column: String, message: String },

    #[error("Cannot convert scalar to {target}: {message}")]
    ScalarConversion { target: String, message: String },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Connection state error: {message}")]
    ConnectionState { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an unrecognized provider error.
    pub fn unrecognized_provider(provider: impl Into<String>) -> Self {
        Self::UnrecognizedProvider {
            provider: provider.into(),
        }
    }

    /// Create a missing connection information error.
    pub fn missing_connection_info(message: impl Into<String>) -> Self {
        Self::MissingConnectionInfo {
            message: message.into(),
        }
    }

    /// Wrap a driver failure raised while opening a connection.
    pub fn connection_open(
        provider: impl Into<String>,
        connection_string: impl Into<String>,
        suggestion: impl Into<String>,
        source: DriverError,
    ) -> Self {
        Self::ConnectionOpen {
            message: "The database connection could not be opened.".to_string(),
            provider: provider.into(),
            connection_string: connection_string.into(),
            suggestion: suggestion.into(),
            source,
        }
    }

    /// Wrap a driver failure raised while executing a command.
    pub fn command_execution(
        message: impl Into<String>,
        provider: impl Into<String>,
        connection_string: impl Into<String>,
        command_text: impl Into<String>,
        source: DriverError,
    ) -> Self {
        Self::CommandExecution {
            message: message.into(),
            provider: provider.into(),
            connection_string: connection_string.into(),
            command_text: command_text.into(),
            source,
        }
    }

    /// Create a mapping conversion error for one column.
    pub fn mapping_conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MappingConversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a scalar conversion error.
    pub fn scalar_conversion(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScalarConversion {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a connection state error.
    pub fn connection_state(message: impl Into<String>) -> Self {
        Self::ConnectionState {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectionOpen { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Command text attached to an execution failure.
    pub fn command_text(&self) -> Option<&str> {
        match self {
            Self::CommandExecution { command_text, .. } => Some(command_text),
            _ => None,
        }
    }

    /// Column that failed to map, for mapping failures.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::MappingConversion { column, .. } => Some(column),
            _ => None,
        }
    }

    /// The underlying driver error, when this wraps one.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::ConnectionOpen { source, .. } | Self::CommandExecution { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Check if this error was caused by a command or connect timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.driver_error(), Some(DriverError::Timeout { .. }))
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
