//! Command and parameter models.
//!
//! A `Command` is a per-call unit of work: text, parameters, an optional bound
//! connection or transaction, and a timeout. Commands are created by the
//! facade and owned by the caller.

use crate::config::DEFAULT_COMMAND_TIMEOUT_SECS;
use crate::db::connection::{ConnectionHandle, Transaction, TransactionRef};
use crate::models::value::{DbType, DbValue};
use std::time::Duration;
use uuid::Uuid;

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Plain SQL text
    #[default]
    Text,
    /// Command text is the name of a stored procedure
    StoredProcedure,
}

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether the parameter sends a value to the server.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
}

// =============================================================================
// Parameter
// =============================================================================

/// A command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name as declared. A leading `@` or `:` is optional.
    pub name: String,
    pub value: DbValue,
    pub direction: ParameterDirection,
    pub nullable: bool,
    pub db_type: DbType,
    pub size: Option<usize>,
    pub source_column: Option<String>,
}

impl Parameter {
    /// Create an input parameter. A null value is stored as `DbValue::Null`.
    pub fn new(name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            db_type: DbType::for_value(&value),
            value,
            direction: ParameterDirection::Input,
            nullable: false,
            size: None,
            source_column: None,
        }
    }

    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_source_column(mut self, column: impl Into<String>) -> Self {
        self.source_column = Some(column.into());
        self
    }

    /// Name without any marker prefix.
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches(['@', ':'])
    }

    /// Name in `@name` form.
    pub fn marker(&self) -> String {
        format!("@{}", self.bare_name())
    }

    /// Read the value as a GUID, accepting the 16-byte binary form.
    pub fn guid_value(&self) -> Option<Uuid> {
        match &self.value {
            DbValue::Guid(g) => Some(*g),
            DbValue::Bytes(b) if b.len() >= 16 => Uuid::from_slice(&b[..16]).ok(),
            DbValue::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A unit of work executed through the facade.
#[derive(Debug, Clone)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
    /// Connection the command runs on. `None` means a transient connection.
    pub connection: Option<ConnectionHandle>,
    pub transaction: Option<TransactionRef>,
    /// `Duration::ZERO` disables the timeout.
    pub timeout: Duration,
}

impl Default for Command {
    fn default() -> Self {
        Self::new("")
    }
}

impl Command {
    /// Create a text command with the default timeout.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
            connection: None,
            transaction: None,
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Create a stored procedure command.
    pub fn stored_procedure(name: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::StoredProcedure,
            ..Self::new(name)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionHandle) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Builder form of [`Command::add_parameter`].
    pub fn param(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.add_parameter(name, value);
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Effective timeout, `None` when disabled.
    pub fn effective_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// Add an input parameter and return it for further configuration.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<DbValue>,
    ) -> &mut Parameter {
        self.push_parameter(Parameter::new(name, value))
    }

    /// Add a parameter with an explicit direction.
    pub fn add_parameter_with_direction(
        &mut self,
        name: impl Into<String>,
        value: impl Into<DbValue>,
        direction: ParameterDirection,
    ) -> &mut Parameter {
        self.push_parameter(Parameter::new(name, value).with_direction(direction))
    }

    /// Add a fully configured parameter.
    pub fn push_parameter(&mut self, parameter: Parameter) -> &mut Parameter {
        self.parameters.push(parameter);
        let last = self.parameters.len() - 1;
        &mut self.parameters[last]
    }

    /// Add a GUID parameter. Engines without a GUID type receive 16 raw bytes.
    pub fn add_guid_parameter(&mut self, name: impl Into<String>, value: Option<Uuid>) {
        let parameter = Parameter::new(name, value)
            .with_db_type(DbType::Guid)
            .with_nullable(value.is_none());
        self.push_parameter(parameter);
    }

    /// Add a binary parameter.
    pub fn add_binary_parameter(
        &mut self,
        name: impl Into<String>,
        value: Option<Vec<u8>>,
        direction: ParameterDirection,
    ) {
        let nullable = value.is_none();
        let parameter = Parameter::new(name, value)
            .with_db_type(DbType::Binary)
            .with_direction(direction)
            .with_nullable(nullable);
        self.push_parameter(parameter);
    }

    /// Look up a parameter by name, ignoring marker prefixes and case.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        let wanted = name.trim_start_matches(['@', ':']);
        self.parameters
            .iter()
            .find(|p| p.bare_name().eq_ignore_ascii_case(wanted))
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        let wanted = name.trim_start_matches(['@', ':']);
        self.parameters
            .iter_mut()
            .find(|p| p.bare_name().eq_ignore_ascii_case(wanted))
    }

    /// GUID value of a named parameter, accepting the binary representation.
    pub fn guid_parameter_value(&self, name: &str) -> Option<Uuid> {
        self.parameter(name).and_then(Parameter::guid_value)
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    /// Bind the command to a transaction and to its connection.
    pub fn enlist_transaction(&mut self, transaction: &Transaction) {
        self.connection = Some(transaction.connection().clone());
        self.transaction = Some(transaction.reference());
    }
}
