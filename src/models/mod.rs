//! Data models for the data access facade.
//!
//! This module re-exports all model types used throughout the crate.

pub mod command;
pub mod connection;
pub mod value;

// Re-export commonly used types
pub use command::{Command, CommandKind, Parameter, ParameterDirection};
pub use connection::{
    ConnectionDescriptor, ConnectionState, DriverFamily, EngineKind, infer_provider,
    mask_connection_string,
};
pub use value::{DbType, DbValue, FieldType};
