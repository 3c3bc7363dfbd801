//! Configuration handling for db-facade.
//!
//! Two sources feed a [`Database`](crate::Database):
//!
//! - [`ConnectionStore`]: named connections read from a JSON settings file
//!   with a `ConnectionStrings` section, optionally overlaid by a
//!   `<stem>.Development.json` file next to it.
//! - [`Config`]: CLI arguments and environment variables for the binary.

use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, DbValue, infer_provider};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Suffix of the overlay file, appended to the settings file stem.
const DEVELOPMENT_OVERLAY: &str = "Development";

// =============================================================================
// Database Options
// =============================================================================

/// Timeouts applied by a [`Database`](crate::Database).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Timeout given to commands created by the facade. Zero disables it.
    pub command_timeout: Duration,
    /// Timeout for opening a connection. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            connect_timeout: Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
        }
    }
}

impl DatabaseOptions {
    /// Build options from second counts. A zero connect timeout disables it.
    pub fn from_secs(command_timeout_secs: u64, connect_timeout_secs: u64) -> Self {
        Self {
            command_timeout: Duration::from_secs(command_timeout_secs),
            connect_timeout: (connect_timeout_secs > 0)
                .then(|| Duration::from_secs(connect_timeout_secs)),
        }
    }
}

// =============================================================================
// Settings File
// =============================================================================

/// One `ConnectionStrings` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ConnectionEntry {
    Full {
        #[serde(rename = "ProviderName")]
        provider_name: Option<String>,
        #[serde(rename = "ConnectionString")]
        connection_string: String,
    },
    /// Bare connection string; the provider comes from the URL scheme
    Bare(String),
}

impl ConnectionEntry {
    fn into_descriptor(self, name: &str) -> DbResult<ConnectionDescriptor> {
        let (provider, connection_string) = match self {
            Self::Full {
                provider_name: Some(provider),
                connection_string,
            } if !provider.trim().is_empty() => (provider, connection_string),
            Self::Full {
                connection_string, ..
            }
            | Self::Bare(connection_string) => {
                let provider = infer_provider(&connection_string).ok_or_else(|| {
                    DbError::configuration(format!(
                        "Connection '{}' has no ProviderName and its provider cannot be inferred",
                        name
                    ))
                })?;
                (provider.to_string(), connection_string)
            }
        };
        ConnectionDescriptor::new(provider, connection_string)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TimeoutSection {
    command_timeout: Option<u64>,
    connect_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SettingsFile {
    #[serde(default)]
    connection_strings: BTreeMap<String, ConnectionEntry>,
    #[serde(default)]
    app_settings: BTreeMap<String, String>,
    #[serde(default)]
    data_access: Option<TimeoutSection>,
}

/// Named connection descriptors loaded from a settings file.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStore {
    connections: BTreeMap<String, ConnectionDescriptor>,
    app_settings: BTreeMap<String, String>,
    options: DatabaseOptions,
}

impl ConnectionStore {
    /// Load a settings file and its optional Development overlay.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::load_with_environment(path, Some(DEVELOPMENT_OVERLAY))
    }

    /// Load a settings file, overlaying `<stem>.<environment>.json` when it
    /// exists.
    pub fn load_with_environment(
        path: impl AsRef<Path>,
        environment: Option<&str>,
    ) -> DbResult<Self> {
        let path = path.as_ref();
        let mut store = Self::from_json(&read_settings(path)?)?;

        if let Some(environment) = environment {
            let overlay_path = overlay_path(path, environment);
            if overlay_path.is_file() {
                let overlay = Self::from_json(&read_settings(&overlay_path)?)?;
                debug!(
                    path = %overlay_path.display(),
                    connections = overlay.connections.len(),
                    "Applying settings overlay"
                );
                store.merge(overlay);
            }
        }

        debug!(
            path = %path.display(),
            connections = store.connections.len(),
            "Loaded connection store"
        );
        Ok(store)
    }

    /// Parse settings from JSON text.
    pub fn from_json(json: &str) -> DbResult<Self> {
        let file: SettingsFile = serde_json::from_str(json)
            .map_err(|e| DbError::configuration(format!("Invalid settings file: {}", e)))?;

        let connections = file
            .connection_strings
            .into_iter()
            .map(|(name, entry)| {
                let descriptor = entry.into_descriptor(&name)?;
                Ok((name, descriptor))
            })
            .collect::<DbResult<BTreeMap<_, _>>>()?;

        let mut options = DatabaseOptions::default();
        if let Some(section) = file.data_access {
            if let Some(secs) = section.command_timeout {
                options.command_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = section.connect_timeout {
                options.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }

        Ok(Self {
            connections,
            app_settings: file.app_settings,
            options,
        })
    }

    /// Add or replace a named connection.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: ConnectionDescriptor) {
        self.connections.insert(name.into(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionDescriptor> {
        self.connections.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }

    /// Value of an `AppSettings` entry.
    pub fn app_setting(&self, key: &str) -> Option<&str> {
        self.app_settings.get(key).map(String::as_str)
    }

    pub fn options(&self) -> DatabaseOptions {
        self.options
    }

    /// Entries of `overlay` replace entries of the same name.
    fn merge(&mut self, overlay: ConnectionStore) {
        self.connections.extend(overlay.connections);
        self.app_settings.extend(overlay.app_settings);
        if overlay.options != DatabaseOptions::default() {
            self.options = overlay.options;
        }
    }
}

fn read_settings(path: &Path) -> DbResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        DbError::configuration(format!(
            "Cannot read settings file {}: {}",
            path.display(),
            e
        ))
    })
}

fn overlay_path(path: &Path, environment: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.json", stem, environment))
}

// =============================================================================
// CLI
// =============================================================================

/// How the CLI runs its SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExecutionMode {
    /// Print every row as a JSON object
    #[default]
    Query,
    /// Print the affected row count
    NonQuery,
    /// Print the first column of the first row
    Scalar,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::NonQuery => write!(f, "non-query"),
            Self::Scalar => write!(f, "scalar"),
        }
    }
}

/// Configuration for the db-facade binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-facade",
    about = "Run SQL through the db-facade data-access layer",
    version
)]
pub struct Config {
    /// Settings file holding the ConnectionStrings section
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_SETTINGS_FILE,
        env = "DB_FACADE_SETTINGS"
    )]
    pub settings: PathBuf,

    /// Named connection from the settings file
    #[arg(
        short = 'c',
        long,
        value_name = "NAME",
        env = "DB_FACADE_CONNECTION",
        conflicts_with = "connection_string"
    )]
    pub connection: Option<String>,

    /// Provider identifier (sqlite, postgres, mysql). Inferred from the URL when omitted.
    #[arg(long, env = "DB_FACADE_PROVIDER")]
    pub provider: Option<String>,

    /// Connection string (sensitive - not logged)
    #[arg(long = "connection-string", env = "DB_FACADE_CONNECTION_STRING")]
    pub connection_string: Option<String>,

    /// Execution mode
    #[arg(
        short,
        long,
        value_enum,
        default_value = "query",
        env = "DB_FACADE_MODE"
    )]
    pub mode: ExecutionMode,

    /// Command parameter, as NAME=VALUE. Can be repeated.
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Command timeout in seconds (0 disables)
    #[arg(
        long,
        default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS,
        env = "DB_FACADE_COMMAND_TIMEOUT"
    )]
    pub command_timeout: u64,

    /// Connection timeout in seconds (0 disables)
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DB_FACADE_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "DB_FACADE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_FACADE_JSON_LOGS")]
    pub json_logs: bool,

    /// SQL to run. `@name` markers refer to --param values.
    pub sql: String,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Resolve the connection to use.
    ///
    /// An explicit connection string wins over a named connection.
    pub fn descriptor(&self) -> DbResult<ConnectionDescriptor> {
        if let Some(connection_string) = &self.connection_string {
            return match &self.provider {
                Some(provider) => ConnectionDescriptor::new(provider, connection_string),
                None => ConnectionDescriptor::from_url(connection_string),
            };
        }

        let name = self.connection.as_deref().ok_or_else(|| {
            DbError::missing_connection_info(
                "Either --connection or --connection-string is required",
            )
        })?;
        let store = ConnectionStore::load(&self.settings)?;
        store.get(name).cloned().ok_or_else(|| {
            DbError::missing_connection_info(format!(
                "No connection named '{}' in {}",
                name,
                self.settings.display()
            ))
        })
    }

    pub fn options(&self) -> DatabaseOptions {
        DatabaseOptions::from_secs(self.command_timeout, self.connect_timeout)
    }

    /// Parse the `--param` values.
    pub fn parameters(&self) -> DbResult<Vec<(String, DbValue)>> {
        self.params.iter().map(|p| parse_param(p)).collect()
    }
}

/// Parse one `NAME=VALUE` argument.
///
/// `null` becomes a null value, integers and reals keep their numeric type
/// and anything else is text.
pub fn parse_param(arg: &str) -> DbResult<(String, DbValue)> {
    let (name, raw) = arg.split_once('=').ok_or_else(|| {
        DbError::invalid_input(format!("Parameter '{}' must be NAME=VALUE", arg))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Parameter '{}' has an empty name",
            arg
        )));
    }

    let value = if raw.eq_ignore_ascii_case("null") {
        DbValue::Null
    } else if let Ok(v) = raw.parse::<i64>() {
        DbValue::Int64(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        DbValue::Double(v)
    } else {
        DbValue::Text(raw.to_string())
    };
    Ok((name.to_string(), value))
}
