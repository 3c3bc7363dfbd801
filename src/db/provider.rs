//! Provider resolution and engine classification.
//!
//! A [`ProviderRegistry`] maps provider identifiers to driver factories. The
//! engine kind of a database is derived once, from the factory type name and
//! the connection string, and decides which dialect rewrites apply.

use crate::db::driver::DriverFactory;
use crate::db::sqlx_driver::SqlxFactory;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, EngineKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registered driver factories, keyed by lowercase provider identifier.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&String> = self.factories.keys().collect();
        providers.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in sqlx providers.
    ///
    /// | Identifier | Aliases |
    /// |------------|---------|
    /// | `sqlite` | |
    /// | `postgres` | `postgresql`, `pg` |
    /// | `mysql` | `mariadb` |
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let sqlite: Arc<dyn DriverFactory> = Arc::new(SqlxFactory::sqlite());
        let postgres: Arc<dyn DriverFactory> = Arc::new(SqlxFactory::postgres());
        let mysql: Arc<dyn DriverFactory> = Arc::new(SqlxFactory::mysql());

        registry.register_shared("sqlite", sqlite);
        for name in ["postgres", "postgresql", "pg"] {
            registry.register_shared(name, Arc::clone(&postgres));
        }
        for name in ["mysql", "mariadb"] {
            registry.register_shared(name, Arc::clone(&mysql));
        }
        registry
    }

    /// Register a factory under a provider identifier, replacing any existing one.
    pub fn register<F>(&mut self, provider: &str, factory: F)
    where
        F: DriverFactory + 'static,
    {
        self.register_shared(provider, Arc::new(factory));
    }

    pub fn register_shared(&mut self, provider: &str, factory: Arc<dyn DriverFactory>) {
        self.factories.insert(normalize(provider), factory);
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.factories.contains_key(&normalize(provider))
    }

    /// Registered identifiers, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the factory for a provider identifier.
    pub fn resolve(&self, provider: &str) -> DbResult<Arc<dyn DriverFactory>> {
        self.factories
            .get(&normalize(provider))
            .cloned()
            .ok_or_else(|| DbError::unrecognized_provider(provider))
    }

    /// Resolve the factory for a descriptor and classify its engine.
    pub fn resolve_descriptor(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<(Arc<dyn DriverFactory>, EngineKind)> {
        let factory = self.resolve(descriptor.provider())?;
        let engine = classify_engine(factory.type_name(), descriptor.connection_string());
        debug!(
            provider = %descriptor.provider(),
            factory = %factory.type_name(),
            engine = %engine,
            "Resolved provider"
        );
        Ok((factory, engine))
    }
}

fn normalize(provider: &str) -> String {
    provider.trim().to_ascii_lowercase()
}

/// Classify the engine behind a factory.
///
/// The factory type name is checked first; the connection string is only a
/// hint when the type name says nothing.
pub fn classify_engine(factory_type_name: &str, connection_string: &str) -> EngineKind {
    if factory_type_name.contains("SqlClient") {
        return EngineKind::SqlServerLike;
    }
    if factory_type_name.contains("Oracle") {
        return EngineKind::OracleLike;
    }

    let upper = connection_string.to_ascii_uppercase();
    if upper.contains("ORACLE") {
        EngineKind::OracleLike
    } else if upper.contains("SQLOLEDB") {
        EngineKind::SqlServerLike
    } else {
        EngineKind::Other
    }
}

/// Whether the engine accepts GUID parameters natively.
pub fn supports_guid(engine: EngineKind) -> bool {
    !engine.is_oracle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DriverFamily;

    #[test]
    fn test_classify_by_type_name() {
        assert_eq!(
            classify_engine("System.Data.SqlClient.SqlClientFactory", "Server=.;"),
            EngineKind::SqlServerLike
        );
        assert_eq!(
            classify_engine("Vendor.OracleClientFactory", "anything"),
            EngineKind::OracleLike
        );
    }

    #[test]
    fn test_classify_by_connection_string() {
        assert_eq!(
            classify_engine(
                "OleDbFactory",
                "Provider=OraOLEDB.Oracle;Data Source=ORCL;User Id=u;Password=p"
            ),
            EngineKind::OracleLike
        );
        assert_eq!(
            classify_engine("OleDbFactory", "Provider=SQLOLEDB;Data Source=.;"),
            EngineKind::SqlServerLike
        );
        assert_eq!(
            classify_engine("sqlx::sqlite::SqliteConnection", "sqlite::memory:"),
            EngineKind::Other
        );
    }

    #[test]
    fn test_type_name_wins_over_connection_string() {
        assert_eq!(
            classify_engine("SqlClientFactory", "Data Source=oracle-host"),
            EngineKind::SqlServerLike
        );
    }

    #[test]
    fn test_resolve_defaults() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.resolve("PostgreSQL").unwrap().family(),
            DriverFamily::Numbered
        );
        assert_eq!(
            registry.resolve(" sqlite ").unwrap().family(),
            DriverFamily::Positional
        );
        assert!(registry.contains("mariadb"));
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let registry = ProviderRegistry::with_defaults();
        let err = registry.resolve("No.Such.Provider").err().expect("expected error");
        assert!(matches!(err, DbError::UnrecognizedProvider { .. }));
        assert!(err.to_string().contains("No.Such.Provider"));
    }

    #[test]
    fn test_resolve_descriptor() {
        let registry = ProviderRegistry::with_defaults();
        let descriptor = ConnectionDescriptor::new("sqlite", "sqlite::memory:").unwrap();
        let (factory, engine) = registry.resolve_descriptor(&descriptor).unwrap();
        assert_eq!(factory.type_name(), "sqlx::sqlite::SqliteConnection");
        assert_eq!(engine, EngineKind::Other);
    }

    #[test]
    fn test_supports_guid() {
        assert!(supports_guid(EngineKind::SqlServerLike));
        assert!(supports_guid(EngineKind::Other));
        assert!(!supports_guid(EngineKind::OracleLike));
    }
}
