//! Dialect registry: adapter and driver lookup by name.

use crate::adapters::{Adapter, DialectKind};
use sqlbridge_core::error::ConfigError;
use sqlbridge_core::{Driver, Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Adapters and drivers keyed by canonical dialect name.
///
/// Every built-in adapter is registered up front. Drivers are pluggable:
/// only the bundled SQLite driver is registered by default, server drivers
/// are added with [`DialectRegistry::register_driver`].
pub struct DialectRegistry {
    adapters: RwLock<BTreeMap<DialectKind, Arc<dyn Adapter>>>,
    drivers: RwLock<BTreeMap<DialectKind, Arc<dyn Driver>>>,
}

impl DialectRegistry {
    /// Built-in adapters plus the default drivers.
    pub fn new() -> Self {
        let registry = Self::empty();
        for kind in DialectKind::ALL {
            registry.register_adapter(kind.adapter());
        }
        #[cfg(feature = "sqlite")]
        registry.register_driver(
            DialectKind::Sqlite,
            Arc::new(sqlbridge_sqlite::SqliteDriver::new()),
        );
        registry
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            adapters: RwLock::new(BTreeMap::new()),
            drivers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register (or replace) the adapter for its dialect.
    pub fn register_adapter(&self, adapter: Arc<dyn Adapter>) {
        let kind = adapter.kind();
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, adapter);
    }

    /// Register (or replace) the driver used for `dialect`.
    pub fn register_driver(&self, dialect: DialectKind, driver: Arc<dyn Driver>) {
        tracing::debug!(dialect = %dialect, driver = driver.name(), "Registering driver");
        self.drivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dialect, driver);
    }

    pub fn adapter(&self, dialect: DialectKind) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dialect)
            .cloned()
    }

    pub fn driver(&self, dialect: DialectKind) -> Option<Arc<dyn Driver>> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dialect)
            .cloned()
    }

    /// Look up the adapter and driver for a dialect name or alias.
    pub fn resolve(&self, name: &str) -> Result<(Arc<dyn Adapter>, Arc<dyn Driver>)> {
        let kind: DialectKind = name.parse()?;
        let adapter = self
            .adapter(kind)
            .ok_or_else(|| Error::UnknownDialect(name.to_string()))?;
        let driver = self.driver(kind).ok_or_else(|| {
            Error::Config(ConfigError {
                key: Some("dbn".to_string()),
                message: format!("no driver registered for dialect '{kind}'"),
            })
        })?;
        Ok((adapter, driver))
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adapters: Vec<DialectKind> = self
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        let drivers: Vec<(DialectKind, String)> = self
            .drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, d)| (*k, d.name().to_string()))
            .collect();
        f.debug_struct("DialectRegistry")
            .field("adapters", &adapters)
            .field("drivers", &drivers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::{DriverConnection, Keywords, ParamStyle};

    struct NullDriver;

    impl Driver for NullDriver {
        fn name(&self) -> &str {
            "null"
        }

        fn param_style(&self) -> ParamStyle {
            ParamStyle::Format
        }

        fn connect(&self, _keywords: &Keywords) -> Result<Box<dyn DriverConnection>> {
            Err(Error::Config(ConfigError::new("not connectable")))
        }
    }

    #[test]
    fn unknown_name_is_an_unknown_dialect() {
        let registry = DialectRegistry::new();
        assert!(matches!(
            registry.resolve("informix"),
            Err(Error::UnknownDialect(_))
        ));
    }

    #[test]
    fn missing_driver_is_a_config_error() {
        let registry = DialectRegistry::new();
        let err = registry.resolve("postgres").err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError { key: Some(ref k), .. }) if k == "dbn"));
    }

    #[test]
    fn aliases_resolve_to_registered_driver() {
        let registry = DialectRegistry::new();
        registry.register_driver(DialectKind::Postgres, Arc::new(NullDriver));
        let (adapter, driver) = registry.resolve("postgresql").unwrap();
        assert_eq!(adapter.kind(), DialectKind::Postgres);
        assert_eq!(driver.name(), "null");
    }

    #[test]
    fn empty_registry_knows_no_adapters() {
        let registry = DialectRegistry::empty();
        assert!(matches!(registry.resolve("mysql"), Err(Error::UnknownDialect(_))));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_driver_is_built_in() {
        let (_, driver) = DialectRegistry::new().resolve("sqlite3").unwrap();
        assert_eq!(driver.name(), "sqlite");
    }
}
