//! The environment: dialect registry plus shared contexts.

use crate::context::ContextRegistry;
use crate::database::{Database, DatabaseOptions};
use crate::registry::DialectRegistry;
use sqlbridge_core::{ConnectParams, Result};
use std::fmt;
use std::sync::OnceLock;

static GLOBAL: OnceLock<Environment> = OnceLock::new();

/// Where databases are opened.
///
/// An environment owns the adapters and drivers it can resolve dialect
/// names to, and the contexts handed out for each set of credentials.
/// Databases opened from the same environment with the same credentials
/// share a context; separate environments never share anything.
///
/// [`Database::open`] uses the process-wide [`Environment::global`].
pub struct Environment {
    dialects: DialectRegistry,
    contexts: ContextRegistry,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_dialects(DialectRegistry::new())
    }

    /// An environment resolving names through `dialects`.
    pub fn with_dialects(dialects: DialectRegistry) -> Self {
        Self {
            dialects,
            contexts: ContextRegistry::new(),
        }
    }

    /// The process-wide environment, created on first use.
    pub fn global() -> &'static Environment {
        GLOBAL.get_or_init(Environment::new)
    }

    pub fn dialects(&self) -> &DialectRegistry {
        &self.dialects
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    /// Resolve `params.dbn` and open a database handle.
    ///
    /// No connection is made until the first statement runs.
    pub fn open(&self, params: &ConnectParams, options: DatabaseOptions) -> Result<Database> {
        let (adapter, driver) = self.dialects.resolve(&params.dbn)?;
        tracing::debug!(
            dialect = adapter.name(),
            driver = driver.name(),
            source = %params.source_name(),
            "Opening database"
        );
        Database::new(adapter, driver, params, options, self.contexts.clone())
    }

    /// Close every context opened through this environment.
    pub fn close_all(&self) {
        self.contexts.close_all();
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("dialects", &self.dialects)
            .field("contexts", &self.contexts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DialectKind;
    use crate::testing::ScriptedDriver;
    use sqlbridge_core::{Error, ParamStyle};
    use std::sync::Arc;

    fn params(db: &str) -> ConnectParams {
        ConnectParams::new("postgres")
            .host("db.local")
            .user("app")
            .pw("secret")
            .db(db)
    }

    fn scripted() -> (Environment, ScriptedDriver) {
        let env = Environment::new();
        let driver = ScriptedDriver::new("pg", ParamStyle::Format);
        env.dialects()
            .register_driver(DialectKind::Postgres, Arc::new(driver.clone()));
        (env, driver)
    }

    #[test]
    fn same_credentials_share_a_context() {
        let (env, driver) = scripted();
        let a = env.open(&params("main"), DatabaseOptions::new()).unwrap();
        let b = env.open(&params("main"), DatabaseOptions::new()).unwrap();
        assert_eq!(a.context_id().unwrap(), b.context_id().unwrap());
        a.exec("SELECT 1").unwrap();
        b.exec("SELECT 2").unwrap();
        assert_eq!(driver.connects(), 1);
        assert_eq!(env.contexts().len(), 1);
    }

    #[test]
    fn different_databases_get_separate_contexts() {
        let (env, _driver) = scripted();
        let a = env.open(&params("main"), DatabaseOptions::new()).unwrap();
        let b = env.open(&params("audit"), DatabaseOptions::new()).unwrap();
        assert_ne!(a.context_id().unwrap(), b.context_id().unwrap());
        assert_eq!(env.contexts().len(), 2);
    }

    #[test]
    fn environments_are_isolated() {
        let (first, _) = scripted();
        let (second, _) = scripted();
        let a = first.open(&params("main"), DatabaseOptions::new()).unwrap();
        let b = second.open(&params("main"), DatabaseOptions::new()).unwrap();
        assert_ne!(a.context_id().unwrap(), b.context_id().unwrap());
    }

    #[test]
    fn unknown_dialect_fails_to_open() {
        let env = Environment::new();
        let err = env
            .open(&ConnectParams::new("informix"), DatabaseOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDialect(_)));
    }

    #[test]
    fn close_all_closes_open_connections() {
        let (env, driver) = scripted();
        let db = env.open(&params("main"), DatabaseOptions::new()).unwrap();
        db.exec("SELECT 1").unwrap();
        env.close_all();
        assert_eq!(driver.closes(), 1);
        assert!(env.contexts().is_empty());
    }
}
