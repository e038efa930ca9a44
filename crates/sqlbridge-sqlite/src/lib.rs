//! SQLite driver for SQLBridge.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! Wraps libsqlite3 (compiled from the bundled amalgamation) behind the
//! blocking [`Driver`]/[`DriverConnection`] traits from sqlbridge-core.
//!
//! # Connect keywords
//!
//! | Keyword    | Meaning                                          |
//! |------------|--------------------------------------------------|
//! | `database` | file path, or `:memory:` (required)              |
//! | `timeout`  | busy timeout in seconds, fractional allowed      |
//!
//! # Type Mapping
//!
//! | Value            | SQLite storage       |
//! |------------------|----------------------|
//! | Bool/Int/BigInt  | INTEGER              |
//! | Double           | REAL                 |
//! | Text/Decimal     | TEXT                 |
//! | Bytes            | BLOB                 |
//! | Date/Timestamp   | TEXT (ISO-8601)      |
//! | Json/Array       | TEXT (JSON)          |

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

use sqlbridge_core::error::ConfigError;
use sqlbridge_core::{Driver, DriverConnection, Keywords, ParamStyle, Result};

/// The SQLite connection factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }

    /// Translate connect keywords into an open configuration.
    pub fn config(keywords: &Keywords) -> Result<SqliteConfig> {
        let path = keywords
            .get("database")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::missing("database", "sqlite"))?;

        let mut config = SqliteConfig::file(path.as_str());
        if let Some(timeout) = keywords.get("timeout") {
            let secs: f64 = timeout.parse().map_err(|_| ConfigError {
                key: Some("timeout".to_string()),
                message: format!("invalid sqlite timeout {timeout:?}"),
            })?;
            #[allow(clippy::cast_possible_truncation)]
            let ms = (secs.max(0.0) * 1000.0).min(f64::from(u32::MAX)) as u32;
            config = config.busy_timeout(ms);
        }
        Ok(config)
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Qmark
    }

    fn connect(&self, keywords: &Keywords) -> Result<Box<dyn DriverConnection>> {
        let config = Self::config(keywords)?;
        Ok(Box::new(SqliteConnection::open(&config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::{Error, Value};

    fn keywords(pairs: &[(&str, &str)]) -> Keywords {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn config_requires_database() {
        let err = SqliteDriver::config(&Keywords::new()).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError { key: Some(ref k), .. }) if k == "database"));
    }

    #[test]
    fn config_reads_timeout_in_seconds() {
        let config =
            SqliteDriver::config(&keywords(&[("database", ":memory:"), ("timeout", "1.5")])).unwrap();
        assert_eq!(config.path, ":memory:");
        assert_eq!(config.busy_timeout_ms, 1500);

        let err = SqliteDriver::config(&keywords(&[("database", "x.db"), ("timeout", "soon")]));
        assert!(err.is_err());
    }

    #[test]
    fn driver_connects_and_executes() {
        let driver = SqliteDriver::new();
        assert_eq!(driver.name(), "sqlite");
        assert_eq!(driver.param_style(), ParamStyle::Qmark);

        let mut conn = driver.connect(&keywords(&[("database", ":memory:")])).unwrap();
        conn.ping("SELECT 1").unwrap();
        let rows = conn
            .execute("SELECT ? AS answer", &[Value::Int(42)])
            .unwrap()
            .result_set
            .unwrap();
        assert_eq!(rows[0].get_named::<i32>("answer").unwrap(), 42);
        conn.close().unwrap();
    }

    #[test]
    fn procedures_are_unsupported() {
        let mut conn = SqliteDriver
            .connect(&keywords(&[("database", ":memory:")]))
            .unwrap();
        let err = conn.call_procedure("p", &[]).unwrap_err();
        assert!(matches!(err, Error::Procedure(_)));
    }
}
