//! Dialect adapters.
//!
//! An [`Adapter`] is a stateless strategy for one backend. On top of the
//! [`SqlDialect`] rendering capabilities it knows how to turn
//! [`ConnectParams`] into driver keywords, how to read back a generated
//! id, and how that backend's drivers marshal stored-procedure outputs.

mod db2;
mod firebird;
mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

pub use db2::Db2Adapter;
pub use firebird::FirebirdAdapter;
pub use mssql::MssqlAdapter;
pub use mysql::MysqlAdapter;
pub use oracle::OracleAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use sqlbridge_core::{
    ConnectParams, Driver, DriverConnection, Error, Keywords, OutParam, ParamStyle, Result,
    SqlQuery, Value,
};
use sqlbridge_query::{BulkInsert, SqlDialect};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DialectKind {
    Postgres,
    Mysql,
    Oracle,
    Db2,
    Sqlite,
    Firebird,
    Mssql,
}

impl DialectKind {
    pub const ALL: [DialectKind; 7] = [
        DialectKind::Postgres,
        DialectKind::Mysql,
        DialectKind::Oracle,
        DialectKind::Db2,
        DialectKind::Sqlite,
        DialectKind::Firebird,
        DialectKind::Mssql,
    ];

    /// Canonical name.
    pub const fn name(self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::Oracle => "oracle",
            DialectKind::Db2 => "db2",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Firebird => "firebird",
            DialectKind::Mssql => "mssql",
        }
    }

    /// Resolve a canonical name or one of its aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => DialectKind::Postgres,
            "mysql" => DialectKind::Mysql,
            "oracle" => DialectKind::Oracle,
            "db2" | "ibm_db" => DialectKind::Db2,
            "sqlite" | "sqlite3" => DialectKind::Sqlite,
            "firebird" => DialectKind::Firebird,
            "mssql" | "sqlserver" => DialectKind::Mssql,
            _ => return None,
        })
    }

    /// The built-in adapter for this backend.
    pub fn adapter(self) -> Arc<dyn Adapter> {
        match self {
            DialectKind::Postgres => Arc::new(PostgresAdapter),
            DialectKind::Mysql => Arc::new(MysqlAdapter),
            DialectKind::Oracle => Arc::new(OracleAdapter),
            DialectKind::Db2 => Arc::new(Db2Adapter),
            DialectKind::Sqlite => Arc::new(SqliteAdapter),
            DialectKind::Firebird => Arc::new(FirebirdAdapter),
            DialectKind::Mssql => Arc::new(MssqlAdapter),
        }
    }
}

impl FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::UnknownDialect(s.to_string()))
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Backend strategy: connection keywords, generated ids and stored
/// procedures, plus the SQL rendering capabilities of [`SqlDialect`].
pub trait Adapter: SqlDialect + Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    /// Report missing required parameters before any connection attempt.
    fn validate(&self, params: &ConnectParams) -> Result<()>;

    /// Driver keywords for `params`. Assumes `validate` passed.
    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords>;

    /// Marker style used when rendering; some backends force one
    /// regardless of what the driver reports.
    fn param_style(&self, driver: &dyn Driver) -> ParamStyle {
        driver.param_style()
    }

    /// Cheapest statement the backend accepts, used to check liveness.
    fn ping_query(&self) -> &'static str {
        "SELECT 1"
    }

    /// Whether connections may be shared through a pool.
    fn supports_pooling(&self) -> bool {
        true
    }

    /// Whether nested transactions map to savepoints. When false, nested
    /// levels are no-ops.
    fn supports_nested_transactions(&self) -> bool {
        true
    }

    /// Whether `multiple_insert` renders one statement unless told
    /// otherwise.
    fn multiple_insert_default(&self) -> bool {
        self.bulk_insert() != BulkInsert::Unsupported
    }

    /// Follow-up query returning the id generated by the last insert, if
    /// the backend can tell.
    fn insert_id_query(&self, table: &str, seqname: Option<&str>) -> Option<SqlQuery>;

    /// Ids of `count` rows inserted by one statement, given the id the
    /// backend reported afterwards. Most backends report the last one.
    fn bulk_insert_ids(&self, reported: i64, count: usize) -> Vec<i64> {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        (reported.saturating_sub(count) + 1..=reported).collect()
    }

    /// Invoke stored procedure `name` and return the filled output slots,
    /// in the order of `outputs`.
    fn call_proc(
        &self,
        conn: &mut dyn DriverConnection,
        name: &str,
        inputs: &[Value],
        outputs: &[OutParam],
    ) -> Result<Vec<OutParam>>;
}

/// Quote `s` as a SQL string literal.
pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Keywords shared by the server dialects: passthrough extras, then
/// host/port/user, the password under `password_key` and the database
/// under `database_key`.
pub(crate) fn server_keywords(
    params: &ConnectParams,
    password_key: &str,
    database_key: &str,
) -> Keywords {
    let mut keywords = params.extra_keywords();
    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            keywords.insert(key.to_string(), value);
        }
    };
    put("host", params.host.clone());
    put("port", params.port.map(|p| p.to_string()));
    put("user", params.user.clone());
    put(password_key, params.pw.clone());
    put(database_key, params.db.clone());
    put("dsn", params.dsn.clone());
    keywords
}

/// Required parameters of a networked backend.
pub(crate) const SERVER_KEYS: &[&str] = &["host", "user", "pw", "db|dsn"];
