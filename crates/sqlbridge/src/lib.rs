//! SQLBridge - one handle for many SQL databases.
//!
//! SQLBridge runs SQL against PostgreSQL, MySQL, Oracle, DB2, SQLite,
//! Firebird and SQL Server through a single [`Database`] API:
//!
//! - `$name` templates interpolated into injection-safe queries
//! - SELECT/INSERT/UPDATE/DELETE builders rendered per dialect
//! - Generated-id retrieval after inserts, including multi-row inserts
//! - Nested transactions backed by savepoints
//! - Stored procedures with scalar and cursor outputs
//! - One shared connection (or pool) per set of credentials
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbridge::prelude::*;
//!
//! let db = Database::open(ConnectParams::new("sqlite").db("app.db"), DatabaseOptions::new())?;
//! db.exec("CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")?;
//!
//! let mut row = ColumnValues::new();
//! row.insert("name".into(), Bind::from("Ann"));
//! row.insert("age".into(), Bind::from(31));
//! let id = db.insert("person", row).execute()?;
//!
//! let mut older = ColumnValues::new();
//! older.insert("age".into(), Bind::from(32));
//! let tx = db.transaction()?;
//! db.update(["person"], "id = $id", older).var("id", id.unwrap_or_default()).execute()?;
//! tx.commit()?;
//!
//! let adults = db
//!     .select(["person"])
//!     .where_("age >= $min")
//!     .var("min", 18)
//!     .order("name")
//!     .fetch()?;
//! println!("{}", serde_json::to_string(&adults)?);
//! ```
//!
//! # Drivers
//!
//! The SQLite driver is bundled behind the default `sqlite` feature. Server
//! dialects need a [`Driver`] registered with the environment's
//! [`DialectRegistry`]:
//!
//! ```ignore
//! Environment::global()
//!     .dialects()
//!     .register_driver(DialectKind::Postgres, Arc::new(MyPgDriver::new()));
//! ```

pub mod adapters;
pub mod context;
mod database;
pub mod environment;
pub mod procedure;
pub mod registry;
pub mod transaction;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::{Adapter, DialectKind};
pub use context::{Context, ContextRegistry, Nesting};
pub use database::{
    Database, DatabaseOptions, DeleteRequest, InsertRequest, MultipleInsertRequest, QueryResult,
    SelectRequest, UpdateRequest,
};
pub use environment::Environment;
pub use registry::DialectRegistry;
pub use transaction::Transaction;

pub use sqlbridge_core::error::{
    ConfigError, ExecutionError, ExecutionErrorKind, ProcedureError, TransactionError,
    TransactionErrorKind,
};
pub use sqlbridge_core::{
    Bind, ConnectParams, Driver, DriverConnection, Error, Execution, Fingerprint, Keywords,
    Literal, OutParam, OutType, Param, ParamStyle, ProcArg, ProcReply, Result, Row, Rows,
    SqlQuery, Template, Value, Vars, reparam, sqllist, sqlors, sqlquote, sqlwhere,
};

pub use sqlbridge_query::{
    BulkInsert, ClauseOrder, ColumnValues, Delete, Insert, MultipleInsert, Select, SqlDialect,
    Update, Where,
};

pub use sqlbridge_pool::{PoolConfig, PoolStats};

#[cfg(feature = "sqlite")]
pub use sqlbridge_sqlite::SqliteDriver;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlbridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Bind, ColumnValues, ConnectParams, Database, DatabaseOptions, DialectKind, Environment,
        Error, PoolConfig, QueryResult, Result, Row, Rows, SqlQuery, Transaction, Value, Vars,
        Where, reparam,
    };
}
