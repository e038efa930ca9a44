//! Core types for SQLBridge.
//!
//! This crate provides the dialect-independent building blocks:
//!
//! - `Value`, `Row` and `Rows` for data moving in and out of drivers
//! - `Param`, `Literal` and `SqlQuery` for injection-safe SQL assembly
//! - `Template` for `$name` interpolation
//! - `ConnectParams` and `Fingerprint` for connection identity
//! - `Driver` and `DriverConnection`, the seam to concrete drivers

pub mod config;
pub mod connection;
pub mod error;
pub mod row;
pub mod sql;
pub mod template;
pub mod value;

pub use config::{ConnectParams, Fingerprint, Keywords};
pub use connection::{
    Driver, DriverConnection, Execution, OutParam, OutType, ProcArg, ProcReply,
};
pub use error::{Error, Result};
pub use row::{ColumnInfo, FromValue, Row, Rows};
pub use sql::{
    Bind, Literal, Param, ParamStyle, RenderedSql, SqlPart, SqlQuery, Vars, sqllist, sqlors,
    sqlquote, sqlwhere,
};
pub use template::{Template, reparam};
pub use value::Value;
