//! Statement builders for SQLBridge.
//!
//! `sqlbridge-query` assembles SELECT/INSERT/UPDATE/DELETE statements from
//! structured input and renders them for a [`SqlDialect`]:
//!
//! - **Row caps**: `LIMIT`, `TOP`, `ROWNUM` or `FIRST`/`SKIP` per [`ClauseOrder`]
//! - **Bulk inserts**: repeated tuples or `INSERT ALL` per [`BulkInsert`]
//! - **Conditions**: id shorthand, column mappings, raw queries or templates
//!
//! Every builder's `build` is side-effect free, so the same request can be
//! rendered for logging or tests and then executed by the facade crate.

pub mod builder;
pub mod clause;
pub mod dialect;
pub mod select;

pub use builder::{ColumnValues, Delete, Insert, MultipleInsert, Update};
pub use clause::Where;
pub use dialect::{BulkInsert, ClauseOrder, GenericDialect, SqlDialect};
pub use select::Select;
