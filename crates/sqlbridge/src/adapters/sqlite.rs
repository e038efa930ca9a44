use super::{Adapter, DialectKind};
use sqlbridge_core::error::ProcedureError;
use sqlbridge_core::{
    ConnectParams, DriverConnection, Keywords, OutParam, Result, SqlQuery, Value,
};
use sqlbridge_query::{BulkInsert, SqlDialect};

/// SQLite.
///
/// One connection per context: file databases are not shared through a
/// pool, and multi-row inserts run row by row so every generated id can be
/// read back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAdapter;

impl SqlDialect for SqliteAdapter {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn bulk_insert(&self) -> BulkInsert {
        BulkInsert::Unsupported
    }
}

impl Adapter for SqliteAdapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(&["db"])
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        let mut keywords = params.extra_keywords();
        if let Some(db) = &params.db {
            keywords.insert("database".to_string(), db.clone());
        }
        Ok(keywords)
    }

    fn supports_pooling(&self) -> bool {
        false
    }

    fn insert_id_query(&self, _table: &str, _seqname: Option<&str>) -> Option<SqlQuery> {
        Some(SqlQuery::from("SELECT last_insert_rowid()"))
    }

    fn call_proc(
        &self,
        _conn: &mut dyn DriverConnection,
        name: &str,
        _inputs: &[Value],
        _outputs: &[OutParam],
    ) -> Result<Vec<OutParam>> {
        Err(ProcedureError::new(name, "sqlite has no stored procedures").into())
    }
}
