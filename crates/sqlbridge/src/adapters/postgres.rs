use super::{Adapter, DialectKind, SERVER_KEYS, quote_literal, server_keywords};
use crate::procedure::{ProcedureCall, call_with_typed_outputs};
use sqlbridge_core::{
    ConnectParams, DriverConnection, Keywords, OutParam, Result, SqlQuery, Value,
};
use sqlbridge_query::SqlDialect;

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

impl SqlDialect for PostgresAdapter {
    fn name(&self) -> &str {
        "postgres"
    }

    fn supports_delete_using(&self) -> bool {
        true
    }
}

impl Adapter for PostgresAdapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(SERVER_KEYS)
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        let mut keywords = server_keywords(params, "password", "database");
        keywords
            .entry("client_encoding".to_string())
            .or_insert_with(|| "UTF8".to_string());
        Ok(keywords)
    }

    fn insert_id_query(&self, table: &str, seqname: Option<&str>) -> Option<SqlQuery> {
        Some(match seqname {
            Some(seq) => SqlQuery::from(format!("SELECT currval({})", quote_literal(seq))),
            // No row when the table has no `<table>_id_seq`.
            None => {
                SqlQuery::from("SELECT currval(c.oid::regclass) FROM pg_class c ")
                    + "WHERE c.relkind = 'S' AND c.relname = "
                    + SqlQuery::param(format!("{table}_id_seq"))
            }
        })
    }

    fn call_proc(
        &self,
        conn: &mut dyn DriverConnection,
        name: &str,
        inputs: &[Value],
        outputs: &[OutParam],
    ) -> Result<Vec<OutParam>> {
        let call = ProcedureCall::new(name, inputs, outputs)?;
        call_with_typed_outputs(conn, &call)
    }
}
