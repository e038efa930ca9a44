use super::{Adapter, DialectKind, SERVER_KEYS, server_keywords};
use crate::procedure::{ProcedureCall, call_with_typed_outputs};
use sqlbridge_core::{
    ConnectParams, DriverConnection, Keywords, OutParam, Result, SqlQuery, Value,
};
use sqlbridge_query::{BulkInsert, ClauseOrder, SqlDialect};

/// Firebird.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirebirdAdapter;

impl SqlDialect for FirebirdAdapter {
    fn name(&self) -> &str {
        "firebird"
    }

    fn clause_order(&self) -> ClauseOrder {
        ClauseOrder::FirstSkip
    }

    fn bulk_insert(&self) -> BulkInsert {
        BulkInsert::Unsupported
    }
}

impl Adapter for FirebirdAdapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Firebird
    }

    fn ping_query(&self) -> &'static str {
        "SELECT 1 FROM RDB$DATABASE"
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(SERVER_KEYS)
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        Ok(server_keywords(params, "password", "database"))
    }

    /// Generators are not tied to tables; without a name there is nothing
    /// to read.
    fn insert_id_query(&self, _table: &str, seqname: Option<&str>) -> Option<SqlQuery> {
        seqname.map(|seq| SqlQuery::from(format!("SELECT GEN_ID({seq}, 0) FROM RDB$DATABASE")))
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

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::ParamStyle;
    use sqlbridge_query::{Delete, Select, Where};

    #[test]
    fn first_skip_row_caps() {
        let q = Select::new(["t"])
            .limit(5)
            .offset(10)
            .build_with_dialect(&FirebirdAdapter)
            .unwrap();
        assert_eq!(
            q.render(ParamStyle::Qmark).sql,
            "SELECT FIRST 5 SKIP 10 * FROM t"
        );
    }

    #[test]
    fn delete_drops_using() {
        let q = Delete::new("t", Some(Where::from(1_i64)))
            .using(["u"])
            .build_with_dialect(&FirebirdAdapter)
            .unwrap();
        assert_eq!(q.render(ParamStyle::Qmark).sql, "DELETE FROM t WHERE id = ?");
    }

    #[test]
    fn generator_read_needs_a_name() {
        assert!(FirebirdAdapter.insert_id_query("t", None).is_none());
        assert_eq!(
            FirebirdAdapter
                .insert_id_query("t", Some("gen_t"))
                .unwrap()
                .to_string(),
            "SELECT GEN_ID(gen_t, 0) FROM RDB$DATABASE"
        );
    }
}
