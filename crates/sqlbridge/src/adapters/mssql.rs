use super::{Adapter, DialectKind, SERVER_KEYS, server_keywords};
use crate::procedure::{ProcedureCall, call_with_typed_outputs};
use sqlbridge_core::{
    ConnectParams, DriverConnection, Keywords, OutParam, Result, SqlQuery, Value,
};
use sqlbridge_query::{BulkInsert, ClauseOrder, SqlDialect};

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlAdapter;

impl SqlDialect for MssqlAdapter {
    fn name(&self) -> &str {
        "mssql"
    }

    fn clause_order(&self) -> ClauseOrder {
        ClauseOrder::Top
    }

    fn bulk_insert(&self) -> BulkInsert {
        BulkInsert::Unsupported
    }
}

impl Adapter for MssqlAdapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Mssql
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(SERVER_KEYS)
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        Ok(server_keywords(params, "password", "database"))
    }

    fn insert_id_query(&self, _table: &str, _seqname: Option<&str>) -> Option<SqlQuery> {
        Some(SqlQuery::from("SELECT @@IDENTITY"))
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
    use rstest::rstest;
    use sqlbridge_core::ParamStyle;
    use sqlbridge_query::Select;

    #[rstest]
    #[case(Some(10), None, "SELECT TOP 10 * FROM t ORDER BY id")]
    #[case(
        Some(10),
        Some(20),
        "SELECT * FROM t ORDER BY id OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
    )]
    #[case(None, Some(5), "SELECT * FROM t ORDER BY id OFFSET 5 ROWS")]
    fn top_and_offset_paging(
        #[case] limit: Option<u64>,
        #[case] offset: Option<u64>,
        #[case] expected: &str,
    ) {
        let mut select = Select::new(["t"]).order("id");
        if let Some(n) = limit {
            select = select.limit(n);
        }
        if let Some(n) = offset {
            select = select.offset(n);
        }
        let q = select.build_with_dialect(&MssqlAdapter).unwrap();
        assert_eq!(q.render(ParamStyle::Qmark).sql, expected);
    }

    #[test]
    fn keywords_and_identity() {
        let params = ConnectParams::new("mssql")
            .host("sql.local")
            .user("sa")
            .pw("pw")
            .db("app");
        let kw = MssqlAdapter.connect_keywords(&params).unwrap();
        assert_eq!(kw["database"], "app");
        assert_eq!(kw["password"], "pw");
        assert_eq!(
            MssqlAdapter.insert_id_query("t", None).unwrap().to_string(),
            "SELECT @@IDENTITY"
        );
        assert!(!MssqlAdapter.multiple_insert_default());
    }
}
