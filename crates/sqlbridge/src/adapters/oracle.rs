use super::{Adapter, DialectKind, server_keywords};
use crate::procedure::{ProcedureCall, call_with_cursor_binds};
use sqlbridge_core::{
    ConnectParams, Driver, DriverConnection, Keywords, OutParam, ParamStyle, Result, SqlQuery,
    Value,
};
use sqlbridge_query::{BulkInsert, ClauseOrder, SqlDialect};

const DEFAULT_PORT: u16 = 1521;

/// Oracle.
///
/// Connects through a `DESCRIPTION` data source built from host, port and
/// service. Oracle cannot derive a sequence from a table, so generated ids
/// are only read back when a sequence name is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleAdapter;

/// Data source descriptor for a TCP connection to a service id.
pub fn makedsn(host: &str, port: u16, service: &str) -> String {
    format!(
        "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={host})(PORT={port}))(CONNECT_DATA=(SID={service})))"
    )
}

impl SqlDialect for OracleAdapter {
    fn name(&self) -> &str {
        "oracle"
    }

    fn clause_order(&self) -> ClauseOrder {
        ClauseOrder::RowNum
    }

    fn default_values_insert(&self, table: &str) -> String {
        format!("INSERT INTO {table} VALUES (DEFAULT)")
    }

    fn bulk_insert(&self) -> BulkInsert {
        BulkInsert::InsertAll
    }
}

impl Adapter for OracleAdapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn ping_query(&self) -> &'static str {
        "SELECT 1 FROM DUAL"
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(&["host", "user", "pw", "db|dsn", "service"])
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        let mut keywords = server_keywords(params, "password", "db");
        for key in ["host", "port", "db"] {
            keywords.remove(key);
        }
        if params.dsn.is_none() {
            let dsn = makedsn(
                params.host.as_deref().unwrap_or_default(),
                params.port.unwrap_or(DEFAULT_PORT),
                params.service.as_deref().unwrap_or_default(),
            );
            keywords.insert("dsn".to_string(), dsn);
        }
        Ok(keywords)
    }

    fn param_style(&self, _driver: &dyn Driver) -> ParamStyle {
        ParamStyle::Numeric
    }

    fn supports_pooling(&self) -> bool {
        false
    }

    fn supports_nested_transactions(&self) -> bool {
        false
    }

    fn insert_id_query(&self, _table: &str, seqname: Option<&str>) -> Option<SqlQuery> {
        seqname.map(|seq| SqlQuery::from(format!("SELECT {seq}.currval FROM dual")))
    }

    fn call_proc(
        &self,
        conn: &mut dyn DriverConnection,
        name: &str,
        inputs: &[Value],
        outputs: &[OutParam],
    ) -> Result<Vec<OutParam>> {
        let call = ProcedureCall::new(name, inputs, outputs)?;
        call_with_cursor_binds(conn, &call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::error::ConfigError;
    use sqlbridge_core::{Bind, Error, Param, SqlPart};
    use sqlbridge_query::{ColumnValues, MultipleInsert};

    fn params() -> ConnectParams {
        ConnectParams::new("oracle")
            .host("ora.local")
            .port(1522)
            .user("scott")
            .pw("tiger")
            .db("orcl")
            .service("ORCL")
    }

    #[test]
    fn keywords_carry_a_descriptor() {
        OracleAdapter.validate(&params()).unwrap();
        let kw = OracleAdapter.connect_keywords(&params()).unwrap();
        assert_eq!(
            kw["dsn"],
            "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST=ora.local)(PORT=1522))(CONNECT_DATA=(SID=ORCL)))"
        );
        assert_eq!(kw["password"], "tiger");
        assert!(!kw.contains_key("host"));
    }

    #[test]
    fn service_is_required() {
        let mut p = params();
        p.service = None;
        let err = OracleAdapter.validate(&p).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError { key: Some(ref k), .. }) if k == "service"));
    }

    #[test]
    fn insert_id_needs_a_sequence() {
        assert!(OracleAdapter.insert_id_query("t", None).is_none());
        assert_eq!(
            OracleAdapter
                .insert_id_query("t", Some("t_seq"))
                .unwrap()
                .to_string(),
            "SELECT t_seq.currval FROM dual"
        );
    }

    #[test]
    fn bulk_insert_uses_insert_all_with_numeric_markers() {
        let rows: Vec<ColumnValues> = (1..=2_i32)
            .map(|i| [("a".to_string(), Bind::from(i))].into_iter().collect())
            .collect();
        let q = MultipleInsert::new("t", rows)
            .build_with_dialect(&OracleAdapter)
            .unwrap();
        let r = q.render(ParamStyle::Numeric);
        assert_eq!(
            r.sql,
            "INSERT ALL INTO t (a) VALUES (:1) INTO t (a) VALUES (:1) SELECT 1 FROM DUAL"
        );
        assert_eq!(r.params.len(), 2);
        assert!(q.parts().iter().any(|p| *p == SqlPart::Param(Param::new(2))));
    }
}
