use super::{Adapter, DialectKind, SERVER_KEYS};
use crate::procedure::{ProcedureCall, call_with_placeholders};
use sqlbridge_core::{
    ConnectParams, Driver, DriverConnection, Keywords, OutParam, ParamStyle, Result, SqlQuery,
    Value,
};
use sqlbridge_query::SqlDialect;

const DEFAULT_PORT: u16 = 50000;

/// IBM DB2.
///
/// The driver takes a single `connection_string` keyword; an explicit dsn
/// is passed through as that string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Db2Adapter;

impl Db2Adapter {
    fn connection_string(params: &ConnectParams) -> String {
        if let Some(dsn) = &params.dsn {
            return dsn.clone();
        }
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        format!(
            "DATABASE={};HOSTNAME={};PORT={};PROTOCOL=TCPIP;UID={};PWD={};",
            field(&params.db),
            field(&params.host),
            params.port.unwrap_or(DEFAULT_PORT),
            field(&params.user),
            field(&params.pw),
        )
    }
}

impl SqlDialect for Db2Adapter {
    fn name(&self) -> &str {
        "db2"
    }

    fn default_values_insert(&self, table: &str) -> String {
        format!("INSERT INTO {table} VALUES (DEFAULT)")
    }
}

impl Adapter for Db2Adapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Db2
    }

    fn ping_query(&self) -> &'static str {
        "SELECT 1 FROM SYSIBM.SYSDUMMY1"
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(SERVER_KEYS)
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        let mut keywords = params.extra_keywords();
        keywords.insert(
            "connection_string".to_string(),
            Self::connection_string(params),
        );
        Ok(keywords)
    }

    fn param_style(&self, _driver: &dyn Driver) -> ParamStyle {
        ParamStyle::Format
    }

    fn insert_id_query(&self, _table: &str, _seqname: Option<&str>) -> Option<SqlQuery> {
        Some(SqlQuery::from(
            "SELECT IDENTITY_VAL_LOCAL() FROM SYSIBM.SYSDUMMY1",
        ))
    }

    fn call_proc(
        &self,
        conn: &mut dyn DriverConnection,
        name: &str,
        inputs: &[Value],
        outputs: &[OutParam],
    ) -> Result<Vec<OutParam>> {
        let call = ProcedureCall::new(name, inputs, outputs)?;
        call_with_placeholders(conn, &call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_tcp_connection_string() {
        let params = ConnectParams::new("db2")
            .host("mainframe")
            .user("db2inst1")
            .pw("pw")
            .db("SAMPLE");
        Db2Adapter.validate(&params).unwrap();
        let kw = Db2Adapter.connect_keywords(&params).unwrap();
        assert_eq!(
            kw["connection_string"],
            "DATABASE=SAMPLE;HOSTNAME=mainframe;PORT=50000;PROTOCOL=TCPIP;UID=db2inst1;PWD=pw;"
        );
        assert_eq!(kw.len(), 1);
    }

    #[test]
    fn explicit_dsn_is_used_verbatim() {
        let params = ConnectParams::new("db2")
            .host("h")
            .user("u")
            .pw("p")
            .dsn("DSN=prod");
        let kw = Db2Adapter.connect_keywords(&params).unwrap();
        assert_eq!(kw["connection_string"], "DSN=prod");
    }

    #[test]
    fn bulk_inserts_are_the_default() {
        assert!(Db2Adapter.multiple_insert_default());
        assert_eq!(
            Db2Adapter.default_values_insert("t"),
            "INSERT INTO t VALUES (DEFAULT)"
        );
    }
}
