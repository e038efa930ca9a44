use super::{Adapter, DialectKind, SERVER_KEYS, server_keywords};
use crate::procedure::{ProcedureCall, result_set};
use sqlbridge_core::error::ProcedureError;
use sqlbridge_core::{
    ConnectParams, Driver, DriverConnection, Keywords, OutParam, ParamStyle, Result, SqlQuery,
    Value,
};
use sqlbridge_query::SqlDialect;

/// MySQL and MariaDB.
///
/// Procedure outputs travel as session variables named `@_<proc>_<n>`,
/// where `n` is the argument position; they are read back with a follow-up
/// SELECT after the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlAdapter;

impl SqlDialect for MysqlAdapter {
    fn name(&self) -> &str {
        "mysql"
    }

    fn default_values_insert(&self, table: &str) -> String {
        format!("INSERT INTO {table} () VALUES ()")
    }

    fn supports_delete_using(&self) -> bool {
        true
    }
}

impl MysqlAdapter {
    fn session_variables(call: &ProcedureCall<'_>) -> SqlQuery {
        let names: Vec<String> = call
            .outputs()
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_cursor())
            .map(|(i, _)| format!("@_{}_{}", call.name(), call.arg_position(i, false)))
            .collect();
        SqlQuery::from(format!("SELECT {}", names.join(", ")))
    }

    fn run(conn: &mut dyn DriverConnection, call: &ProcedureCall<'_>) -> Result<Vec<OutParam>> {
        let reply = conn.call_procedure(call.name(), &call.placeholder_args())?;

        let scalars = if call.scalar_count() > 0 {
            let select = Self::session_variables(call);
            // Session variable names never carry markers
            let rendered = select.render(ParamStyle::Pyformat);
            let row = conn
                .execute(&rendered.sql, &rendered.params)?
                .result_set
                .and_then(|rows| rows.into_iter().next())
                .ok_or_else(|| ProcedureError::new(call.name(), "no output variables returned"))?;
            row.into_values()
        } else {
            Vec::new()
        };

        let inputs = call.inputs().len();
        call.assemble(
            |i| call.returned(&scalars, call.arg_position(i, false) - inputs),
            |k| Ok(result_set(&reply.result_sets, k)),
        )
    }
}

impl Adapter for MysqlAdapter {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn validate(&self, params: &ConnectParams) -> Result<()> {
        params.require(SERVER_KEYS)
    }

    fn connect_keywords(&self, params: &ConnectParams) -> Result<Keywords> {
        let mut keywords = server_keywords(params, "passwd", "db");
        let charset = params.charset.clone().unwrap_or_else(|| "utf8".to_string());
        keywords.insert("charset".to_string(), charset);
        Ok(keywords)
    }

    fn param_style(&self, _driver: &dyn Driver) -> ParamStyle {
        ParamStyle::Pyformat
    }

    fn insert_id_query(&self, _table: &str, _seqname: Option<&str>) -> Option<SqlQuery> {
        Some(SqlQuery::from("SELECT last_insert_id()"))
    }

    /// `last_insert_id()` reports the first id of a multi-row insert.
    fn bulk_insert_ids(&self, reported: i64, count: usize) -> Vec<i64> {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        (reported..reported.saturating_add(count)).collect()
    }

    fn call_proc(
        &self,
        conn: &mut dyn DriverConnection,
        name: &str,
        inputs: &[Value],
        outputs: &[OutParam],
    ) -> Result<Vec<OutParam>> {
        let call = ProcedureCall::new(name, inputs, outputs)?;
        Self::run(conn, &call).map_err(|e| call.fail(e))
    }
}
