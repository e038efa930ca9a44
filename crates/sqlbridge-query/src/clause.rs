//! WHERE conditions and clause helpers.

use sqlbridge_core::{Bind, Literal, Result, SqlQuery, Value, Vars, reparam, sqlwhere};
use std::collections::BTreeMap;

/// A WHERE condition in any of its accepted shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    /// `id = <value>`
    Id(i64),
    /// Column equality terms ANDed in column order
    Mapping(BTreeMap<String, Bind>),
    /// A prebuilt query fragment
    Query(SqlQuery),
    /// A template interpolated with the builder's variables
    Template(String),
}

impl Where {
    /// Render the condition. An empty result means "no WHERE clause".
    pub fn to_query(&self, vars: &Vars) -> Result<SqlQuery> {
        Ok(match self {
            Where::Id(id) => SqlQuery::from("id = ") + SqlQuery::param(*id),
            Where::Mapping(m) => sqlwhere(m, " AND "),
            Where::Query(q) => q.clone(),
            Where::Template(t) => reparam(t, vars)?,
        })
    }

    /// A mapping condition built from `(column, value)` pairs.
    pub fn mapping<I, K, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, B)>,
        K: Into<String>,
        B: Into<Bind>,
    {
        Where::Mapping(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<i64> for Where {
    fn from(id: i64) -> Self {
        Where::Id(id)
    }
}

impl From<i32> for Where {
    fn from(id: i32) -> Self {
        Where::Id(i64::from(id))
    }
}

impl From<&str> for Where {
    fn from(t: &str) -> Self {
        Where::Template(t.to_string())
    }
}

impl From<String> for Where {
    fn from(t: String) -> Self {
        Where::Template(t)
    }
}

impl From<SqlQuery> for Where {
    fn from(q: SqlQuery) -> Self {
        Where::Query(q)
    }
}

impl From<BTreeMap<String, Bind>> for Where {
    fn from(m: BTreeMap<String, Bind>) -> Self {
        Where::Mapping(m)
    }
}

/// A column value as it appears in INSERT and UPDATE: literals verbatim,
/// anything else as exactly one parameter (arrays included).
pub(crate) fn column_value(bind: &Bind) -> SqlQuery {
    match bind {
        Bind::Literal(l) => SqlQuery::from(Literal::new(l.as_str())),
        Bind::Value(v) => SqlQuery::param(v.clone()),
    }
}

/// Prefix `keyword` to a non-empty fragment.
pub(crate) fn keyword(keyword: &str, body: SqlQuery) -> SqlQuery {
    if body.is_empty() {
        return SqlQuery::new();
    }
    SqlQuery::from(format!("{keyword} ")) + body
}

/// `LIMIT`/`OFFSET` values travel as parameters.
pub(crate) fn count_param(n: u64) -> SqlQuery {
    SqlQuery::param(Value::BigInt(i64::try_from(n).unwrap_or(i64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::ParamStyle;

    #[test]
    fn id_shorthand_binds_value() {
        let q = Where::from(5_i64).to_query(&Vars::new()).unwrap();
        let r = q.render(ParamStyle::Qmark);
        assert_eq!(r.sql, "id = ?");
        assert_eq!(r.params, vec![Value::BigInt(5)]);
    }

    #[test]
    fn mapping_sorts_columns() {
        let w = Where::mapping([("source", Bind::from(2)), ("crust", Bind::from("dewey"))]);
        let q = w.to_query(&Vars::new()).unwrap();
        assert_eq!(q.to_string(), "crust = 'dewey' AND source = 2");
    }

    #[test]
    fn empty_mapping_renders_nothing() {
        let w = Where::Mapping(BTreeMap::new());
        assert!(w.to_query(&Vars::new()).unwrap().is_empty());
    }

    #[test]
    fn template_uses_vars() {
        let mut vars = Vars::new();
        vars.insert("name".into(), Bind::from("Joe"));
        let q = Where::from("name = $name").to_query(&vars).unwrap();
        assert_eq!(q.render(ParamStyle::Qmark).sql, "name = ?");
        assert!(Where::from("name = $missing").to_query(&Vars::new()).is_err());
    }
}
