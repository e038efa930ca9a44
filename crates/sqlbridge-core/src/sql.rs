//! Escaping primitives and the SQL query representation.
//!
//! A [`SqlQuery`] is an ordered list of raw text fragments and bound
//! parameters. Parameters never become part of the SQL text: rendering
//! replaces each one with the driver's marker and returns its value
//! separately, so user data cannot leak into the statement.
//!
//! ```
//! use sqlbridge_core::{ParamStyle, SqlQuery};
//!
//! let mut q = SqlQuery::from("SELECT * FROM users WHERE name = ");
//! q.push_bind("O'Brien");
//! let rendered = q.render(ParamStyle::Qmark);
//! assert_eq!(rendered.sql, "SELECT * FROM users WHERE name = ?");
//! ```

use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One bound value; renders as a marker and contributes its value to the
/// parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct Param(pub Value);

impl Param {
    pub fn new(value: impl Into<Value>) -> Self {
        Param(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Trusted SQL text that is spliced in verbatim, e.g. `NOW()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal(String);

impl Literal {
    pub fn new(sql: impl Into<String>) -> Self {
        Literal(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A value supplied for a column or template variable: either data to bind
/// or a trusted literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Value(Value),
    Literal(Literal),
}

impl From<Literal> for Bind {
    fn from(l: Literal) -> Self {
        Bind::Literal(l)
    }
}

impl From<Value> for Bind {
    fn from(v: Value) -> Self {
        Bind::Value(v)
    }
}

macro_rules! bind_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Bind {
                fn from(v: $t) -> Self {
                    Bind::Value(Value::from(v))
                }
            }
        )*
    };
}

bind_from!(
    bool,
    i32,
    i64,
    u32,
    f64,
    String,
    &str,
    Vec<u8>,
    serde_json::Value,
    Vec<Value>,
    Vec<i64>,
    Vec<&str>,
);

/// Variables available to templates and `Where::Template` clauses.
pub type Vars = BTreeMap<String, Bind>;

/// A query element: raw SQL text or a bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlPart {
    Raw(String),
    Param(Param),
}

impl From<&str> for SqlPart {
    fn from(s: &str) -> Self {
        SqlPart::Raw(s.to_string())
    }
}

impl From<String> for SqlPart {
    fn from(s: String) -> Self {
        SqlPart::Raw(s)
    }
}

impl From<Param> for SqlPart {
    fn from(p: Param) -> Self {
        SqlPart::Param(p)
    }
}

impl From<Literal> for SqlPart {
    fn from(l: Literal) -> Self {
        SqlPart::Raw(l.0)
    }
}

/// Marker convention a driver expects for bound parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamStyle {
    /// `?`
    Qmark,
    /// `:1` for every parameter. Legacy numeric drivers bind by position,
    /// so the marker never increments.
    Numeric,
    /// `%s`
    Format,
    /// `%s`, as used by pyformat-style drivers for positional binds
    Pyformat,
}

impl ParamStyle {
    pub fn marker(self) -> &'static str {
        match self {
            ParamStyle::Qmark => "?",
            ParamStyle::Numeric => ":1",
            ParamStyle::Format | ParamStyle::Pyformat => "%s",
        }
    }

    /// Whether `%` in raw text collides with the marker.
    pub fn escapes_percent(self) -> bool {
        matches!(self, ParamStyle::Format | ParamStyle::Pyformat)
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamStyle::Qmark => "qmark",
            ParamStyle::Numeric => "numeric",
            ParamStyle::Format => "format",
            ParamStyle::Pyformat => "pyformat",
        }
    }
}

impl FromStr for ParamStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qmark" => Ok(ParamStyle::Qmark),
            "numeric" => Ok(ParamStyle::Numeric),
            "format" => Ok(ParamStyle::Format),
            "pyformat" => Ok(ParamStyle::Pyformat),
            other => Err(Error::UnsupportedParamStyle(other.to_string())),
        }
    }
}

impl fmt::Display for ParamStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL text plus the ordered values for its markers.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// An ordered sequence of raw SQL fragments and bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    parts: Vec<SqlPart>,
}

impl SqlQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query holding a single bound parameter.
    pub fn param(value: impl Into<Value>) -> Self {
        Self {
            parts: vec![SqlPart::Param(Param::new(value))],
        }
    }

    pub fn parts(&self) -> &[SqlPart] {
        &self.parts
    }

    /// True when the query has no parts or only empty text.
    pub fn is_empty(&self) -> bool {
        self.parts
            .iter()
            .all(|p| matches!(p, SqlPart::Raw(s) if s.is_empty()))
    }

    /// Append raw text or a parameter.
    pub fn append(&mut self, part: impl Into<SqlPart>) -> &mut Self {
        match part.into() {
            SqlPart::Raw(s) if s.is_empty() => {}
            part => self.parts.push(part),
        }
        self
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.append(sql)
    }

    /// Append a value as a bound parameter, or a literal verbatim.
    pub fn push_bind(&mut self, bind: impl Into<Bind>) -> &mut Self {
        let quoted = sqlquote(bind);
        self.push_query(quoted)
    }

    /// Append every part of another query.
    pub fn push_query(&mut self, other: SqlQuery) -> &mut Self {
        self.parts.extend(other.parts);
        self
    }

    /// Concatenate two queries into a new one.
    pub fn concat(&self, other: &SqlQuery) -> SqlQuery {
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        SqlQuery { parts }
    }

    /// Join queries with a separator, skipping empty items.
    pub fn join<I, Q>(items: I, sep: &str) -> SqlQuery
    where
        I: IntoIterator<Item = Q>,
        Q: Into<SqlQuery>,
    {
        Self::join_wrapped(items, sep, "", "")
    }

    /// Join queries with a separator and wrap the result in `prefix`/`suffix`.
    pub fn join_wrapped<I, Q>(items: I, sep: &str, prefix: &str, suffix: &str) -> SqlQuery
    where
        I: IntoIterator<Item = Q>,
        Q: Into<SqlQuery>,
    {
        let mut target = SqlQuery::new();
        target.push(prefix);
        let mut first = true;
        for item in items {
            let item = item.into();
            if item.is_empty() {
                continue;
            }
            if !first {
                target.push(sep);
            }
            first = false;
            target.push_query(item);
        }
        target.push(suffix);
        target
    }

    /// The parameter values in marker order.
    pub fn values(&self) -> Vec<Value> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                SqlPart::Param(param) => Some(param.0.clone()),
                SqlPart::Raw(_) => None,
            })
            .collect()
    }

    /// Render into marker-style text plus the ordered parameter values.
    pub fn render(&self, style: ParamStyle) -> RenderedSql {
        let mut sql = String::new();
        let mut params = Vec::new();
        for part in &self.parts {
            match part {
                SqlPart::Raw(text) if style.escapes_percent() => push_escaped(&mut sql, text),
                SqlPart::Raw(text) => sql.push_str(text),
                SqlPart::Param(param) => {
                    sql.push_str(style.marker());
                    params.push(param.0.clone());
                }
            }
        }
        RenderedSql { sql, params }
    }
}

/// Append `text`, doubling every `%` that is not already half of a `%%`.
fn push_escaped(sql: &mut String, text: &str) {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            chars.next_if_eq(&'%');
            sql.push_str("%%");
        } else {
            sql.push(c);
        }
    }
}

impl From<&str> for SqlQuery {
    fn from(s: &str) -> Self {
        let mut q = SqlQuery::new();
        q.push(s);
        q
    }
}

impl From<String> for SqlQuery {
    fn from(s: String) -> Self {
        let mut q = SqlQuery::new();
        q.append(s);
        q
    }
}

impl From<Param> for SqlQuery {
    fn from(p: Param) -> Self {
        SqlQuery {
            parts: vec![SqlPart::Param(p)],
        }
    }
}

impl From<Literal> for SqlQuery {
    fn from(l: Literal) -> Self {
        SqlQuery::from(l.0)
    }
}

impl std::ops::Add for SqlQuery {
    type Output = SqlQuery;

    fn add(mut self, rhs: SqlQuery) -> SqlQuery {
        self.parts.extend(rhs.parts);
        self
    }
}

impl std::ops::Add<&str> for SqlQuery {
    type Output = SqlQuery;

    fn add(mut self, rhs: &str) -> SqlQuery {
        self.push(rhs);
        self
    }
}

impl std::ops::AddAssign for SqlQuery {
    fn add_assign(&mut self, rhs: SqlQuery) {
        self.parts.extend(rhs.parts);
    }
}

impl std::ops::AddAssign<&str> for SqlQuery {
    fn add_assign(&mut self, rhs: &str) {
        self.push(rhs);
    }
}

/// Debug rendering with values shown inline as SQL literals. Only for logs.
impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                SqlPart::Raw(text) => f.write_str(text)?,
                SqlPart::Param(param) => f.write_str(&sql_literal(&param.0))?,
            }
        }
        Ok(())
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "'t'".to_string(),
        Value::Bool(false) => "'f'".to_string(),
        Value::Int(n) => n.to_string(),
        Value::BigInt(n) => n.to_string(),
        Value::Double(n) => n.to_string(),
        Value::Decimal(s) => s.clone(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => format!("<{} bytes>", b.len()),
        Value::Date(d) => d.to_string(),
        Value::Timestamp(t) => t.to_string(),
        Value::Json(j) => format!("'{}'", j.to_string().replace('\'', "''")),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(sql_literal).collect();
            format!("({})", inner.join(", "))
        }
    }
}

/// Escape one value for splicing into a query.
///
/// Literals are kept verbatim, arrays become a parenthesised parameter
/// list and everything else becomes a single parameter.
pub fn sqlquote(bind: impl Into<Bind>) -> SqlQuery {
    match bind.into() {
        Bind::Literal(l) => SqlQuery::from(l),
        Bind::Value(Value::Array(items)) => {
            SqlQuery::join_wrapped(items.into_iter().map(SqlQuery::param), ", ", "(", ")")
        }
        Bind::Value(v) => SqlQuery::param(v),
    }
}

/// Comma-join identifiers: `["a", "b"]` becomes `a, b`.
pub fn sqllist<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `(left v1 OR left v2 ...)`, or the always-false `1=2` for no values.
pub fn sqlors<I, B>(left: &str, values: I) -> SqlQuery
where
    I: IntoIterator<Item = B>,
    B: Into<Bind>,
{
    let terms: Vec<SqlQuery> = values
        .into_iter()
        .map(|v| SqlQuery::from(left) + sqlquote(v))
        .collect();
    if terms.is_empty() {
        return SqlQuery::from("1=2");
    }
    SqlQuery::join_wrapped(terms, " OR ", "(", ")")
}

/// `k1 = v1 AND k2 = v2 ...` with keys in sorted order.
pub fn sqlwhere(mapping: &BTreeMap<String, Bind>, grouping: &str) -> SqlQuery {
    SqlQuery::join(
        mapping
            .iter()
            .map(|(k, v)| SqlQuery::from(format!("{k} = ")) + sqlquote(v.clone())),
        grouping,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample() -> SqlQuery {
        let mut q = SqlQuery::from("SELECT * FROM t WHERE a = ");
        q.push_bind(1).push(" AND b LIKE '5%' AND c = ").push_bind("x");
        q
    }

    #[rstest]
    #[case(ParamStyle::Qmark, "SELECT * FROM t WHERE a = ? AND b LIKE '5%' AND c = ?")]
    #[case(ParamStyle::Numeric, "SELECT * FROM t WHERE a = :1 AND b LIKE '5%' AND c = :1")]
    #[case(ParamStyle::Format, "SELECT * FROM t WHERE a = %s AND b LIKE '5%%' AND c = %s")]
    #[case(ParamStyle::Pyformat, "SELECT * FROM t WHERE a = %s AND b LIKE '5%%' AND c = %s")]
    fn render_marker_styles(#[case] style: ParamStyle, #[case] expected: &str) {
        let rendered = sample().render(style);
        assert_eq!(rendered.sql, expected);
        assert_eq!(rendered.params, vec![Value::Int(1), Value::Text("x".into())]);
    }

    #[test]
    fn numeric_marker_never_increments() {
        let mut q = SqlQuery::new();
        q.push_bind(1).push(", ").push_bind(2).push(", ").push_bind(3);
        assert_eq!(q.render(ParamStyle::Numeric).sql, ":1, :1, :1");
    }

    #[test]
    fn already_escaped_percent_is_left_alone() {
        let q = SqlQuery::from("SELECT '100%%' FROM t");
        assert_eq!(q.render(ParamStyle::Format).sql, "SELECT '100%%' FROM t");
    }

    #[test]
    fn lone_percent_is_doubled_next_to_escaped_ones() {
        let q = SqlQuery::from("x LIKE 'a%' AND y LIKE 'b%%' AND z = ") + SqlQuery::param(1);
        let r = q.render(ParamStyle::Format);
        assert_eq!(r.sql, "x LIKE 'a%%' AND y LIKE 'b%%' AND z = %s");
        assert_eq!(
            SqlQuery::from("'%%%'").render(ParamStyle::Pyformat).sql,
            "'%%%%'"
        );
        assert_eq!(
            SqlQuery::from("'a%'").render(ParamStyle::Qmark).sql,
            "'a%'"
        );
    }

    #[test]
    fn render_is_idempotent() {
        let q = sample();
        assert_eq!(q.render(ParamStyle::Format), q.render(ParamStyle::Format));
    }

    #[test]
    fn metacharacters_stay_out_of_sql_text() {
        let nasty = "x'; DROP TABLE t; -- %s \\";
        let mut q = SqlQuery::from("SELECT * FROM t WHERE name = ");
        q.push_bind(nasty);
        for style in [ParamStyle::Qmark, ParamStyle::Numeric, ParamStyle::Format] {
            let rendered = q.render(style);
            assert!(!rendered.sql.contains("DROP"));
            assert_eq!(rendered.params, vec![Value::Text(nasty.to_string())]);
        }
    }

    #[test]
    fn concat_concatenates_text_and_values() {
        let a = SqlQuery::from("a = ") + SqlQuery::param(1);
        let b = SqlQuery::from(" AND b = ") + SqlQuery::param(2);
        let joined = a.concat(&b);
        let ra = a.render(ParamStyle::Qmark);
        let rb = b.render(ParamStyle::Qmark);
        let rj = joined.render(ParamStyle::Qmark);
        assert_eq!(rj.sql, format!("{}{}", ra.sql, rb.sql));
        assert_eq!(rj.params, [ra.params, rb.params].concat());
    }

    #[test]
    fn join_skips_empty_items_and_wraps() {
        let q = SqlQuery::join_wrapped(
            vec![SqlQuery::from("a"), SqlQuery::new(), SqlQuery::param(2)],
            ", ",
            "(",
            ")",
        );
        assert_eq!(q.render(ParamStyle::Qmark).sql, "(a, ?)");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(SqlQuery::param("a"), SqlQuery::param("a"));
        assert_ne!(SqlQuery::param("a"), SqlQuery::param("b"));
        assert_eq!(Param::new(1), Param(Value::Int(1)));
    }

    #[test]
    fn literal_is_spliced_verbatim() {
        let mut q = SqlQuery::from("UPDATE t SET ts = ");
        q.push_bind(Literal::new("NOW()"));
        let r = q.render(ParamStyle::Qmark);
        assert_eq!(r.sql, "UPDATE t SET ts = NOW()");
        assert!(r.params.is_empty());
    }

    #[test]
    fn sqlquote_expands_arrays() {
        let q = sqlquote(vec![1_i64, 2, 3]);
        let r = q.render(ParamStyle::Qmark);
        assert_eq!(r.sql, "(?, ?, ?)");
        assert_eq!(r.params.len(), 3);
    }

    #[test]
    fn helpers() {
        assert_eq!(sqllist(&["a", "b", "c"]), "a, b, c");
        assert_eq!(
            sqlors("foo = ", [1, 2]).render(ParamStyle::Qmark).sql,
            "(foo = ? OR foo = ?)"
        );
        assert_eq!(sqlors("foo = ", Vec::<i32>::new()).to_string(), "1=2");

        let mut m = BTreeMap::new();
        m.insert("b".to_string(), Bind::from(2));
        m.insert("a".to_string(), Bind::from("x"));
        let w = sqlwhere(&m, " AND ");
        assert_eq!(w.render(ParamStyle::Qmark).sql, "a = ? AND b = ?");
        assert_eq!(w.to_string(), "a = 'x' AND b = 2");
    }

    #[test]
    fn paramstyle_names() {
        assert_eq!("qmark".parse::<ParamStyle>().unwrap(), ParamStyle::Qmark);
        assert_eq!("PyFormat".parse::<ParamStyle>().unwrap(), ParamStyle::Pyformat);
        assert!(matches!(
            "named".parse::<ParamStyle>(),
            Err(Error::UnsupportedParamStyle(ref s)) if s == "named"
        ));
    }
}
