//! Query builders for INSERT, UPDATE, DELETE operations.

use crate::clause::{Where, column_value, keyword};
use crate::dialect::{BulkInsert, GenericDialect, SqlDialect};
use sqlbridge_core::error::{ConfigError, SchemaMismatchError};
use sqlbridge_core::{Bind, Error, Result, SqlQuery, Vars, sqllist};
use std::collections::BTreeMap;

/// One row of column values, ordered by column name.
pub type ColumnValues = BTreeMap<String, Bind>;

/// INSERT query builder.
#[derive(Debug, Clone)]
pub struct Insert {
    table: String,
    values: ColumnValues,
}

impl Insert {
    pub fn new(table: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            table: table.into(),
            values,
        }
    }

    /// Set one column.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn build(&self) -> Result<SqlQuery> {
        self.build_with_dialect(&GenericDialect)
    }

    /// `INSERT INTO t (a, b) VALUES (?, ?)`, or the dialect's default-values
    /// form when no columns are given.
    pub fn build_with_dialect<D: SqlDialect + ?Sized>(&self, dialect: &D) -> Result<SqlQuery> {
        if self.values.is_empty() {
            return Ok(SqlQuery::from(dialect.default_values_insert(&self.table)));
        }
        let columns: Vec<&str> = self.values.keys().map(String::as_str).collect();
        let mut q = SqlQuery::from(format!(
            "INSERT INTO {} ({}) VALUES ",
            self.table,
            sqllist(&columns)
        ));
        q.push_query(value_tuple(self.values.values()));
        Ok(q)
    }
}

/// Multi-row INSERT builder.
#[derive(Debug, Clone)]
pub struct MultipleInsert {
    table: String,
    rows: Vec<ColumnValues>,
}

impl MultipleInsert {
    pub fn new(table: impl Into<String>, rows: Vec<ColumnValues>) -> Self {
        Self {
            table: table.into(),
            rows,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rows(&self) -> &[ColumnValues] {
        &self.rows
    }

    /// Fail unless every row carries the same key set as the first.
    pub fn check_schema(&self) -> Result<()> {
        let Some(first) = self.rows.first() else {
            return Ok(());
        };
        let expected: Vec<&String> = first.keys().collect();
        for (i, row) in self.rows.iter().enumerate().skip(1) {
            if !row.keys().eq(expected.iter().copied()) {
                return Err(Error::SchemaMismatch(SchemaMismatchError {
                    table: self.table.clone(),
                    row: i,
                    expected: expected.iter().map(|k| (*k).clone()).collect(),
                    found: row.keys().cloned().collect(),
                }));
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Result<SqlQuery> {
        self.build_with_dialect(&GenericDialect)
    }

    /// One statement covering every row. Empty input renders nothing.
    pub fn build_with_dialect<D: SqlDialect + ?Sized>(&self, dialect: &D) -> Result<SqlQuery> {
        self.check_schema()?;
        let Some(first) = self.rows.first() else {
            return Ok(SqlQuery::new());
        };
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        let into = format!("INTO {} ({}) VALUES ", self.table, sqllist(&columns));

        let q = match dialect.bulk_insert() {
            BulkInsert::InsertAll => {
                let mut q = SqlQuery::from("INSERT ALL");
                for row in &self.rows {
                    q.push(" ");
                    q.push(&into);
                    q.push_query(value_tuple(row.values()));
                }
                q.push(" SELECT 1 FROM DUAL");
                q
            }
            BulkInsert::Tuples | BulkInsert::Unsupported => {
                let mut q = SqlQuery::from(format!("INSERT {into}"));
                q.push_query(SqlQuery::join(
                    self.rows.iter().map(|row| value_tuple(row.values())),
                    ", ",
                ));
                q
            }
        };
        Ok(q)
    }

    /// The rows as standalone inserts, for dialects without bulk support.
    pub fn split(&self) -> Result<Vec<Insert>> {
        self.check_schema()?;
        Ok(self
            .rows
            .iter()
            .map(|row| Insert::new(self.table.clone(), row.clone()))
            .collect())
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone)]
pub struct Update {
    tables: Vec<String>,
    where_clause: Where,
    values: ColumnValues,
    vars: Vars,
}

impl Update {
    pub fn new<I, S>(tables: I, where_clause: impl Into<Where>, values: ColumnValues) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            where_clause: where_clause.into(),
            values,
            vars: Vars::new(),
        }
    }

    pub fn vars(mut self, vars: Vars) -> Self {
        self.vars = vars;
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn build(&self) -> Result<SqlQuery> {
        if self.values.is_empty() {
            return Err(Error::Config(ConfigError {
                key: Some("values".to_string()),
                message: "update needs at least one column".to_string(),
            }));
        }
        let assignments = SqlQuery::join(
            self.values
                .iter()
                .map(|(k, v)| SqlQuery::from(format!("{k} = ")) + column_value(v)),
            ", ",
        );
        let mut q = SqlQuery::from(format!("UPDATE {} SET ", sqllist(&self.tables)));
        q.push_query(assignments);
        let condition = self.where_clause.to_query(&self.vars)?;
        if !condition.is_empty() {
            q.push(" ");
            q.push_query(keyword("WHERE", condition));
        }
        Ok(q)
    }
}

/// DELETE query builder.
#[derive(Debug, Clone)]
pub struct Delete {
    table: String,
    where_clause: Option<Where>,
    using: Vec<String>,
    vars: Vars,
}

impl Delete {
    pub fn new(table: impl Into<String>, where_clause: Option<Where>) -> Self {
        Self {
            table: table.into(),
            where_clause,
            using: Vec::new(),
            vars: Vars::new(),
        }
    }

    pub fn using<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.using = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn vars(mut self, vars: Vars) -> Self {
        self.vars = vars;
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn build(&self) -> Result<SqlQuery> {
        self.build_with_dialect(&GenericDialect)
    }

    pub fn build_with_dialect<D: SqlDialect + ?Sized>(&self, dialect: &D) -> Result<SqlQuery> {
        let mut q = SqlQuery::from(format!("DELETE FROM {}", self.table));
        if !self.using.is_empty() {
            if dialect.supports_delete_using() {
                q.push(&format!(" USING {}", sqllist(&self.using)));
            } else {
                tracing::warn!(
                    dialect = dialect.name(),
                    table = %self.table,
                    using = %sqllist(&self.using),
                    "Dialect has no DELETE ... USING; dropping the clause"
                );
            }
        }
        if let Some(w) = &self.where_clause {
            let condition = w.to_query(&self.vars)?;
            if !condition.is_empty() {
                q.push(" ");
                q.push_query(keyword("WHERE", condition));
            }
        }
        Ok(q)
    }
}

fn value_tuple<'a>(values: impl Iterator<Item = &'a Bind>) -> SqlQuery {
    SqlQuery::join_wrapped(values.map(column_value), ", ", "(", ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::{Literal, ParamStyle, Value};

    struct InsertAllDialect;

    impl SqlDialect for InsertAllDialect {
        fn name(&self) -> &str {
            "insert-all"
        }

        fn bulk_insert(&self) -> BulkInsert {
            BulkInsert::InsertAll
        }
    }

    struct NoUsing;

    impl SqlDialect for NoUsing {
        fn name(&self) -> &str {
            "no-using"
        }
    }

    fn row(pairs: &[(&str, Bind)]) -> ColumnValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insert_sorts_columns_and_keeps_literals() {
        let q = Insert::new(
            "foo",
            row(&[
                ("name", Bind::from("bob")),
                ("age", Bind::from(2)),
                ("created", Bind::from(Literal::new("NOW()"))),
            ]),
        )
        .build()
        .unwrap();
        assert_eq!(
            q.to_string(),
            "INSERT INTO foo (age, created, name) VALUES (2, NOW(), 'bob')"
        );
        let r = q.render(ParamStyle::Format);
        assert_eq!(
            r.sql,
            "INSERT INTO foo (age, created, name) VALUES (%s, NOW(), %s)"
        );
        assert_eq!(r.params, vec![Value::Int(2), Value::Text("bob".into())]);
    }

    #[test]
    fn insert_without_columns_uses_default_values() {
        let q = Insert::new("foo", ColumnValues::new()).build().unwrap();
        assert_eq!(q.to_string(), "INSERT INTO foo DEFAULT VALUES");
    }

    #[test]
    fn insert_binds_array_as_single_param() {
        let q = Insert::new("t", ColumnValues::new())
            .value("tags", vec!["a", "b"])
            .build()
            .unwrap();
        let r = q.render(ParamStyle::Qmark);
        assert_eq!(r.sql, "INSERT INTO t (tags) VALUES (?)");
        assert_eq!(r.params.len(), 1);
    }

    #[test]
    fn multiple_insert_tuples() {
        let rows = vec![
            row(&[("name", Bind::from("foo")), ("email", Bind::from("foo@example.com"))]),
            row(&[("name", Bind::from("bar")), ("email", Bind::from("bar@example.com"))]),
        ];
        let q = MultipleInsert::new("person", rows).build().unwrap();
        assert_eq!(
            q.to_string(),
            "INSERT INTO person (email, name) VALUES ('foo@example.com', 'foo'), ('bar@example.com', 'bar')"
        );
        assert_eq!(q.values().len(), 4);
    }

    #[test]
    fn multiple_insert_insert_all() {
        let rows = vec![
            row(&[("a", Bind::from(1)), ("b", Bind::from(2))]),
            row(&[("a", Bind::from(3)), ("b", Bind::from(4))]),
        ];
        let q = MultipleInsert::new("t", rows)
            .build_with_dialect(&InsertAllDialect)
            .unwrap();
        assert_eq!(
            q.render(ParamStyle::Numeric).sql,
            "INSERT ALL INTO t (a, b) VALUES (:1, :1) INTO t (a, b) VALUES (:1, :1) SELECT 1 FROM DUAL"
        );
    }

    #[test]
    fn multiple_insert_rejects_mixed_key_sets() {
        let rows = vec![
            row(&[("a", Bind::from(1)), ("b", Bind::from(2))]),
            row(&[("a", Bind::from(3)), ("c", Bind::from(4))]),
        ];
        let m = MultipleInsert::new("t", rows);
        let err = m.build().unwrap_err();
        match err {
            Error::SchemaMismatch(e) => {
                assert_eq!(e.row, 1);
                assert_eq!(e.expected, vec!["a", "b"]);
                assert_eq!(e.found, vec!["a", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(m.split().is_err());
    }

    #[test]
    fn multiple_insert_split_yields_single_inserts() {
        let rows = vec![
            row(&[("a", Bind::from(1))]),
            row(&[("a", Bind::from(3))]),
        ];
        let inserts = MultipleInsert::new("t", rows).split().unwrap();
        assert_eq!(inserts.len(), 2);
        assert_eq!(inserts[1].build().unwrap().to_string(), "INSERT INTO t (a) VALUES (3)");
    }

    #[test]
    fn update_renders_sorted_assignments() {
        let q = Update::new(
            ["foo"],
            "name = $name",
            row(&[
                ("name", Bind::from("bob")),
                ("age", Bind::from(2)),
                ("created", Bind::from(Literal::new("NOW()"))),
            ]),
        )
        .var("name", "Joseph")
        .build()
        .unwrap();
        let r = q.render(ParamStyle::Format);
        assert_eq!(
            r.sql,
            "UPDATE foo SET age = %s, created = NOW(), name = %s WHERE name = %s"
        );
        assert_eq!(
            r.params,
            vec![
                Value::Int(2),
                Value::Text("bob".into()),
                Value::Text("Joseph".into())
            ]
        );
    }

    #[test]
    fn update_without_condition_omits_where() {
        let q = Update::new(["t"], Where::Mapping(ColumnValues::new()), row(&[("a", Bind::from(1))]))
            .build()
            .unwrap();
        assert_eq!(q.to_string(), "UPDATE t SET a = 1");
    }

    #[test]
    fn update_needs_columns() {
        let err = Update::new(["t"], 1_i64, ColumnValues::new()).build();
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn delete_with_using_and_where() {
        let q = Delete::new("foo", Some(Where::from("name = $name")))
            .using(["bar"])
            .var("name", "Joe")
            .build()
            .unwrap();
        assert_eq!(q.to_string(), "DELETE FROM foo USING bar WHERE name = 'Joe'");
    }

    #[test]
    fn delete_drops_using_when_unsupported() {
        let q = Delete::new("foo", Some(Where::Id(3)))
            .using(["bar"])
            .build_with_dialect(&NoUsing)
            .unwrap();
        assert_eq!(q.render(ParamStyle::Qmark).sql, "DELETE FROM foo WHERE id = ?");
    }

    #[test]
    fn delete_everything() {
        let q = Delete::new("foo", None).build().unwrap();
        assert_eq!(q.to_string(), "DELETE FROM foo");
    }
}
