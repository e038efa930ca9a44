//! SELECT statement builder.

use crate::clause::{Where, count_param, keyword};
use crate::dialect::{ClauseOrder, GenericDialect, SqlDialect};
use sqlbridge_core::{Bind, Result, SqlQuery, Vars, reparam, sqllist};

/// A SELECT query builder.
///
/// `what`, `order` and `group` are templates interpolated with the same
/// variables as a template WHERE condition, so `$name` references in any
/// of them become bound parameters.
#[derive(Debug, Clone)]
pub struct Select {
    tables: Vec<String>,
    what: String,
    where_clause: Option<Where>,
    order: Option<String>,
    group: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    vars: Vars,
}

impl Select {
    /// Select from one or more comma-joined tables.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            what: "*".to_string(),
            where_clause: None,
            order: None,
            group: None,
            limit: None,
            offset: None,
            vars: Vars::new(),
        }
    }

    pub fn what(mut self, what: impl Into<String>) -> Self {
        self.what = what.into();
        self
    }

    pub fn where_(mut self, condition: impl Into<Where>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Replace the template variables.
    pub fn vars(mut self, vars: Vars) -> Self {
        self.vars = vars;
        self
    }

    /// Add one template variable.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Render with plain SQL clause ordering.
    pub fn build(&self) -> Result<SqlQuery> {
        self.build_with_dialect(&GenericDialect)
    }

    /// Render for a specific dialect.
    pub fn build_with_dialect<D: SqlDialect + ?Sized>(&self, dialect: &D) -> Result<SqlQuery> {
        let what = reparam(&self.what, &self.vars)?;
        let from = keyword("FROM", SqlQuery::from(sqllist(&self.tables)));
        let condition = match &self.where_clause {
            Some(w) => w.to_query(&self.vars)?,
            None => SqlQuery::new(),
        };
        let group = self.template_clause("GROUP BY", self.group.as_deref())?;
        let order_body = match &self.order {
            Some(o) => reparam(o, &self.vars)?,
            None => SqlQuery::new(),
        };

        let clauses = match dialect.clause_order() {
            ClauseOrder::Standard => vec![
                keyword("SELECT", what),
                from,
                keyword("WHERE", condition),
                group,
                keyword("ORDER BY", order_body),
                self.limit.map_or_else(SqlQuery::new, |n| {
                    SqlQuery::from("LIMIT ") + count_param(n)
                }),
                self.offset.map_or_else(SqlQuery::new, |n| {
                    SqlQuery::from("OFFSET ") + count_param(n)
                }),
            ],
            ClauseOrder::Top => self.top_clauses(what, from, condition, group, order_body),
            ClauseOrder::RowNum => {
                let condition = match self.limit {
                    Some(n) if condition.is_empty() => {
                        SqlQuery::from(format!("ROWNUM <= {n}"))
                    }
                    Some(n) => {
                        SqlQuery::from("(") + condition + format!(") AND ROWNUM <= {n}").as_str()
                    }
                    None => condition,
                };
                vec![
                    keyword("SELECT", what),
                    from,
                    keyword("WHERE", condition),
                    group,
                    keyword("ORDER BY", order_body),
                    self.offset
                        .map_or_else(SqlQuery::new, |n| SqlQuery::from(format!("OFFSET {n} ROWS"))),
                ]
            }
            ClauseOrder::FirstSkip => {
                let mut head = SqlQuery::from("SELECT ");
                if let Some(n) = self.limit {
                    head.push(&format!("FIRST {n} "));
                }
                if let Some(n) = self.offset {
                    head.push(&format!("SKIP {n} "));
                }
                vec![
                    head + what,
                    from,
                    keyword("WHERE", condition),
                    group,
                    keyword("ORDER BY", order_body),
                ]
            }
        };

        Ok(SqlQuery::join(clauses, " "))
    }

    fn top_clauses(
        &self,
        what: SqlQuery,
        from: SqlQuery,
        condition: SqlQuery,
        group: SqlQuery,
        order_body: SqlQuery,
    ) -> Vec<SqlQuery> {
        let Some(offset) = self.offset else {
            let head = match self.limit {
                Some(n) => SqlQuery::from(format!("SELECT TOP {n} ")) + what,
                None => keyword("SELECT", what),
            };
            return vec![
                head,
                from,
                keyword("WHERE", condition),
                group,
                keyword("ORDER BY", order_body),
            ];
        };

        // OFFSET ... FETCH is only valid after an ORDER BY.
        let order_body = if order_body.is_empty() {
            SqlQuery::from("(SELECT NULL)")
        } else {
            order_body
        };
        let mut paging = SqlQuery::from(format!("OFFSET {offset} ROWS"));
        if let Some(n) = self.limit {
            paging.push(&format!(" FETCH NEXT {n} ROWS ONLY"));
        }
        vec![
            keyword("SELECT", what),
            from,
            keyword("WHERE", condition),
            group,
            keyword("ORDER BY", order_body),
            paging,
        ]
    }

    fn template_clause(&self, name: &str, text: Option<&str>) -> Result<SqlQuery> {
        match text {
            Some(t) => Ok(keyword(name, reparam(t, &self.vars)?)),
            None => Ok(SqlQuery::new()),
        }
    }
}
