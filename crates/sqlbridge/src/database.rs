//! The database handle and its statement requests.

use crate::adapters::Adapter;
use crate::context::{Context, ContextRegistry, ContextSpec, Nesting, Session};
use crate::environment::Environment;
use crate::transaction::Transaction;
use serde::Serialize;
use sqlbridge_core::{
    Bind, ConnectParams, Driver, Fingerprint, OutParam, ParamStyle, Result, Rows, SqlQuery, Value,
    Vars, reparam,
};
use sqlbridge_pool::{PoolConfig, PoolStats};
use sqlbridge_query::{ColumnValues, Delete, Insert, MultipleInsert, Select, Update, Where};
use std::fmt;
use std::sync::Arc;

/// Per-handle behaviour switches.
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Log every statement at debug level with its timing.
    pub log_queries: bool,
    /// Share connections through a pool. Ignored by dialects that hold a
    /// single connection.
    pub pooling: Option<PoolConfig>,
    /// Force bulk (`Some(true)`) or row-by-row (`Some(false)`) multi-row
    /// inserts; the dialect decides when unset.
    pub multiple_insert: Option<bool>,
    /// Treat nested transactions as no-ops; the dialect decides when unset.
    pub ignore_nested_transactions: Option<bool>,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn pooling(mut self, config: PoolConfig) -> Self {
        self.pooling = Some(config);
        self
    }

    pub fn multiple_insert(mut self, bulk: bool) -> Self {
        self.multiple_insert = Some(bulk);
        self
    }

    pub fn ignore_nested_transactions(mut self, ignore: bool) -> Self {
        self.ignore_nested_transactions = Some(ignore);
        self
    }
}

/// Outcome of a free-form statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Rows(Rows),
    Affected(u64),
}

impl QueryResult {
    /// The rows, or an empty set for a statement without a result.
    pub fn into_rows(self) -> Rows {
        match self {
            QueryResult::Rows(rows) => rows,
            QueryResult::Affected(_) => Rows::empty(),
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            QueryResult::Affected(n) => Some(*n),
            QueryResult::Rows(_) => None,
        }
    }
}

/// A handle to one database.
///
/// Handles are cheap to create; every handle with the same credentials
/// shares one [`Context`] and therefore one connection (or pool) and one
/// transaction stack.
///
/// ```ignore
/// let db = Database::open(ConnectParams::new("sqlite").db("app.db"), DatabaseOptions::new())?;
/// db.exec("CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT)")?;
/// let id = db.insert("person", [("name".to_string(), Bind::from("Ann"))].into()).execute()?;
/// let rows = db.select(["person"]).where_("name = $name").var("name", "Ann").fetch()?;
/// ```
pub struct Database {
    adapter: Arc<dyn Adapter>,
    spec: ContextSpec,
    contexts: ContextRegistry,
    options: DatabaseOptions,
}

impl Database {
    pub(crate) fn new(
        adapter: Arc<dyn Adapter>,
        driver: Arc<dyn Driver>,
        params: &ConnectParams,
        options: DatabaseOptions,
        contexts: ContextRegistry,
    ) -> Result<Self> {
        adapter.validate(params)?;
        let keywords = adapter.connect_keywords(params)?;
        let style = adapter.param_style(driver.as_ref());

        let pooling = match options.pooling.clone() {
            Some(_) if !adapter.supports_pooling() => {
                tracing::debug!(
                    dialect = adapter.name(),
                    "Dialect holds a single connection; pooling disabled"
                );
                None
            }
            pooling => pooling,
        };
        let ignore_nested = options
            .ignore_nested_transactions
            .unwrap_or(!adapter.supports_nested_transactions());

        let spec = ContextSpec {
            fingerprint: Fingerprint::derive(params),
            driver,
            keywords,
            pooling,
            nesting: if ignore_nested {
                Nesting::Ignore
            } else {
                Nesting::Savepoints
            },
            log_queries: options.log_queries,
            style,
            ping_query: adapter.ping_query(),
        };
        Ok(Self {
            adapter,
            spec,
            contexts,
            options,
        })
    }

    /// Open through the process-wide [`Environment`].
    pub fn open(params: ConnectParams, options: DatabaseOptions) -> Result<Self> {
        Environment::global().open(&params, options)
    }

    /// Open `dbn://user:pw@host:port/db` with default options.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::open(ConnectParams::from_url(url)?, DatabaseOptions::default())
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn param_style(&self) -> ParamStyle {
        self.spec.style
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.spec.fingerprint
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// The live shared context, created on first use or after an eviction.
    pub fn context(&self) -> Result<Arc<Context>> {
        self.contexts.acquire(&self.spec)
    }

    /// Identity of the current context.
    pub fn context_id(&self) -> Result<u64> {
        self.context().map(|ctx| ctx.id())
    }

    /// Statements executed on the current context.
    pub fn statement_count(&self) -> Result<u64> {
        self.context().map(|ctx| ctx.statement_count())
    }

    /// Counters of the current context's pool, when pooling is on.
    pub fn pool_stats(&self) -> Result<Option<PoolStats>> {
        self.context().map(|ctx| ctx.pool_stats())
    }

    fn run<T>(&self, op: impl FnOnce(&mut Session<'_>) -> Result<T>) -> Result<T> {
        self.context()?.run(op)
    }

    /// Interpolate `template` with `vars` and execute it.
    pub fn query(&self, template: &str, vars: &Vars) -> Result<QueryResult> {
        self.query_sql(&reparam(template, vars)?)
    }

    /// Execute a prebuilt query.
    pub fn query_sql(&self, query: &SqlQuery) -> Result<QueryResult> {
        self.run(|s| s.execute(query)).map(|execution| {
            match execution.result_set {
                Some(rows) => QueryResult::Rows(rows),
                None => QueryResult::Affected(execution.rows_affected),
            }
        })
    }

    /// Execute raw SQL without interpolation.
    pub fn exec(&self, sql: &str) -> Result<QueryResult> {
        self.query_sql(&SqlQuery::from(sql))
    }

    /// SELECT from one or more tables.
    pub fn select<I, S>(&self, tables: I) -> SelectRequest<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectRequest {
            db: self,
            select: Select::new(tables),
        }
    }

    /// SELECT rows of `table` whose columns equal the given values.
    pub fn where_(&self, table: &str, columns: ColumnValues) -> SelectRequest<'_> {
        let request = self.select([table]);
        if columns.is_empty() {
            return request;
        }
        request.where_(Where::Mapping(columns))
    }

    pub fn insert(&self, table: &str, values: ColumnValues) -> InsertRequest<'_> {
        InsertRequest {
            db: self,
            insert: Insert::new(table, values),
            seqname: None,
            no_id: false,
        }
    }

    pub fn multiple_insert(
        &self,
        table: &str,
        rows: Vec<ColumnValues>,
    ) -> MultipleInsertRequest<'_> {
        MultipleInsertRequest {
            db: self,
            insert: MultipleInsert::new(table, rows),
            seqname: None,
            no_id: false,
            bulk: None,
        }
    }

    pub fn update<I, S>(
        &self,
        tables: I,
        where_clause: impl Into<Where>,
        values: ColumnValues,
    ) -> UpdateRequest<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UpdateRequest {
            db: self,
            update: Update::new(tables, where_clause, values),
        }
    }

    /// DELETE from `table`; `None` deletes every row.
    pub fn delete(&self, table: &str, where_clause: Option<Where>) -> DeleteRequest<'_> {
        DeleteRequest {
            db: self,
            delete: Delete::new(table, where_clause),
        }
    }

    /// Call stored procedure `name`.
    ///
    /// `outputs` holds one [`OutParam::Type`] per output position; on
    /// success each is replaced by its scalar or, for cursors, its rows.
    /// On failure the slots are left untouched and the context is closed.
    pub fn call_proc(&self, name: &str, inputs: &[Value], outputs: &mut [OutParam]) -> Result<()> {
        if self.options.log_queries {
            tracing::debug!(
                procedure = name,
                inputs = inputs.len(),
                outputs = outputs.len(),
                "Calling procedure"
            );
        }
        let declared: &[OutParam] = outputs;
        let filled = self.run(|s| {
            let conn = s.conn()?;
            self.adapter.call_proc(conn, name, inputs, declared)
        })?;
        for (slot, value) in outputs.iter_mut().zip(filled) {
            *slot = value;
        }
        Ok(())
    }

    /// Open a transaction, nested inside any already open on this context.
    pub fn transaction(&self) -> Result<Transaction> {
        Transaction::begin(self.context()?)
    }

    /// Whether the database answers the adapter's ping query. A failed
    /// ping leaves the context in place.
    pub fn active(&self) -> bool {
        self.context().is_ok_and(|ctx| ctx.ping())
    }

    /// Close the current context and its connection. The next operation
    /// starts a fresh one.
    pub fn close(&self) {
        if let Some(ctx) = self.contexts.get(&self.spec.fingerprint) {
            self.contexts.evict(&ctx);
            ctx.close();
        }
    }

    /// First column of the first row of the adapter's id query, if the
    /// backend can tell.
    fn last_insert_id(
        &self,
        s: &mut Session<'_>,
        table: &str,
        seqname: Option<&str>,
    ) -> Result<Option<i64>> {
        let Some(query) = self.adapter.insert_id_query(table, seqname) else {
            return Ok(None);
        };
        let id = s
            .execute(&query)?
            .result_set
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.get(0).and_then(Value::as_i64));
        Ok(id)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.adapter.kind())
            .field("spec", &self.spec)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A SELECT being assembled.
#[must_use]
pub struct SelectRequest<'a> {
    db: &'a Database,
    select: Select,
}

impl SelectRequest<'_> {
    pub fn what(mut self, what: impl Into<String>) -> Self {
        self.select = self.select.what(what);
        self
    }

    pub fn where_(mut self, condition: impl Into<Where>) -> Self {
        self.select = self.select.where_(condition);
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.select = self.select.order(order);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.select = self.select.group(group);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.select = self.select.limit(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.select = self.select.offset(n);
        self
    }

    pub fn vars(mut self, vars: Vars) -> Self {
        self.select = self.select.vars(vars);
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.select = self.select.var(name, value);
        self
    }

    /// Render without executing.
    pub fn build(&self) -> Result<SqlQuery> {
        self.select.build_with_dialect(self.db.adapter.as_ref())
    }

    pub fn fetch(self) -> Result<Rows> {
        let query = self.build()?;
        self.db.query_sql(&query).map(QueryResult::into_rows)
    }

    /// The first row, if any.
    pub fn first(self) -> Result<Option<sqlbridge_core::Row>> {
        Ok(self.fetch()?.into_iter().next())
    }
}

/// An INSERT being assembled.
#[must_use]
pub struct InsertRequest<'a> {
    db: &'a Database,
    insert: Insert,
    seqname: Option<String>,
    no_id: bool,
}

impl InsertRequest<'_> {
    /// Sequence to read the generated id from.
    pub fn seqname(mut self, seqname: impl Into<String>) -> Self {
        self.seqname = Some(seqname.into());
        self
    }

    /// Skip reading back the generated id.
    pub fn no_id(mut self) -> Self {
        self.no_id = true;
        self
    }

    pub fn build(&self) -> Result<SqlQuery> {
        self.insert.build_with_dialect(self.db.adapter.as_ref())
    }

    /// Insert the row; returns the generated id when the backend reports
    /// one.
    pub fn execute(self) -> Result<Option<i64>> {
        let query = self.build()?;
        let db = self.db;
        db.run(|s| {
            s.execute(&query)?;
            if self.no_id {
                return Ok(None);
            }
            db.last_insert_id(s, self.insert.table(), self.seqname.as_deref())
        })
    }
}

/// A multi-row INSERT being assembled.
#[must_use]
pub struct MultipleInsertRequest<'a> {
    db: &'a Database,
    insert: MultipleInsert,
    seqname: Option<String>,
    no_id: bool,
    bulk: Option<bool>,
}

impl MultipleInsertRequest<'_> {
    pub fn seqname(mut self, seqname: impl Into<String>) -> Self {
        self.seqname = Some(seqname.into());
        self
    }

    pub fn no_id(mut self) -> Self {
        self.no_id = true;
        self
    }

    /// Force one statement (`true`) or one statement per row (`false`).
    pub fn bulk(mut self, bulk: bool) -> Self {
        self.bulk = Some(bulk);
        self
    }

    fn is_bulk(&self) -> bool {
        self.bulk
            .or(self.db.options.multiple_insert)
            .unwrap_or_else(|| self.db.adapter.multiple_insert_default())
    }

    /// Render without executing: one statement in bulk mode, one per row
    /// otherwise.
    pub fn build(&self) -> Result<Vec<SqlQuery>> {
        if self.is_bulk() {
            let query = self.insert.build_with_dialect(self.db.adapter.as_ref())?;
            return Ok(if query.is_empty() { Vec::new() } else { vec![query] });
        }
        self.insert
            .split()?
            .iter()
            .map(|insert| insert.build_with_dialect(self.db.adapter.as_ref()))
            .collect()
    }

    /// Insert every row. Returns one id per row, or `None` when ids were
    /// not requested or the backend cannot report them.
    pub fn execute(self) -> Result<Option<Vec<i64>>> {
        let statements = self.build()?;
        if statements.is_empty() {
            return Ok(if self.no_id { None } else { Some(Vec::new()) });
        }
        let db = self.db;
        let table = self.insert.table();
        let seqname = self.seqname.as_deref();
        let count = self.insert.rows().len();
        let bulk = self.is_bulk();

        db.run(|s| {
            let mut ids = Vec::with_capacity(count);
            for statement in &statements {
                s.execute(statement)?;
                if !self.no_id {
                    ids.push(db.last_insert_id(s, table, seqname)?);
                }
            }
            if self.no_id {
                return Ok(None);
            }
            if bulk {
                return Ok(ids
                    .first()
                    .copied()
                    .flatten()
                    .map(|reported| db.adapter.bulk_insert_ids(reported, count)));
            }
            Ok(ids.into_iter().collect::<Option<Vec<i64>>>())
        })
    }
}

/// An UPDATE being assembled.
#[must_use]
pub struct UpdateRequest<'a> {
    db: &'a Database,
    update: Update,
}

impl UpdateRequest<'_> {
    pub fn vars(mut self, vars: Vars) -> Self {
        self.update = self.update.vars(vars);
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.update = self.update.var(name, value);
        self
    }

    pub fn build(&self) -> Result<SqlQuery> {
        self.update.build()
    }

    /// Rows changed.
    pub fn execute(self) -> Result<u64> {
        let query = self.build()?;
        self.db
            .run(|s| s.execute(&query))
            .map(|execution| execution.rows_affected)
    }
}

/// A DELETE being assembled.
#[must_use]
pub struct DeleteRequest<'a> {
    db: &'a Database,
    delete: Delete,
}

impl DeleteRequest<'_> {
    pub fn using<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delete = self.delete.using(tables);
        self
    }

    pub fn vars(mut self, vars: Vars) -> Self {
        self.delete = self.delete.vars(vars);
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Bind>) -> Self {
        self.delete = self.delete.var(name, value);
        self
    }

    pub fn build(&self) -> Result<SqlQuery> {
        self.delete.build_with_dialect(self.db.adapter.as_ref())
    }

    /// Rows removed.
    pub fn execute(self) -> Result<u64> {
        let query = self.build()?;
        self.db
            .run(|s| s.execute(&query))
            .map(|execution| execution.rows_affected)
    }
}
