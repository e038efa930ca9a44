//! Shared connection contexts.
//!
//! A [`Context`] is keyed by the credential [`Fingerprint`] and shared by
//! every [`Database`](crate::Database) handle that connects with the same
//! credentials, across threads. It owns the live connection (or the pool
//! connections are checked out from), the transaction stack and the
//! statement counter.
//!
//! Statements on one context are serialized by its state lock. The
//! registry lock is held only for lookup and insertion, so a slow query
//! never blocks other fingerprints.
//!
//! Any failure while a context is in use is fatal for it: the innermost
//! open transaction is rolled back, the connection closed and the context
//! evicted, so the next caller with the same fingerprint starts fresh.

use sqlbridge_core::error::{TransactionError, TransactionErrorKind};
use sqlbridge_core::{
    Driver, DriverConnection, Error, Execution, Fingerprint, Keywords, ParamStyle, Result,
    SqlQuery,
};
use sqlbridge_pool::{Pool, PoolConfig, PoolStats, PooledConnection};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

type Slots = Mutex<HashMap<Fingerprint, Arc<Context>>>;

/// How transactions opened inside another transaction behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nesting {
    /// Nested levels map to savepoints.
    #[default]
    Savepoints,
    /// Nested levels are no-ops; only the outermost level reaches the
    /// database.
    Ignore,
}

/// Everything needed to create a context for one fingerprint.
#[derive(Clone)]
pub struct ContextSpec {
    pub fingerprint: Fingerprint,
    pub driver: Arc<dyn Driver>,
    pub keywords: Keywords,
    /// Share connections through a pool instead of holding one.
    pub pooling: Option<PoolConfig>,
    pub nesting: Nesting,
    /// Log every statement at debug level.
    pub log_queries: bool,
    pub style: ParamStyle,
    /// Statement used to check a connection is alive.
    pub ping_query: &'static str,
}

impl fmt::Debug for ContextSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSpec")
            .field("fingerprint", &self.fingerprint)
            .field("driver", &self.driver.name())
            .field("pooling", &self.pooling)
            .field("nesting", &self.nesting)
            .field("log_queries", &self.log_queries)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

enum Connector {
    Direct {
        driver: Arc<dyn Driver>,
        keywords: Keywords,
    },
    Pooled(Pool<Box<dyn DriverConnection>>),
}

impl Connector {
    fn new(spec: &ContextSpec) -> Result<Self> {
        let Some(config) = spec.pooling.clone() else {
            return Ok(Connector::Direct {
                driver: Arc::clone(&spec.driver),
                keywords: spec.keywords.clone(),
            });
        };
        let driver = Arc::clone(&spec.driver);
        let keywords = spec.keywords.clone();
        let ping_query = spec.ping_query;
        let pool = Pool::with_hooks(
            config,
            move || driver.connect(&keywords),
            move |conn: &mut Box<dyn DriverConnection>| conn.ping(ping_query).is_ok(),
            |conn: &mut Box<dyn DriverConnection>| {
                if let Err(e) = conn.close() {
                    tracing::warn!(error = %e, "Error while closing pooled connection");
                }
            },
        )?;
        Ok(Connector::Pooled(pool))
    }

    fn open(&self) -> Result<Link> {
        match self {
            Connector::Direct { driver, keywords } => driver.connect(keywords).map(Link::Owned),
            Connector::Pooled(pool) => pool.acquire().map(Link::Pooled),
        }
    }
}

enum Link {
    Owned(Box<dyn DriverConnection>),
    Pooled(PooledConnection<Box<dyn DriverConnection>>),
}

impl Link {
    fn conn(&mut self) -> &mut dyn DriverConnection {
        match self {
            Link::Owned(conn) => &mut **conn,
            Link::Pooled(conn) => &mut ***conn,
        }
    }

    fn is_pooled(&self) -> bool {
        matches!(self, Link::Pooled(_))
    }

    /// Close an owned connection, or let the pool close a pooled one.
    fn close(self, context: u64) {
        match self {
            Link::Owned(mut conn) => {
                if let Err(e) = conn.close() {
                    tracing::warn!(context, error = %e, "Error while closing connection");
                }
            }
            Link::Pooled(conn) => conn.discard(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameKind {
    Root,
    Savepoint(String),
    Ignored,
}

#[derive(Debug)]
struct Frame {
    id: u64,
    kind: FrameKind,
}

#[derive(Default)]
struct State {
    link: Option<Link>,
    frames: Vec<Frame>,
    statements: u64,
    next_frame: u64,
}

/// A connection context shared by fingerprint.
pub struct Context {
    id: u64,
    fingerprint: Fingerprint,
    connector: Connector,
    nesting: Nesting,
    log_queries: bool,
    style: ParamStyle,
    ping_query: &'static str,
    closed: AtomicBool,
    owner: Weak<Slots>,
    state: Mutex<State>,
}

impl Context {
    fn new(spec: &ContextSpec, owner: Weak<Slots>) -> Result<Self> {
        Ok(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            fingerprint: spec.fingerprint.clone(),
            connector: Connector::new(spec)?,
            nesting: spec.nesting,
            log_queries: spec.log_queries,
            style: spec.style,
            ping_query: spec.ping_query,
            closed: AtomicBool::new(false),
            owner,
            state: Mutex::new(State::default()),
        })
    }

    /// Process-unique identity; a replacement context gets a new one.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.connector, Connector::Pooled(_))
    }

    /// Pool counters, for pooled contexts.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        match &self.connector {
            Connector::Pooled(pool) => Some(pool.stats()),
            Connector::Direct { .. } => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Statements executed so far, failed ones included.
    pub fn statement_count(&self) -> u64 {
        self.lock().statements
    }

    /// Number of open transaction levels.
    pub fn depth(&self) -> usize {
        self.lock().frames.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Result<Session<'_>> {
        let state = self.lock();
        if self.is_closed() {
            return Err(context_closed());
        }
        Ok(Session { ctx: self, state })
    }

    /// Run `op` and commit afterwards unless a transaction is open.
    pub(crate) fn run<T>(&self, op: impl FnOnce(&mut Session<'_>) -> Result<T>) -> Result<T> {
        self.guarded(|s| {
            let value = op(s)?;
            s.autocommit()?;
            Ok(value)
        })
    }

    /// Run `op` with exclusive use of the context. On failure the context
    /// is torn down and evicted before the error is returned.
    pub(crate) fn guarded<T>(
        &self,
        op: impl FnOnce(&mut Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.session()?;
        match op(&mut session) {
            Ok(value) => {
                session.release_idle();
                Ok(value)
            }
            Err(e) => Err(session.abort(e)),
        }
    }

    /// Whether the connection answers a ping. A failed ping is reported,
    /// not treated as fatal: the context stays registered.
    pub fn ping(&self) -> bool {
        let Ok(mut session) = self.session() else {
            return false;
        };
        let query = self.ping_query;
        let alive = session.conn().and_then(|conn| conn.ping(query)).is_ok();
        session.release_idle();
        alive
    }

    /// Open a transaction level; returns its depth and frame id.
    pub(crate) fn begin(&self) -> Result<(usize, u64)> {
        self.guarded(|s| s.begin())
    }

    /// Commit or roll back the level at `depth`, discarding any levels
    /// opened above it.
    pub(crate) fn end(&self, depth: usize, frame: u64, commit: bool) -> Result<()> {
        let mut session = self.session()?;
        let kind = session.frame(depth, frame)?;
        match session.end(depth, &kind, commit) {
            Ok(()) => {
                session.release_idle();
                Ok(())
            }
            Err(e) => Err(session.abort(e)),
        }
    }

    /// Close the connection and refuse further use. Open transactions are
    /// abandoned without rollback; the database discards them with the
    /// connection.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        self.closed.store(true, Ordering::Release);
        state.frames.clear();
        if let Some(link) = state.link.take() {
            link.close(self.id);
        }
        drop(state);
        if let Connector::Pooled(pool) = &self.connector {
            pool.close();
        }
        tracing::debug!(context = self.id, "Closed context");
    }

    /// Remove this context from its registry, if it is still the one
    /// registered for its fingerprint.
    fn evict_self(&self) {
        let Some(slots) = self.owner.upgrade() else {
            return;
        };
        let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
        let registered = slots
            .get(&self.fingerprint)
            .is_some_and(|ctx| std::ptr::eq(Arc::as_ptr(ctx), self));
        if registered {
            slots.remove(&self.fingerprint);
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("pooled", &self.is_pooled())
            .field("nesting", &self.nesting)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Exclusive use of a context for the duration of one operation.
pub(crate) struct Session<'a> {
    ctx: &'a Context,
    state: MutexGuard<'a, State>,
}

impl Session<'_> {
    pub(crate) fn style(&self) -> ParamStyle {
        self.ctx.style
    }

    /// The live connection, opening or checking one out on first use.
    pub(crate) fn conn(&mut self) -> Result<&mut dyn DriverConnection> {
        let link = match self.state.link.take() {
            Some(link) => link,
            None => {
                let link = self.ctx.connector.open()?;
                tracing::debug!(
                    context = self.ctx.id,
                    pooled = link.is_pooled(),
                    "Acquired connection"
                );
                link
            }
        };
        Ok(self.state.link.insert(link).conn())
    }

    /// Execute one statement, counting and timing it.
    ///
    /// The counter goes up before anything else, so every attempt is
    /// counted: failed statements and those that found no connection
    /// included. The `statement` field logged for it is that count.
    pub(crate) fn execute(&mut self, query: &SqlQuery) -> Result<Execution> {
        self.state.statements += 1;
        let statement = self.state.statements;
        let rendered = query.render(self.ctx.style);
        let ctx = self.ctx;
        let started = Instant::now();
        let result = self
            .conn()
            .and_then(|conn| conn.execute(&rendered.sql, &rendered.params));
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) if ctx.log_queries => tracing::debug!(
                context = ctx.id,
                statement,
                elapsed_ms,
                sql = %query,
                "Executed statement"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(
                context = ctx.id,
                statement,
                elapsed_ms,
                sql = %query,
                error = %e,
                "Statement failed"
            ),
        }
        result
    }

    fn in_transaction(&self) -> bool {
        !self.state.frames.is_empty()
    }

    fn autocommit(&mut self) -> Result<()> {
        if self.in_transaction() {
            return Ok(());
        }
        match self.state.link.as_mut() {
            Some(link) => link.conn().commit(),
            None => Ok(()),
        }
    }

    /// Hand a pooled connection back once no transaction needs it.
    fn release_idle(&mut self) {
        if !self.in_transaction() && self.state.link.as_ref().is_some_and(Link::is_pooled) {
            self.state.link = None;
        }
    }

    fn begin(&mut self) -> Result<(usize, u64)> {
        let depth = self.state.frames.len();
        let kind = if depth == 0 {
            FrameKind::Root
        } else if self.ctx.nesting == Nesting::Ignore {
            FrameKind::Ignored
        } else {
            FrameKind::Savepoint(format!("sqlbridge_sp_{depth}"))
        };
        match &kind {
            FrameKind::Root => self.conn()?.begin()?,
            FrameKind::Savepoint(name) => self.conn()?.savepoint(name)?,
            FrameKind::Ignored => {}
        }
        self.state.next_frame += 1;
        let id = self.state.next_frame;
        tracing::debug!(context = self.ctx.id, depth, frame = ?kind, "Began transaction");
        self.state.frames.push(Frame { id, kind });
        Ok((depth, id))
    }

    fn frame(&self, depth: usize, id: u64) -> Result<FrameKind> {
        match self.state.frames.get(depth) {
            Some(frame) if frame.id == id => Ok(frame.kind.clone()),
            _ => Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyFinished,
                message: format!("transaction at depth {depth} is already finished"),
            })),
        }
    }

    fn end(&mut self, depth: usize, kind: &FrameKind, commit: bool) -> Result<()> {
        match (kind, commit) {
            (FrameKind::Root, true) => self.conn()?.commit()?,
            (FrameKind::Root, false) => self.conn()?.rollback()?,
            (FrameKind::Savepoint(name), true) => self.conn()?.release(name)?,
            (FrameKind::Savepoint(name), false) => self.conn()?.rollback_to(name)?,
            (FrameKind::Ignored, _) => {}
        }
        self.state.frames.truncate(depth);
        tracing::debug!(
            context = self.ctx.id,
            depth,
            committed = commit,
            "Finished transaction"
        );
        Ok(())
    }

    /// Roll back the innermost level, close the connection and evict the
    /// context. Returns `err` for the caller to propagate.
    fn abort(mut self, err: Error) -> Error {
        let ctx = self.ctx;
        let state = &mut *self.state;
        if let Some(link) = state.link.as_mut() {
            let conn = link.conn();
            let undone = match state.frames.last().map(|f| &f.kind) {
                Some(FrameKind::Savepoint(name)) => conn.rollback_to(name),
                Some(FrameKind::Ignored) => Ok(()),
                Some(FrameKind::Root) | None => conn.rollback(),
            };
            if let Err(e) = undone {
                tracing::warn!(context = ctx.id, error = %e, "Rollback after failure failed");
            }
        }
        if let Some(link) = state.link.take() {
            link.close(ctx.id);
        }
        state.frames.clear();
        ctx.closed.store(true, Ordering::Release);
        drop(self);

        if let Connector::Pooled(pool) = &ctx.connector {
            pool.close();
        }
        ctx.evict_self();
        tracing::warn!(context = ctx.id, error = %err, "Evicted context after failure");
        err
    }
}

fn context_closed() -> Error {
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::ContextClosed,
        message: "context was closed or evicted".to_string(),
    })
}

/// Contexts by fingerprint.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    slots: Arc<Slots>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Fingerprint, Arc<Context>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live context for `spec.fingerprint`, created if there is none
    /// or the registered one was closed.
    pub fn acquire(&self, spec: &ContextSpec) -> Result<Arc<Context>> {
        let mut slots = self.slots();
        if let Some(ctx) = slots.get(&spec.fingerprint) {
            if !ctx.is_closed() {
                return Ok(Arc::clone(ctx));
            }
        }
        let ctx = Arc::new(Context::new(spec, Arc::downgrade(&self.slots))?);
        tracing::info!(
            context = ctx.id,
            driver = spec.driver.name(),
            pooled = spec.pooling.is_some(),
            "Created context"
        );
        slots.insert(spec.fingerprint.clone(), Arc::clone(&ctx));
        Ok(ctx)
    }

    /// The registered context for `fingerprint`, if any.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Context>> {
        self.slots().get(fingerprint).cloned()
    }

    /// Remove `ctx` if it is the one registered for its fingerprint.
    pub fn evict(&self, ctx: &Arc<Context>) -> bool {
        let mut slots = self.slots();
        let registered = slots
            .get(&ctx.fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, ctx));
        if registered {
            slots.remove(&ctx.fingerprint);
        }
        registered
    }

    /// Close and forget every context.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Context>> = self.slots().drain().map(|(_, ctx)| ctx).collect();
        for ctx in drained {
            ctx.close();
        }
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, ScriptedDriver};
    use sqlbridge_core::ConnectParams;

    fn spec(driver: &ScriptedDriver) -> ContextSpec {
        ContextSpec {
            fingerprint: Fingerprint::derive(&ConnectParams::new("postgres").db("app")),
            driver: Arc::new(driver.clone()),
            keywords: Keywords::new(),
            pooling: None,
            nesting: Nesting::Savepoints,
            log_queries: true,
            style: ParamStyle::Qmark,
            ping_query: "SELECT 1",
        }
    }

    #[test]
    fn acquire_shares_by_fingerprint() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let registry = ContextRegistry::new();
        let a = registry.acquire(&spec(&driver)).unwrap();
        let b = registry.acquire(&spec(&driver)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        // Lazily connected
        assert_eq!(driver.connects(), 0);
    }

    #[test]
    fn run_commits_outside_transactions() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let ctx = ContextRegistry::new().acquire(&spec(&driver)).unwrap();
        ctx.run(|s| s.execute(&SqlQuery::from("UPDATE t SET a = 1")))
            .unwrap();
        assert_eq!(ctx.statement_count(), 1);
        assert_eq!(
            driver.events(),
            vec![
                Event::Connect,
                Event::execute("UPDATE t SET a = 1"),
                Event::Commit,
            ]
        );
    }

    #[test]
    fn nested_levels_use_numbered_savepoints() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let ctx = ContextRegistry::new().acquire(&spec(&driver)).unwrap();
        let (d0, f0) = ctx.begin().unwrap();
        let (d1, f1) = ctx.begin().unwrap();
        assert_eq!((d0, d1), (0, 1));
        ctx.end(d1, f1, false).unwrap();
        ctx.end(d0, f0, true).unwrap();
        assert_eq!(
            driver.events(),
            vec![
                Event::Connect,
                Event::Begin,
                Event::execute("SAVEPOINT sqlbridge_sp_1"),
                Event::execute("ROLLBACK TO SAVEPOINT sqlbridge_sp_1"),
                Event::Commit,
            ]
        );
    }

    #[test]
    fn finishing_twice_is_rejected_without_eviction() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let registry = ContextRegistry::new();
        let ctx = registry.acquire(&spec(&driver)).unwrap();
        let (d0, f0) = ctx.begin().unwrap();
        let (d1, f1) = ctx.begin().unwrap();
        ctx.end(d0, f0, true).unwrap();
        let err = ctx.end(d1, f1, true).unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyFinished,
                ..
            })
        ));
        assert!(!ctx.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failure_rolls_back_closes_and_evicts() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        driver.fail_when("boom");
        let registry = ContextRegistry::new();
        let ctx = registry.acquire(&spec(&driver)).unwrap();
        let (_, _) = ctx.begin().unwrap();
        let (_, _) = ctx.begin().unwrap();

        let err = ctx
            .run(|s| s.execute(&SqlQuery::from("SELECT boom")))
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert!(ctx.is_closed());
        assert!(registry.is_empty());
        assert_eq!(ctx.depth(), 0);
        assert_eq!(
            &driver.events()[3..],
            &[
                Event::execute("SELECT boom"),
                Event::execute("ROLLBACK TO SAVEPOINT sqlbridge_sp_1"),
                Event::Close,
            ]
        );

        let fresh = registry.acquire(&spec(&driver)).unwrap();
        assert_ne!(fresh.id(), ctx.id());
        assert!(matches!(
            ctx.begin(),
            Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::ContextClosed,
                ..
            }))
        ));
    }

    #[test]
    fn failed_statements_are_counted() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        driver.fail_when("boom");
        let ctx = ContextRegistry::new().acquire(&spec(&driver)).unwrap();
        ctx.run(|s| s.execute(&SqlQuery::from("SELECT 1"))).unwrap();
        ctx.run(|s| s.execute(&SqlQuery::from("SELECT boom")))
            .unwrap_err();
        assert_eq!(ctx.statement_count(), 2);
    }

    #[test]
    fn ignored_nesting_reaches_only_the_outer_level() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let mut spec = spec(&driver);
        spec.nesting = Nesting::Ignore;
        let ctx = ContextRegistry::new().acquire(&spec).unwrap();
        let (d0, f0) = ctx.begin().unwrap();
        let (d1, f1) = ctx.begin().unwrap();
        ctx.end(d1, f1, true).unwrap();
        ctx.end(d0, f0, false).unwrap();
        assert_eq!(
            driver.events(),
            vec![Event::Connect, Event::Begin, Event::Rollback]
        );
    }

    #[test]
    fn pooled_connections_return_after_autocommit() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let mut spec = spec(&driver);
        spec.pooling = Some(PoolConfig::new(2));
        let ctx = ContextRegistry::new().acquire(&spec).unwrap();
        assert!(ctx.is_pooled());
        for _ in 0..3 {
            ctx.run(|s| s.execute(&SqlQuery::from("SELECT 1"))).unwrap();
        }
        // One connection, reused through the pool
        assert_eq!(driver.connects(), 1);
        let stats = ctx.pool_stats().unwrap();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.idle_connections, 1);
    }

    #[test]
    fn close_all_closes_open_connections() {
        let driver = ScriptedDriver::new("scripted", ParamStyle::Qmark);
        let registry = ContextRegistry::new();
        let ctx = registry.acquire(&spec(&driver)).unwrap();
        ctx.run(|s| s.execute(&SqlQuery::from("SELECT 1"))).unwrap();
        registry.close_all();
        assert!(registry.is_empty());
        assert!(ctx.is_closed());
        assert_eq!(driver.closes(), 1);
    }
}
