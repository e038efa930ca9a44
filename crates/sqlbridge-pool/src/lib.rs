//! Blocking connection pool for SQLBridge.
//!
//! The pool hands out connections made by a caller-supplied factory and
//! takes them back when the [`PooledConnection`] guard drops. Checkout
//! blocks up to `acquire_timeout_ms` once `max_connections` are in use.
//!
//! Idle connections past `idle_timeout_ms`, or older than
//! `max_lifetime_ms`, are closed on the next checkout instead of being
//! handed out. Every connection the pool gives up on goes through the
//! closer hook, if one is set, before it is dropped.

use sqlbridge_core::{Error, Result};
use sqlbridge_core::error::{PoolError, PoolErrorKind};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections to maintain
    pub min_connections: usize,
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Connection idle timeout in milliseconds
    pub idle_timeout_ms: u64,
    /// Maximum time to wait for a connection in milliseconds
    pub acquire_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds
    pub max_lifetime_ms: u64,
    /// Test connections before giving them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 10,
            idle_timeout_ms: 600_000,   // 10 minutes
            acquire_timeout_ms: 30_000, // 30 seconds
            max_lifetime_ms: 1_800_000, // 30 minutes
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set minimum connections.
    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    /// Set idle timeout.
    pub fn idle_timeout(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Set max lifetime.
    pub fn max_lifetime(mut self, ms: u64) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(config_error("max_connections must be at least 1"));
        }
        if self.min_connections > self.max_connections {
            return Err(config_error(
                "min_connections cannot exceed max_connections",
            ));
        }
        Ok(())
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of active connections
    pub active_connections: usize,
    /// Number of pending acquire requests
    pub pending_requests: usize,
    /// Connections opened over the pool's lifetime
    pub connections_created: u64,
    /// Connections closed over the pool's lifetime
    pub connections_closed: u64,
}

type Factory<C> = dyn Fn() -> Result<C> + Send + Sync;
type Validator<C> = dyn Fn(&mut C) -> bool + Send + Sync;
type Closer<C> = dyn Fn(&mut C) + Send + Sync;

struct Idle<C> {
    conn: C,
    created_at: Instant,
    returned_at: Instant,
}

struct State<C> {
    idle: VecDeque<Idle<C>>,
    total: usize,
    pending: usize,
    created: u64,
    closed_count: u64,
    closed: bool,
}

struct Shared<C> {
    config: PoolConfig,
    factory: Box<Factory<C>>,
    validator: Option<Box<Validator<C>>>,
    closer: Option<Box<Closer<C>>>,
    state: Mutex<State<C>>,
    available: Condvar,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, idle: &Idle<C>, now: Instant) -> bool {
        now.duration_since(idle.returned_at) >= Duration::from_millis(self.config.idle_timeout_ms)
            || now.duration_since(idle.created_at)
                >= Duration::from_millis(self.config.max_lifetime_ms)
    }

    /// Run the closer hook and drop `conn`. Never called with the state
    /// lock held.
    fn close_conn(&self, mut conn: C) {
        if let Some(close) = &self.closer {
            close(&mut conn);
        }
    }

    /// Give up a slot whose connection was dropped or never opened.
    fn forget_one(&self) {
        let mut state = self.lock();
        state.total = state.total.saturating_sub(1);
        state.closed_count += 1;
        drop(state);
        self.available.notify_one();
    }
}

/// A blocking pool of connections of type `C`.
pub struct Pool<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Send> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

enum Next<C> {
    Reuse(Idle<C>),
    /// An expired idle connection, already uncounted, to be closed.
    Stale(C),
    Open,
}

impl<C: Send> Pool<C> {
    /// Create a pool that opens connections with `factory`.
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        Self::build(config, Box::new(factory), None, None)
    }

    /// Create a pool that checks connections with `validator` before
    /// handing them out (when `test_on_checkout` is set).
    pub fn with_validator<F, V>(config: PoolConfig, factory: F, validator: V) -> Result<Self>
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
        V: Fn(&mut C) -> bool + Send + Sync + 'static,
    {
        Self::build(config, Box::new(factory), Some(Box::new(validator)), None)
    }

    /// Like [`Pool::with_validator`], and runs `closer` on every
    /// connection the pool drops: expired, failing validation, discarded
    /// or drained by [`Pool::close`].
    pub fn with_hooks<F, V, K>(
        config: PoolConfig,
        factory: F,
        validator: V,
        closer: K,
    ) -> Result<Self>
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
        V: Fn(&mut C) -> bool + Send + Sync + 'static,
        K: Fn(&mut C) + Send + Sync + 'static,
    {
        Self::build(
            config,
            Box::new(factory),
            Some(Box::new(validator)),
            Some(Box::new(closer)),
        )
    }

    fn build(
        config: PoolConfig,
        factory: Box<Factory<C>>,
        validator: Option<Box<Validator<C>>>,
        closer: Option<Box<Closer<C>>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                factory,
                validator,
                closer,
                state: Mutex::new(State {
                    idle: VecDeque::new(),
                    total: 0,
                    pending: 0,
                    created: 0,
                    closed_count: 0,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Open connections until `min_connections` are idle.
    pub fn warm_up(&self) -> Result<()> {
        loop {
            {
                let mut state = self.shared.lock();
                if state.closed || state.total >= self.shared.config.min_connections {
                    return Ok(());
                }
                state.total += 1;
            }
            match (self.shared.factory)() {
                Ok(conn) => {
                    let now = Instant::now();
                    let mut state = self.shared.lock();
                    state.created += 1;
                    state.idle.push_back(Idle {
                        conn,
                        created_at: now,
                        returned_at: now,
                    });
                }
                Err(e) => {
                    self.shared.forget_one();
                    return Err(e);
                }
            }
        }
    }

    /// Check out a connection, opening one if below capacity.
    pub fn acquire(&self) -> Result<PooledConnection<C>> {
        let deadline =
            Instant::now() + Duration::from_millis(self.shared.config.acquire_timeout_ms);

        loop {
            let next = self.reserve(deadline)?;
            match next {
                Next::Reuse(mut idle) => {
                    let healthy = !self.shared.config.test_on_checkout
                        || self
                            .shared
                            .validator
                            .as_ref()
                            .is_none_or(|check| check(&mut idle.conn));
                    if !healthy {
                        tracing::debug!("Discarding connection that failed checkout test");
                        self.shared.close_conn(idle.conn);
                        self.shared.forget_one();
                        continue;
                    }
                    tracing::debug!(reused = true, "Pool checkout");
                    return Ok(PooledConnection {
                        conn: Some(idle.conn),
                        created_at: idle.created_at,
                        shared: Arc::clone(&self.shared),
                    });
                }
                Next::Stale(conn) => {
                    tracing::debug!("Closing expired idle connection");
                    self.shared.close_conn(conn);
                }
                Next::Open => match (self.shared.factory)() {
                    Ok(conn) => {
                        self.shared.lock().created += 1;
                        tracing::debug!(reused = false, "Pool checkout");
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            created_at: Instant::now(),
                            shared: Arc::clone(&self.shared),
                        });
                    }
                    Err(e) => {
                        self.shared.forget_one();
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Claim an idle connection or a free slot, waiting until `deadline`.
    fn reserve(&self, deadline: Instant) -> Result<Next<C>> {
        let mut state = self.shared.lock();
        loop {
            if state.closed {
                return Err(closed_error());
            }

            let now = Instant::now();
            if let Some(idle) = state.idle.pop_front() {
                if self.shared.expired(&idle, now) {
                    state.total = state.total.saturating_sub(1);
                    state.closed_count += 1;
                    return Ok(Next::Stale(idle.conn));
                }
                return Ok(Next::Reuse(idle));
            }

            if state.total < self.shared.config.max_connections {
                state.total += 1;
                return Ok(Next::Open);
            }

            let Some(remaining) = deadline.checked_duration_since(now) else {
                return Err(Error::Pool(PoolError {
                    kind: PoolErrorKind::Timeout,
                    message: format!(
                        "timed out after {}ms waiting for a connection",
                        self.shared.config.acquire_timeout_ms
                    ),
                }));
            };
            state.pending += 1;
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            state.pending -= 1;
        }
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
            pending_requests: state.pending,
            connections_created: state.created,
            connections_closed: state.closed_count,
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        self.shared.lock().total >= self.shared.config.max_connections
    }

    /// Close idle connections and refuse further checkouts. Connections
    /// still checked out are closed when returned.
    pub fn close(&self) {
        let drained: Vec<Idle<C>> = {
            let mut state = self.shared.lock();
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len());
            state.closed_count += drained.len() as u64;
            drained
        };
        self.shared.available.notify_all();
        for idle in drained {
            self.shared.close_conn(idle.conn);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

fn config_error(message: &str) -> Error {
    Error::Pool(PoolError {
        kind: PoolErrorKind::Config,
        message: message.to_string(),
    })
}

fn closed_error() -> Error {
    Error::Pool(PoolError {
        kind: PoolErrorKind::Closed,
        message: "pool is closed".to_string(),
    })
}

/// A connection borrowed from the pool; returned on drop.
pub struct PooledConnection<C> {
    conn: Option<C>,
    created_at: Instant,
    shared: Arc<Shared<C>>,
}

impl<C> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl<C> PooledConnection<C> {
    /// Close the connection instead of returning it.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.close_conn(conn);
            self.shared.forget_one();
        }
    }

    /// Take the connection out of the pool for good.
    pub fn into_inner(mut self) -> Option<C> {
        let conn = self.conn.take();
        if conn.is_some() {
            self.shared.forget_one();
        }
        conn
    }
}

impl<C> std::ops::Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is present until the guard is consumed")
    }
}

impl<C> std::ops::DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is present until the guard is consumed")
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let mut state = self.shared.lock();
        if state.closed {
            state.total = state.total.saturating_sub(1);
            state.closed_count += 1;
            drop(state);
            self.shared.close_conn(conn);
            return;
        }
        state.idle.push_back(Idle {
            conn,
            created_at: self.created_at,
            returned_at: Instant::now(),
        });
        drop(state);
        self.shared.available.notify_one();
    }
}
