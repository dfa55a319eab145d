//! Connection pool shared by every request of a mounted handler.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::conf::PoolConfig;
use crate::core::GatewayError::{self, ConnectionError};
use crate::core::PLUGIN_NAME;
use crate::driver::{ConnectTarget, Connection, Driver};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolLimits {
    pub max_idle: usize,
    /// 0 means unlimited.
    pub max_open: usize,
    /// `None` means connections never expire.
    pub max_lifetime: Option<Duration>,
}

impl From<&PoolConfig> for PoolLimits {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_idle: config.max_idle_conns,
            max_open: config.max_open_conns,
            max_lifetime: (!config.conn_max_lifetime.is_zero()).then_some(config.conn_max_lifetime),
        }
    }
}

struct IdleConn {
    conn: Box<dyn Connection>,
    created: Instant,
}

pub struct Pool {
    driver: Arc<dyn Driver>,
    target: ConnectTarget,
    limits: PoolLimits,
    idle: Mutex<Vec<IdleConn>>,
    open: Option<Arc<Semaphore>>,
    checked_out: AtomicUsize,
    closed: AtomicBool,
}

impl Pool {
    /// Builds the pool without touching the backend.
    pub fn new(driver: Arc<dyn Driver>, target: ConnectTarget, limits: PoolLimits) -> Arc<Self> {
        let open = (limits.max_open > 0).then(|| Arc::new(Semaphore::new(limits.max_open)));
        Arc::new(Self {
            driver,
            target,
            limits,
            idle: Mutex::new(Vec::new()),
            open,
            checked_out: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Checks out a connection, reusing an idle one when it has not outlived
    /// its lifetime. Waits when `max_open` connections are already out.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConn, GatewayError> {
        if self.is_closed() {
            return Err(closed());
        }
        let permit = match &self.open {
            Some(sem) => Some(Arc::clone(sem).acquire_owned().await.map_err(|_| closed())?),
            None => None,
        };

        while let Some(idle) = self.pop_idle() {
            if self.expired(idle.created) {
                debug!("{PLUGIN_NAME}: retiring expired idle connection");
                continue;
            }
            return Ok(self.checkout(idle.conn, idle.created, permit));
        }

        let conn = self
            .driver
            .connect(&self.target)
            .await
            .map_err(|e| ConnectionError(format!("failed to open connection: {e}")))?;
        Ok(self.checkout(conn, Instant::now(), permit))
    }

    /// Liveness probe bounded by `timeout`.
    pub async fn ping(self: &Arc<Self>, timeout: Duration) -> Result<(), GatewayError> {
        let probe = async {
            let mut conn = self.acquire().await?;
            conn.ping()
                .await
                .map_err(|e| ConnectionError(format!("ping failed: {e}")))
        };
        tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| ConnectionError(format!("ping timed out after {}ms", timeout.as_millis())))?
    }

    /// Drops idle connections and refuses further checkouts. Connections
    /// still checked out are dropped when they come back.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sem) = &self.open {
            sem.close();
        }
        let drained = match self.idle.lock() {
            Ok(mut idle) => std::mem::take(&mut *idle),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        info!(
            "{PLUGIN_NAME}: connection pool closed, {} idle connections dropped",
            drained.len()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    fn checkout(
        self: &Arc<Self>,
        conn: Box<dyn Connection>,
        created: Instant,
        permit: Option<OwnedSemaphorePermit>,
    ) -> PooledConn {
        self.checked_out.fetch_add(1, Ordering::SeqCst);
        PooledConn {
            pool: Arc::clone(self),
            conn: Some(conn),
            created,
            _permit: permit,
        }
    }

    fn pop_idle(&self) -> Option<IdleConn> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn expired(&self, created: Instant) -> bool {
        self.limits
            .max_lifetime
            .is_some_and(|lifetime| created.elapsed() >= lifetime)
    }

    fn release(&self, conn: Box<dyn Connection>, created: Instant) {
        self.checked_out.fetch_sub(1, Ordering::SeqCst);
        if self.is_closed() || self.expired(created) {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.limits.max_idle {
                idle.push(IdleConn { conn, created });
            }
        }
    }

    fn discard(&self) {
        self.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

fn closed() -> GatewayError {
    ConnectionError("pool is closed".to_string())
}

/// Builds the pool for a resolved config and probes the backend once.
pub async fn open_pool(
    driver: Arc<dyn Driver>,
    config: &PoolConfig,
    ping_timeout: Duration,
) -> Result<Arc<Pool>, GatewayError> {
    let target = config.connect_target();
    debug!("{PLUGIN_NAME}: connecting to {}", target.redacted());

    let limits = PoolLimits::from(config);
    let pool = Pool::new(driver, target, limits);
    pool.ping(ping_timeout).await?;

    info!(
        "{PLUGIN_NAME}: MaxConnLifetime set to {}s",
        config.conn_max_lifetime.as_secs()
    );
    info!("{PLUGIN_NAME}: MaxIdleConn set to {}", limits.max_idle);
    info!("{PLUGIN_NAME}: MaxOpenConn set to {}", limits.max_open);
    info!(
        "{PLUGIN_NAME}: query timeout set to {}ms",
        config.query_timeout.as_millis()
    );
    Ok(pool)
}

/// A checked-out connection. Returns to the pool on drop.
pub struct PooledConn {
    pool: Arc<Pool>,
    conn: Option<Box<dyn Connection>>,
    created: Instant,
    _permit: Option<OwnedSemaphorePermit>,
}

impl PooledConn {
    /// Drops the connection instead of returning it, for connections left in
    /// an unknown state.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            self.pool.discard();
        }
    }
}

impl Deref for PooledConn {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("PooledConn used after release")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("PooledConn used after release")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.created);
        }
    }
}
