//! Connection pool
//!
//! Bounded pool of store connections with explicit init/teardown ownership.
//! The pool is constructed once at startup with [`PoolManager::initialize`]
//! (which fails fast when the store is unreachable) and torn down with
//! [`PoolManager::close`]. There is no implicit re-initialization: after
//! `close`, acquires fail until a new pool is built explicitly.
//!
//! The pool is generic over a [`ConnectionFactory`] so integration tests can
//! exercise acquire/release semantics without a live database.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Pool lifecycle and acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to open store connection: {0}")]
    Connect(String),
    #[error("connection pool is closed")]
    Closed,
    #[error("timed out after {0:?} waiting for a free connection")]
    AcquireTimeout(Duration),
}

/// Pool sizing configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections opened eagerly at initialization.
    pub min_size: u32,
    /// Hard upper bound on simultaneously leased + pooled connections.
    pub max_size: u32,
    /// Connections opened per growth step when the free list is empty.
    pub increment: u32,
    /// Upper bound on how long `acquire` waits at max size with none free.
    /// `None` blocks until a lease is returned.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            increment: 1,
            acquire_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Opens and closes store connections on behalf of the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: Send + 'static;

    async fn connect(&self) -> Result<Self::Conn, PoolError>;

    /// Close a connection during pool teardown. The default just drops it.
    async fn disconnect(&self, conn: Self::Conn) {
        drop(conn);
    }
}

/// Connection factory for PostgreSQL via sqlx.
pub struct PgConnectionFactory {
    database_url: String,
}

impl PgConnectionFactory {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Conn = PgConnection;

    async fn connect(&self) -> Result<PgConnection, PoolError> {
        PgConnection::connect(&self.database_url)
            .await
            .map_err(|e| PoolError::Connect(e.to_string()))
    }

    async fn disconnect(&self, conn: PgConnection) {
        if let Err(e) = conn.close().await {
            warn!(error = %e, "error closing store connection");
        }
    }
}

struct PoolShared<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    free: Mutex<Vec<F::Conn>>,
    total: AtomicU32,
    closed: AtomicBool,
}

impl<F: ConnectionFactory> PoolShared<F> {
    fn free_list(&self) -> MutexGuard<'_, Vec<F::Conn>> {
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Process-wide lifecycle manager for store connections.
pub struct PoolManager<F: ConnectionFactory> {
    shared: Arc<PoolShared<F>>,
}

/// Exclusively-owned connection borrowed from the pool.
///
/// Returned to the free list exactly once, when the lease is dropped. A lease
/// dropped after pool teardown discards its connection instead of re-pooling
/// it.
pub struct PoolLease<F: ConnectionFactory> {
    conn: Option<F::Conn>,
    shared: Arc<PoolShared<F>>,
    _permit: OwnedSemaphorePermit,
}

impl<F: ConnectionFactory> std::ops::Deref for PoolLease<F> {
    type Target = F::Conn;

    fn deref(&self) -> &F::Conn {
        self.conn.as_ref().expect("lease holds a connection until drop")
    }
}

impl<F: ConnectionFactory> std::ops::DerefMut for PoolLease<F> {
    fn deref_mut(&mut self) -> &mut F::Conn {
        self.conn.as_mut().expect("lease holds a connection until drop")
    }
}

impl<F: ConnectionFactory> Drop for PoolLease<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.shared.closed.load(Ordering::SeqCst) {
                self.shared.total.fetch_sub(1, Ordering::SeqCst);
                drop(conn);
            } else {
                self.shared.free_list().push(conn);
            }
        }
        // The semaphore permit is released when `_permit` drops, waking the
        // oldest waiter if any.
    }
}

impl<F: ConnectionFactory> PoolManager<F> {
    /// Create the pool and open `min_size` connections up front.
    ///
    /// Fails fast if the store is unreachable; nothing is retried here.
    pub async fn initialize(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        let mut initial = Vec::with_capacity(config.min_size as usize);
        for _ in 0..config.min_size {
            initial.push(factory.connect().await?);
        }

        info!(
            min = config.min_size,
            max = config.max_size,
            "connection pool initialized"
        );

        let total = initial.len() as u32;
        Ok(Self {
            shared: Arc::new(PoolShared {
                factory,
                semaphore: Arc::new(Semaphore::new(config.max_size as usize)),
                config,
                free: Mutex::new(initial),
                total: AtomicU32::new(total),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Borrow a connection, growing the pool up to `max_size` when none is
    /// free. At max size with none free this blocks until a lease is
    /// returned, bounded by `acquire_timeout` when one is configured. Waiter
    /// wake-up order is whatever the underlying semaphore provides.
    pub async fn acquire(&self) -> Result<PoolLease<F>, PoolError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let permit_fut = self.shared.semaphore.clone().acquire_owned();
        let permit = match self.shared.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, permit_fut)
                .await
                .map_err(|_| PoolError::AcquireTimeout(timeout))?,
            None => permit_fut.await,
        }
        .map_err(|_| PoolError::Closed)?;

        loop {
            if let Some(conn) = self.shared.free_list().pop() {
                debug!("reusing pooled connection");
                return Ok(self.lease(conn, permit));
            }
            if self.reserve_slot() {
                break;
            }
            // Every slot is claimed but none is pooled yet: another task is
            // mid-connect. Yield until its connection lands in the free list.
            tokio::task::yield_now().await;
        }

        let conn = match self.shared.factory.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.shared.total.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.grow_spares().await;

        debug!(total = self.shared.total.load(Ordering::SeqCst), "pool grew");
        Ok(self.lease(conn, permit))
    }

    /// Claim one connection slot, atomically, while the pool is below max
    /// size. The claim must precede the connect so concurrent growers cannot
    /// both pass a size check and overshoot the bound.
    fn reserve_slot(&self) -> bool {
        let max = self.shared.config.max_size;
        self.shared
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < max).then_some(total + 1)
            })
            .is_ok()
    }

    /// Return a lease to the pool. Dropping the lease is equivalent.
    pub fn release(lease: PoolLease<F>) {
        drop(lease);
    }

    /// Tear the pool down: drain and close every pooled connection.
    ///
    /// Outstanding leases are discarded when they drop. Subsequent acquires
    /// fail with [`PoolError::Closed`]; building a fresh pool via
    /// [`PoolManager::initialize`] is the only supported re-init path.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.semaphore.close();

        let drained: Vec<F::Conn> = self.shared.free_list().drain(..).collect();
        for conn in drained {
            self.shared.total.fetch_sub(1, Ordering::SeqCst);
            self.shared.factory.disconnect(conn).await;
        }
        info!("connection pool closed");
    }

    /// Current pool counters, for connectivity probes and logging.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.shared.total.load(Ordering::SeqCst),
            idle: self.shared.free_list().len() as u32,
        }
    }

    fn lease(&self, conn: F::Conn, permit: OwnedSemaphorePermit) -> PoolLease<F> {
        PoolLease {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        }
    }

    /// Open up to `increment - 1` spare connections while below max size.
    /// Each spare's slot is reserved before connecting. Spare failures
    /// degrade to a warning; the caller's lease already has its connection.
    async fn grow_spares(&self) {
        for _ in 1..self.shared.config.increment {
            if !self.reserve_slot() {
                break;
            }
            match self.shared.factory.connect().await {
                Ok(spare) => {
                    self.shared.free_list().push(spare);
                }
                Err(e) => {
                    self.shared.total.fetch_sub(1, Ordering::SeqCst);
                    warn!(error = %e, "failed to open spare connection");
                    break;
                }
            }
        }
    }
}

/// Pool counters snapshot
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pool size: {}, Idle: {}", self.size, self.idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as TestCounter;

    /// Factory whose "connections" are just sequence numbers.
    struct StubFactory {
        opened: TestCounter,
        fail: AtomicBool,
    }

    impl StubFactory {
        fn new() -> Self {
            Self {
                opened: TestCounter::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory for StubFactory {
        type Conn = u32;

        async fn connect(&self) -> Result<u32, PoolError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PoolError::Connect("store unreachable".into()));
            }
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn config(min: u32, max: u32) -> PoolConfig {
        PoolConfig {
            min_size: min,
            max_size: max,
            increment: 1,
            acquire_timeout: None,
        }
    }

    #[tokio::test]
    async fn initialize_opens_min_connections() {
        let pool = PoolManager::initialize(config(2, 3), StubFactory::new())
            .await
            .unwrap();
        let stats = pool.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.idle, 2);
    }

    #[tokio::test]
    async fn initialize_fails_fast_when_store_unreachable() {
        let factory = StubFactory::new();
        factory.fail.store(true, Ordering::SeqCst);
        let result = PoolManager::initialize(config(1, 3), factory).await;
        assert!(matches!(result, Err(PoolError::Connect(_))));
    }

    #[tokio::test]
    async fn fourth_acquire_blocks_until_release() {
        let pool = Arc::new(
            PoolManager::initialize(config(2, 3), StubFactory::new())
                .await
                .unwrap(),
        );

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().size, 3);

        // At max size with none free: the next acquire must park.
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|lease| *lease) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        PoolManager::release(a);
        let reused = waiter.await.unwrap().unwrap();
        assert!(reused < 3, "waiter should reuse a pooled connection");

        drop(b);
        drop(c);
    }

    #[tokio::test]
    async fn acquire_timeout_converts_wait_into_error() {
        let mut cfg = config(1, 1);
        cfg.acquire_timeout = Some(Duration::from_millis(20));
        let pool = PoolManager::initialize(cfg, StubFactory::new())
            .await
            .unwrap();

        let held = pool.acquire().await.unwrap();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::AcquireTimeout(_))));
        drop(held);
    }

    #[tokio::test]
    async fn release_makes_connection_available_again() {
        let pool = PoolManager::initialize(config(1, 1), StubFactory::new())
            .await
            .unwrap();

        let first = pool.acquire().await.unwrap();
        let id = *first;
        drop(first);

        let second = pool.acquire().await.unwrap();
        assert_eq!(*second, id);
    }

    #[tokio::test]
    async fn grows_by_increment() {
        let cfg = PoolConfig {
            min_size: 0,
            max_size: 4,
            increment: 3,
            acquire_timeout: None,
        };
        let pool = PoolManager::initialize(cfg, StubFactory::new())
            .await
            .unwrap();

        let lease = pool.acquire().await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.size, 3, "one leased plus two spares");
        assert_eq!(stats.idle, 2);
        drop(lease);
    }

    #[tokio::test]
    async fn concurrent_growth_never_exceeds_max_size() {
        /// Factory whose connects after the first are slow, holding a spare
        /// mid-connect while another acquirer races for the last slot.
        struct SlowFactory {
            opened: TestCounter,
        }

        #[async_trait]
        impl ConnectionFactory for SlowFactory {
            type Conn = u32;

            async fn connect(&self) -> Result<u32, PoolError> {
                let id = self.opened.fetch_add(1, Ordering::SeqCst);
                if id > 0 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok(id)
            }
        }

        let cfg = PoolConfig {
            min_size: 0,
            max_size: 2,
            increment: 2,
            acquire_timeout: None,
        };
        let factory = SlowFactory {
            opened: TestCounter::new(0),
        };
        let pool = Arc::new(PoolManager::initialize(cfg, factory).await.unwrap());

        let first = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = pool.acquire().await.unwrap();
        let first = first.await.unwrap().unwrap();

        // The second acquirer must wait for the in-flight spare instead of
        // opening a third connection.
        assert_eq!(pool.stats().size, 2);
        assert!(*first <= 1 && *second <= 1);
    }

    #[tokio::test]
    async fn acquire_after_close_fails() {
        let pool = PoolManager::initialize(config(1, 2), StubFactory::new())
            .await
            .unwrap();
        pool.close().await;

        assert_eq!(pool.stats().size, 0);
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn lease_dropped_after_close_is_discarded() {
        let pool = PoolManager::initialize(config(1, 2), StubFactory::new())
            .await
            .unwrap();
        let lease = pool.acquire().await.unwrap();
        pool.close().await;

        drop(lease);
        assert_eq!(pool.stats().size, 0);
        assert_eq!(pool.stats().idle, 0);
    }
}
