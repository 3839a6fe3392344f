//! # ConnectionPool: shared HTTP client plus in-flight limits.
//!
//! ```text
//! acquire(dest) ──► total semaphore ──► per-destination semaphore ──► PoolPermit
//! client()      ──► current generation (built lazily, rebuilt after dns_refresh)
//! close()       ──► drop the client; the next client() builds a new one
//! ```
//!
//! ## Rules
//! - The total permit is taken before the per-destination one, always in that order.
//! - A client generation older than `dns_refresh` is replaced on the next
//!   `client()` call; requests holding the old handle finish on it.
//! - Limits of `0` mean unbounded.
//! - A destination semaphore with no permits out and no waiters is evicted
//!   when a new destination is added, so the map tracks only live hosts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::TransportError;

struct Generation {
    client: reqwest::Client,
    born: Instant,
}

#[derive(Default)]
struct Clients {
    current: Option<Generation>,
    built: u64,
}

/// Held for the duration of one request; releases both slots on drop.
#[derive(Debug)]
pub struct PoolPermit {
    _total: Option<OwnedSemaphorePermit>,
    _dest: Option<OwnedSemaphorePermit>,
}

/// Lazily created, shareable HTTP connection pool.
pub struct ConnectionPool {
    cfg: PoolConfig,
    clients: Mutex<Clients>,
    total: Option<Arc<Semaphore>>,
    per_dest: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ConnectionPool {
    pub fn new(cfg: PoolConfig) -> Self {
        let total = cfg.total_limit().map(|n| Arc::new(Semaphore::new(n)));
        Self {
            cfg,
            clients: Mutex::new(Clients::default()),
            total,
            per_dest: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    /// Whether a client generation currently exists.
    pub fn is_open(&self) -> bool {
        self.clients.lock().current.is_some()
    }

    /// Number of clients built so far, counting rotations and rebuilds after close.
    pub fn generations(&self) -> u64 {
        self.clients.lock().built
    }

    /// Returns the current client, building one if none exists or the current
    /// one has outlived `dns_refresh`.
    pub fn client(&self) -> Result<reqwest::Client, TransportError> {
        let now = Instant::now();
        let mut clients = self.clients.lock();

        if let Some(generation) = clients.current.as_ref() {
            let stale = self
                .cfg
                .refresh_after()
                .is_some_and(|ttl| now.saturating_duration_since(generation.born) >= ttl);
            if !stale {
                return Ok(generation.client.clone());
            }
            tracing::debug!(generation = clients.built, "rotating http client after dns refresh interval");
        }

        let client = self.build()?;
        clients.current = Some(Generation {
            client: client.clone(),
            born: now,
        });
        clients.built += 1;
        Ok(client)
    }

    /// Waits for a free slot towards `dest` (`scheme://host:port`).
    pub async fn acquire(&self, dest: &str) -> Result<PoolPermit, TransportError> {
        let total = match &self.total {
            Some(sem) => Some(
                Arc::clone(sem)
                    .acquire_owned()
                    .await
                    .map_err(|_| TransportError::Closed)?,
            ),
            None => None,
        };

        let dest_sem = self.cfg.per_host_limit().map(|n| {
            let mut map = self.per_dest.lock();
            if let Some(sem) = map.get(dest) {
                return Arc::clone(sem);
            }
            // Only the map holds an idle semaphore: permits and waiters own clones.
            map.retain(|_, sem| Arc::strong_count(sem) > 1);
            let sem = Arc::new(Semaphore::new(n));
            map.insert(dest.to_string(), Arc::clone(&sem));
            sem
        });
        let dest = match dest_sem {
            Some(sem) => Some(sem.acquire_owned().await.map_err(|_| TransportError::Closed)?),
            None => None,
        };

        Ok(PoolPermit {
            _total: total,
            _dest: dest,
        })
    }

    /// Releases the client. Later calls to [`client`](Self::client) recreate it.
    pub fn close(&self) {
        if self.clients.lock().current.take().is_some() {
            tracing::debug!("http client released");
        }
    }

    fn build(&self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder().pool_idle_timeout(
            (!self.cfg.idle_timeout.is_zero()).then_some(self.cfg.idle_timeout),
        );
        if let Some(n) = self.cfg.per_host_limit() {
            builder = builder.pool_max_idle_per_host(n);
        }
        builder.build().map_err(|e| TransportError::Request {
            message: e.to_string(),
        })
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        ConnectionPool::new(PoolConfig::default())
    }
}
