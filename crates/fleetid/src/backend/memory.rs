use core::{fmt, time::Duration};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{
    SystemClock, TimeSource,
    backend::{BackendError, BackendResult, CoordinationBackend, KeyValue, LeaseId},
};

#[derive(Debug)]
struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

#[derive(Debug)]
struct Lease {
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Store {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    next_lease: LeaseId,
}

impl Store {
    /// Drops expired leases together with every entry bound to them.
    fn purge(&mut self, now: Instant) {
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.expires_at > now);
        if self.leases.len() == before {
            return;
        }
        let leases = &self.leases;
        self.entries.retain(|_, entry| match entry.lease {
            Some(id) => leases.contains_key(&id),
            None => true,
        });
    }

    fn live_lease(&mut self, id: LeaseId) -> BackendResult<&mut Lease> {
        self.leases
            .get_mut(&id)
            .ok_or(BackendError::LeaseNotFound(id))
    }
}

/// An in-process coordination backend with TTL leases.
///
/// Leases expire on the tokio clock, so tests can drive expiry with
/// `tokio::time::pause` and `advance`. Expired leases and the keys bound to
/// them are removed lazily on the next operation.
///
/// Clones share one store: several generator handles in one process
/// coordinate through it as if they were separate processes, and
/// `fleetid-kv-server` serves it over the network.
///
/// ```
/// use core::time::Duration;
/// use fleetid::{CoordinationBackend, MemoryBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// let lease = backend.grant_lease(Duration::from_secs(5)).await.unwrap();
/// backend.put("/UUID/workers/8192", "8192", Some(lease)).await.unwrap();
/// assert_eq!(
///     backend.get("/UUID/workers/8192").await.unwrap().as_deref(),
///     Some("8192")
/// );
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
    clock: Arc<dyn TimeSource>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Creates a backend whose [`server_time`] reads from `clock`.
    ///
    /// [`server_time`]: CoordinationBackend::server_time
    pub fn with_clock(clock: impl TimeSource + 'static) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            clock: Arc::new(clock),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let mut store = self.store.lock();
        store.purge(Instant::now());
        store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_now(&self, key: &str) -> Option<String> {
        let mut store = self.store.lock();
        store.purge(Instant::now());
        store.entries.get(key).map(|entry| entry.value.clone())
    }

    fn get_prefix_now(&self, prefix: &str) -> Vec<KeyValue> {
        let mut store = self.store.lock();
        store.purge(Instant::now());
        store
            .entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect()
    }

    fn put_now(&self, key: &str, value: &str, lease: Option<LeaseId>) -> BackendResult<()> {
        let mut store = self.store.lock();
        store.purge(Instant::now());
        if let Some(id) = lease {
            store.live_lease(id)?;
        }
        store.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                lease,
            },
        );
        Ok(())
    }

    fn grant_lease_now(&self, ttl: Duration) -> BackendResult<LeaseId> {
        if ttl.is_zero() {
            return Err(BackendError::InvalidRequest(
                "lease ttl must be greater than zero".into(),
            ));
        }
        let now = Instant::now();
        let expires_at = expiry(now, ttl)?;
        let mut store = self.store.lock();
        store.purge(now);
        store.next_lease += 1;
        let id = store.next_lease;
        store.leases.insert(id, Lease { ttl, expires_at });
        Ok(id)
    }

    fn keep_alive_now(&self, id: LeaseId) -> BackendResult<Duration> {
        let now = Instant::now();
        let mut store = self.store.lock();
        store.purge(now);
        let lease = store.live_lease(id)?;
        lease.expires_at = expiry(now, lease.ttl)?;
        Ok(lease.ttl)
    }
}

fn expiry(now: Instant, ttl: Duration) -> BackendResult<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| BackendError::InvalidRequest(format!("lease ttl {ttl:?} is out of range")))
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.lock();
        f.debug_struct("MemoryBackend")
            .field("entries", &store.entries.len())
            .field("leases", &store.leases.len())
            .finish_non_exhaustive()
    }
}

impl CoordinationBackend for MemoryBackend {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>> {
        futures::future::ready(Ok(self.get_now(key))).boxed()
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BackendResult<Vec<KeyValue>>> {
        futures::future::ready(Ok(self.get_prefix_now(prefix))).boxed()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        lease: Option<LeaseId>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        futures::future::ready(self.put_now(key, value, lease)).boxed()
    }

    fn grant_lease(&self, ttl: Duration) -> BoxFuture<'_, BackendResult<LeaseId>> {
        futures::future::ready(self.grant_lease_now(ttl)).boxed()
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, BackendResult<Duration>> {
        futures::future::ready(self.keep_alive_now(lease)).boxed()
    }

    fn server_time(&self) -> BoxFuture<'_, BackendResult<u64>> {
        futures::future::ready(Ok(self.clock.current_millis())).boxed()
    }
}
