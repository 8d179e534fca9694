//! Worker slot registration.
//!
//! A distributed generator owns its worker slot by holding the key
//! `"<namespace>/workers/<slot>"` under a TTL lease. The lease is renewed by a
//! background [`keep_lease_alive`] task for as long as the generator lives;
//! when the process dies the key disappears after one TTL and the slot can be
//! claimed again.

use core::{
    hash::{Hash, Hasher},
    time::Duration,
};
use std::{
    hash::DefaultHasher,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use portable_atomic::{AtomicBool, Ordering};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    Error, MAX_WORKER_ID, Result, WorkerSlot,
    backend::{CoordinationBackend, LeaseId, call},
};

/// Key under which `slot` is registered.
///
/// The slot is written in its pre-shifted form, so worker 1 lives at
/// `"/UUID/workers/8192"` in the default namespace.
pub fn worker_key(namespace: &str, slot: WorkerSlot) -> String {
    format!("{namespace}/workers/{slot}")
}

/// Picks a worker slot without coordination by hashing the current
/// high-resolution time.
///
/// The result lies in `[0, MAX_WORKER_ID)`. Nothing prevents two processes from
/// picking the same slot.
pub fn derive_worker_slot() -> WorkerSlot {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    nanos.hash(&mut hasher);
    WorkerSlot::truncating(hasher.finish() % u64::from(MAX_WORKER_ID))
}

/// A claimed worker slot.
///
/// The keeper task stops when the cancellation token handed to
/// [`WorkerRegistry::claim`] is cancelled.
#[derive(Debug)]
pub struct Registration {
    pub slot: WorkerSlot,
    pub lease: LeaseId,
    pub keeper: JoinHandle<()>,
    lost: Arc<AtomicBool>,
}

impl Registration {
    /// `true` once the keeper has given up renewing the lease.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }
}

/// Claims worker slots through a coordination backend.
pub struct WorkerRegistry {
    backend: Arc<dyn CoordinationBackend>,
    namespace: String,
    lease_ttl: Duration,
    request_timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(
        backend: Arc<dyn CoordinationBackend>,
        namespace: impl Into<String>,
        lease_ttl: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            lease_ttl,
            request_timeout,
        }
    }

    /// Claims `slot` for this process and starts renewing its lease.
    ///
    /// The key is looked up first; if a live peer holds it the claim fails
    /// without writing anything. Otherwise a lease is granted, the key is
    /// written under it, and the lease is renewed once before the keeper task
    /// takes over.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerCollision`] if the key already exists.
    /// - [`Error::CoordinationUnavailable`] if any backend call fails or times
    ///   out.
    pub async fn claim(
        &self,
        slot: WorkerSlot,
        shutdown: CancellationToken,
    ) -> Result<Registration> {
        let key = worker_key(&self.namespace, slot);
        let timeout = self.request_timeout;

        if call("get", timeout, self.backend.get(&key)).await?.is_some() {
            warn!(%key, "worker slot already registered");
            return Err(Error::WorkerCollision { key });
        }

        let lease = call(
            "grant_lease",
            timeout,
            self.backend.grant_lease(self.lease_ttl),
        )
        .await?;
        let value = slot.to_string();
        call("put", timeout, self.backend.put(&key, &value, Some(lease))).await?;
        call("keep_alive", timeout, self.backend.keep_alive(lease)).await?;
        info!(%key, lease, worker_id = slot.worker_id(), "claimed worker slot");

        let lost = Arc::new(AtomicBool::new(false));
        let keeper = tokio::spawn(keep_lease_alive(
            Arc::clone(&self.backend),
            key,
            lease,
            self.lease_ttl,
            timeout,
            Arc::clone(&lost),
            shutdown,
        ));

        Ok(Registration {
            slot,
            lease,
            keeper,
            lost,
        })
    }
}

/// Renews `lease` every `ttl / 3` until `shutdown` is cancelled.
///
/// A failed renewal is retried on the next tick. Once a full TTL has passed
/// without a successful renewal the lease must be assumed gone: the task marks
/// the registration as lost and exits.
pub(crate) async fn keep_lease_alive(
    backend: Arc<dyn CoordinationBackend>,
    key: String,
    lease: LeaseId,
    ttl: Duration,
    request_timeout: Duration,
    lost: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let period = (ttl / 3).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_renewed = Instant::now();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!(%key, lease, "lease keeper stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        match call("keep_alive", request_timeout, backend.keep_alive(lease)).await {
            Ok(remaining) => {
                last_renewed = Instant::now();
                debug!(%key, lease, ?remaining, "renewed worker lease");
            }
            Err(e) if last_renewed.elapsed() < ttl => {
                warn!(%key, lease, error = %e, "failed to renew worker lease; retrying");
            }
            Err(e) => {
                error!(%key, lease, error = %e, "worker registration lost");
                lost.store(true, Ordering::Release);
                return;
            }
        }
    }
}
