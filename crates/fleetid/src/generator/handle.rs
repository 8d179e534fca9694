use std::sync::{Arc, OnceLock};

use portable_atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    ClockSkewMonitor, CoordinationBackend, Error, FleetId, GeneratorConfig, IdGenStatus,
    InitStatus, Lifecycle, Mode, MonotonicGuard, Result, SystemClock, TimeSource, WorkerRegistry,
    WorkerSlot, backend, derive_worker_slot, spawn_publisher,
};

struct Ready<T: TimeSource> {
    guard: MonotonicGuard<Arc<T>>,
    registration_lost: Option<Arc<AtomicBool>>,
}

/// A point-in-time view of a [`Generator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeneratorState {
    pub lifecycle: Lifecycle,
    pub worker_slot: Option<WorkerSlot>,
    /// Unix milliseconds stamped into the last ID, or `0` before the first.
    pub last_timestamp_ms: u64,
    pub sequence: u64,
    pub registration_lost: bool,
}

/// The ID generator handle.
///
/// A handle starts [`Lifecycle::Uninitialized`]. [`Self::initialize`] resolves
/// the worker slot (and in [`Mode::Distributed`] checks clock skew and claims
/// the slot), after which [`Self::generate`] may be called from any number of
/// threads. Background tasks (lease renewal, timestamp heartbeat) stop on
/// [`Self::shutdown`] or when the handle is dropped.
///
/// ```
/// use fleetid::{Generator, GeneratorConfig, InitStatus, Lifecycle};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fleetid::Result<()> {
/// let generator = Generator::new(GeneratorConfig::standalone().with_worker_id(42));
/// assert!(generator.generate().is_err());
///
/// assert_eq!(generator.initialize().await?, InitStatus::Initialized);
/// assert_eq!(generator.initialize().await?, InitStatus::AlreadyInitialized);
/// assert_eq!(generator.lifecycle(), Lifecycle::Ready);
///
/// let a = generator.generate()?;
/// let b = generator.generate()?;
/// assert!(a < b);
/// # Ok(())
/// # }
/// ```
pub struct Generator<T: TimeSource + 'static = SystemClock> {
    config: GeneratorConfig,
    time: Arc<T>,
    backend: Option<Arc<dyn CoordinationBackend>>,
    init: tokio::sync::Mutex<()>,
    lifecycle: AtomicU8,
    ready: OnceLock<Ready<T>>,
    shutdown: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Generator<SystemClock> {
    /// Creates a handle on the system clock. In [`Mode::Distributed`] the
    /// backend described by `config.backend` is connected during
    /// initialization.
    pub fn new(config: GeneratorConfig) -> Self {
        Self::from_parts(config, None, SystemClock)
    }

    /// Creates a handle that coordinates through `backend` instead of
    /// `config.backend`.
    pub fn with_backend(config: GeneratorConfig, backend: Arc<dyn CoordinationBackend>) -> Self {
        Self::from_parts(config, Some(backend), SystemClock)
    }
}

impl<T: TimeSource + 'static> Generator<T> {
    /// Creates a handle reading time from `time`.
    ///
    /// # ⚠️ Note
    /// In typical use cases, you should prefer [`Generator::new`] or
    /// [`Generator::with_backend`].
    pub fn from_parts(
        config: GeneratorConfig,
        backend: Option<Arc<dyn CoordinationBackend>>,
        time: T,
    ) -> Self {
        Self {
            config,
            time: Arc::new(time),
            backend,
            init: tokio::sync::Mutex::new(()),
            lifecycle: AtomicU8::new(Lifecycle::Uninitialized as u8),
            ready: OnceLock::new(),
            shutdown: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Brings the handle to [`Lifecycle::Ready`].
    ///
    /// Concurrent and repeated calls are serialized: exactly one performs the
    /// work, and every call that finds the handle ready returns
    /// [`InitStatus::AlreadyInitialized`] without touching the backend. A
    /// failed attempt leaves the handle [`Lifecycle::Uninitialized`] so the
    /// host may retry.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the configuration is invalid or the
    ///   handle was shut down.
    /// - [`Error::CoordinationUnavailable`], [`Error::ClockSkew`] or
    ///   [`Error::WorkerCollision`] from distributed startup.
    pub async fn initialize(&self) -> Result<InitStatus> {
        if self.ready.get().is_some() {
            return Ok(InitStatus::AlreadyInitialized);
        }
        let _init = self.init.lock().await;
        if self.ready.get().is_some() {
            return Ok(InitStatus::AlreadyInitialized);
        }

        let mut attempt = InitAttempt::start(&self.lifecycle);
        let ready = self.bring_up().await.inspect_err(|e| {
            warn!(error = %e, mode = ?self.config.mode, "generator initialization failed");
        })?;
        let slot = ready.guard.worker_slot();
        // Only the holder of `init` writes `ready`, and it was empty above.
        let _ = self.ready.set(ready);
        attempt.finish();

        info!(
            worker_id = slot.worker_id(),
            mode = ?self.config.mode,
            "generator ready"
        );
        Ok(InitStatus::Initialized)
    }

    async fn bring_up(&self) -> Result<Ready<T>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::config("generator has been shut down"));
        }
        self.config.validate()?;

        let slot = match self.config.worker_id {
            Some(worker_id) => WorkerSlot::new(worker_id)?,
            None => derive_worker_slot(),
        };

        let registration_lost = match self.config.mode {
            Mode::Standalone => {
                info!(
                    worker_id = slot.worker_id(),
                    derived = self.config.worker_id.is_none(),
                    "using standalone worker slot"
                );
                None
            }
            Mode::Distributed => Some(self.coordinate(slot).await?),
        };

        Ok(Ready {
            guard: MonotonicGuard::new(
                slot,
                Arc::clone(&self.time),
                self.config.regression_check,
            ),
            registration_lost,
        })
    }

    /// Skew check, slot claim and heartbeat, in that order.
    async fn coordinate(&self, slot: WorkerSlot) -> Result<Arc<AtomicBool>> {
        let config = &self.config;
        let backend = match &self.backend {
            Some(backend) => Arc::clone(backend),
            None => backend::connect(&config.backend).await?,
        };

        ClockSkewMonitor::new(
            &*backend,
            &config.namespace,
            config.request_timeout,
            &*self.time,
        )
        .check(&config.skew)
        .await?;

        let registration = WorkerRegistry::new(
            Arc::clone(&backend),
            config.namespace.clone(),
            config.lease_ttl,
            config.request_timeout,
        )
        .claim(slot, self.shutdown.child_token())
        .await?;
        let lost = registration.lost_flag();

        let mut tasks = self.tasks.lock();
        tasks.push(registration.keeper);
        if let Some(publisher) = spawn_publisher(
            &config.skew,
            backend,
            &config.namespace,
            slot,
            config.request_timeout,
            Arc::clone(&self.time),
            self.shutdown.child_token(),
        ) {
            tasks.push(publisher);
        }
        Ok(lost)
    }

    fn ready(&self) -> Result<&Ready<T>> {
        self.ready.get().ok_or(Error::NotInitialized)
    }

    /// Attempts to generate the next ID without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] before [`Self::initialize`] succeeded.
    /// - [`Error::ClockRegression`] if the clock ran backwards.
    pub fn try_generate(&self) -> Result<IdGenStatus> {
        self.ready()?.guard.try_next_id()
    }

    /// Generates the next ID, yielding the thread while the sequence is
    /// exhausted for the current millisecond.
    ///
    /// # Errors
    ///
    /// See [`Self::try_generate`].
    pub fn generate_id(&self) -> Result<FleetId> {
        let ready = self.ready()?;
        loop {
            match ready.guard.try_next_id()? {
                IdGenStatus::Ready { id } => return Ok(id),
                IdGenStatus::Pending { .. } => std::thread::yield_now(),
            }
        }
    }

    /// Generates the next ID as a signed 64-bit integer.
    ///
    /// # Errors
    ///
    /// See [`Self::try_generate`].
    pub fn generate(&self) -> Result<i64> {
        self.generate_id().map(i64::from)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    /// The worker slot in use, once ready.
    pub fn worker_slot(&self) -> Option<WorkerSlot> {
        self.ready.get().map(|ready| ready.guard.worker_slot())
    }

    /// `true` if lease renewal has failed for longer than the lease TTL. IDs
    /// are still issued, but a peer may claim the same slot.
    pub fn registration_lost(&self) -> bool {
        self.ready
            .get()
            .and_then(|ready| ready.registration_lost.as_ref())
            .is_some_and(|lost| lost.load(Ordering::Acquire))
    }

    pub fn state(&self) -> GeneratorState {
        let (last_timestamp_ms, sequence) = self
            .ready
            .get()
            .map_or((0, 0), |ready| ready.guard.snapshot());
        GeneratorState {
            lifecycle: self.lifecycle(),
            worker_slot: self.worker_slot(),
            last_timestamp_ms,
            sequence,
            registration_lost: self.registration_lost(),
        }
    }

    /// Stops the background tasks and waits for them to exit.
    ///
    /// The worker lease is no longer renewed and expires after its TTL. The
    /// handle keeps generating IDs; it cannot be initialized again.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = core::mem::take(&mut *self.tasks.lock());
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("generator background tasks stopped");
    }
}

impl<T: TimeSource + 'static> Drop for Generator<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Marks the lifecycle `Initializing` and restores `Uninitialized` unless
/// finished, including when the `initialize` future is dropped.
struct InitAttempt<'a> {
    lifecycle: &'a AtomicU8,
    finished: bool,
}

impl<'a> InitAttempt<'a> {
    fn start(lifecycle: &'a AtomicU8) -> Self {
        lifecycle.store(Lifecycle::Initializing as u8, Ordering::Release);
        Self {
            lifecycle,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.lifecycle
            .store(Lifecycle::Ready as u8, Ordering::Release);
        self.finished = true;
    }
}

impl Drop for InitAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.lifecycle
                .store(Lifecycle::Uninitialized as u8, Ordering::Release);
        }
    }
}
