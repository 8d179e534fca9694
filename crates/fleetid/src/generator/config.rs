use core::time::Duration;

use crate::{BackendConfig, Error, MAX_WORKER_ID, RegressionCheck, Result, SkewStrategy};

/// Namespace prefix for every coordination key.
pub const DEFAULT_NAMESPACE: &str = "/UUID";

/// Lifetime of the worker registration lease.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(5);

/// Longest lease or timestamp sample TTL a configuration may request.
pub const MAX_LEASE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on every individual coordination backend call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Whether a generator coordinates with peers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// No backend. The worker id comes from configuration or is derived from
    /// the clock; uniqueness across processes is the operator's concern.
    #[default]
    Standalone,
    /// Register the worker slot and check clock skew through a coordination
    /// backend before issuing IDs.
    Distributed,
}

/// Configuration for a [`Generator`](crate::Generator).
///
/// ```
/// use core::time::Duration;
/// use fleetid::{BackendConfig, GeneratorConfig, MemoryBackend, SkewStrategy};
///
/// let config = GeneratorConfig::distributed(BackendConfig::Memory(MemoryBackend::new()))
///     .with_worker_id(12)
///     .with_namespace("/orders")
///     .with_skew(SkewStrategy::reference_time())
///     .with_request_timeout(Duration::from_secs(1));
/// assert!(config.validate().is_ok());
///
/// assert!(GeneratorConfig::standalone().with_worker_id(1024).validate().is_err());
/// ```
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub mode: Mode,
    /// Explicit worker id in `[0, MAX_WORKER_ID]`. When absent a candidate is
    /// derived from the clock.
    pub worker_id: Option<u16>,
    pub namespace: String,
    pub backend: BackendConfig,
    pub skew: SkewStrategy,
    pub lease_ttl: Duration,
    pub request_timeout: Duration,
    pub regression_check: RegressionCheck,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            worker_id: None,
            namespace: DEFAULT_NAMESPACE.to_owned(),
            backend: BackendConfig::default(),
            skew: SkewStrategy::default(),
            lease_ttl: DEFAULT_LEASE_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            regression_check: RegressionCheck::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn standalone() -> Self {
        Self::default()
    }

    pub fn distributed(backend: BackendConfig) -> Self {
        Self {
            mode: Mode::Distributed,
            backend,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_worker_id(mut self, worker_id: u16) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_skew(mut self, skew: SkewStrategy) -> Self {
        self.skew = skew;
        self
    }

    #[must_use]
    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn with_regression_check(mut self, regression_check: RegressionCheck) -> Self {
        self.regression_check = regression_check;
        self
    }

    /// Checks the configuration without touching any backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a worker id above
    /// [`MAX_WORKER_ID`], a zero lease TTL, request timeout, heartbeat interval
    /// or sample TTL, a lease or sample TTL above [`MAX_LEASE_TTL`], a
    /// peer-average tolerance that is not a whole number of seconds, or an
    /// empty namespace.
    pub fn validate(&self) -> Result<()> {
        match self.worker_id {
            Some(worker_id) if worker_id > MAX_WORKER_ID => {
                return Err(Error::config(format!(
                    "worker id {worker_id} must not exceed {MAX_WORKER_ID}"
                )));
            }
            _ => {}
        }
        if self.mode == Mode::Standalone {
            return Ok(());
        }
        if self.namespace.is_empty() {
            return Err(Error::config("namespace must not be empty"));
        }
        if self.lease_ttl.is_zero() {
            return Err(Error::config("lease ttl must be non-zero"));
        }
        if self.lease_ttl > MAX_LEASE_TTL {
            return Err(Error::config(format!(
                "lease ttl {:?} must not exceed {MAX_LEASE_TTL:?}",
                self.lease_ttl
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be non-zero"));
        }
        self.skew.validate()
    }
}
