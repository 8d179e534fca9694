//! Coordination backends.
//!
//! - [`CoordinationBackend`] - the object-safe interface the generator talks
//!   to.
//! - [`MemoryBackend`] - in-process store with TTL leases.
//! - `KvBackend` - gRPC client of `fleetid-kv-server` (feature `kv-client`).

mod interface;
#[cfg(feature = "kv-client")]
mod kv;
mod memory;

use core::time::Duration;
use std::sync::Arc;

pub use interface::*;
#[cfg(feature = "kv-client")]
pub use kv::*;
pub use memory::*;

use crate::{Error, Result};

/// Where a distributed generator finds its coordination backend.
#[derive(Clone, Debug)]
pub enum BackendConfig {
    /// Use this in-process store. Clones of one [`MemoryBackend`] coordinate
    /// with each other.
    Memory(MemoryBackend),
    /// Connect to a `fleetid-kv-server`.
    #[cfg(feature = "kv-client")]
    Kv {
        endpoint: String,
        connect_timeout: Duration,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Memory(MemoryBackend::new())
    }
}

impl BackendConfig {
    /// A `fleetid-kv-server` endpoint with a 3 second connect timeout.
    #[cfg(feature = "kv-client")]
    pub fn kv(endpoint: impl Into<String>) -> Self {
        Self::Kv {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// Builds the backend described by `config`.
///
/// # Errors
///
/// Returns [`Error::CoordinationUnavailable`] if the backend cannot be
/// reached.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn CoordinationBackend>> {
    match config {
        BackendConfig::Memory(backend) => Ok(Arc::new(backend.clone())),
        #[cfg(feature = "kv-client")]
        BackendConfig::Kv {
            endpoint,
            connect_timeout,
        } => {
            let backend = KvBackend::connect(endpoint.clone(), *connect_timeout)
                .await
                .map_err(|e| Error::unavailable("connect", e))?;
            tracing::info!(%endpoint, "connected to coordination backend");
            Ok(Arc::new(backend))
        }
    }
}

/// Runs one backend call bounded by `timeout`, mapping failures to
/// [`Error::CoordinationUnavailable`].
pub(crate) async fn call<T>(
    op: &'static str,
    timeout: Duration,
    fut: impl Future<Output = BackendResult<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::unavailable(op, e)),
        Err(_) => Err(Error::unavailable(
            op,
            format!("no response within {timeout:?}"),
        )),
    }
}
