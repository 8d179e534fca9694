use core::time::Duration;

use futures::future::BoxFuture;

/// Identifier of a lease granted by a coordination backend.
pub type LeaseId = i64;

/// A key and its value as returned by a prefix scan.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Errors reported by a [`CoordinationBackend`].
///
/// The generator never inspects these beyond logging: any backend error during
/// initialization becomes [`Error::CoordinationUnavailable`].
///
/// [`Error::CoordinationUnavailable`]: crate::Error::CoordinationUnavailable
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("lease {0} not found or expired")]
    LeaseNotFound(LeaseId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type BackendResult<T> = core::result::Result<T, BackendError>;

/// The external key/value service supplying mutual exclusion (slot
/// registration) and shared visibility (timestamp samples) across processes.
///
/// The trait is object safe so a generator can hold an
/// `Arc<dyn CoordinationBackend>` chosen at runtime. Calls are not retried and
/// carry no deadline of their own; the generator bounds each one with its
/// configured request timeout.
pub trait CoordinationBackend: Send + Sync {
    /// Returns the value stored at `key`, if any.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>>;

    /// Returns every entry whose key starts with `prefix`, ordered by key.
    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BackendResult<Vec<KeyValue>>>;

    /// Stores `value` at `key`, optionally bound to a lease so the entry
    /// disappears when the lease expires.
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        lease: Option<LeaseId>,
    ) -> BoxFuture<'a, BackendResult<()>>;

    /// Grants a lease that expires after `ttl` unless renewed.
    fn grant_lease(&self, ttl: Duration) -> BoxFuture<'_, BackendResult<LeaseId>>;

    /// Renews `lease` once and returns its remaining time to live.
    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, BackendResult<Duration>>;

    /// Returns the backend's notion of the current time in Unix milliseconds.
    fn server_time(&self) -> BoxFuture<'_, BackendResult<u64>>;
}
