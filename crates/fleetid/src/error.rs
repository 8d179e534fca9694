use core::time::Duration;

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `fleetid` can emit.
///
/// The first four variants are startup conditions: they abort
/// [`Generator::initialize`] and keep the handle out of the ready state.
/// [`Error::ClockRegression`] is a per-call failure of
/// [`Generator::generate`]; the call produces no ID and the handle stays
/// usable.
///
/// [`Generator::initialize`]: crate::Generator::initialize
/// [`Generator::generate`]: crate::Generator::generate
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration cannot be used, e.g. a worker id above
    /// [`MAX_WORKER_ID`](crate::MAX_WORKER_ID).
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    /// A coordination backend call failed or timed out.
    #[error("coordination backend unavailable during `{op}`: {reason}")]
    CoordinationUnavailable { op: &'static str, reason: String },

    /// The worker slot is already registered by a live peer.
    #[error("worker slot already registered at `{key}`")]
    WorkerCollision { key: String },

    /// The local clock lags the fleet average or the reference time source by
    /// more than the configured tolerance.
    #[error(
        "local clock ({local_ms} ms) lags reference ({reference_ms} ms) by more than {tolerance:?}"
    )]
    ClockSkew {
        local_ms: u64,
        reference_ms: u64,
        tolerance: Duration,
    },

    /// The local clock moved backwards past the last generation time.
    #[error("clock moved backwards: last {last_ms} ms, now {now_ms} ms")]
    ClockRegression { last_ms: u64, now_ms: u64 },

    /// A field passed to the codec is outside its declared range.
    #[error("{field} out of range: {value}")]
    InvalidField { field: &'static str, value: u64 },

    /// `generate` was called before `initialize` completed.
    #[error("generator is not initialized")]
    NotInitialized,
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(op: &'static str, reason: impl ToString) -> Self {
        Self::CoordinationUnavailable {
            op,
            reason: reason.to_string(),
        }
    }
}
