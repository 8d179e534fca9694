use parking_lot::Mutex;
use tracing::instrument;

use crate::{
    EPOCH_START_MS, Error, FleetId, IdGenStatus, Result, SEQUENCE_CAPACITY, TimeSource,
    WorkerSlot,
};

/// How strictly the guard compares the current time against the last
/// generation time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RegressionCheck {
    /// Compare truncated seconds. Only regressions that cross a second
    /// boundary are rejected; this is what existing deployments expect.
    #[default]
    Seconds,
    /// Compare milliseconds. Any backwards step is rejected.
    Millis,
}

impl RegressionCheck {
    const fn is_regression(self, now_ms: u64, last_ms: u64) -> bool {
        match self {
            Self::Seconds => now_ms / 1_000 < last_ms / 1_000,
            Self::Millis => now_ms < last_ms,
        }
    }
}

#[derive(Debug)]
struct GuardState {
    last_ms: u64,
    sequence: u64,
}

/// The generation hot path.
///
/// Serializes ID generation against wall-clock regression and rolls the
/// sequence counter. The pair `(last_ms, sequence)` lives behind a single
/// mutex and is checked and committed in one critical section, so two threads
/// can never pass the check for the same millisecond and stamp the same
/// sequence.
///
/// The sequence is advanced by one modulo [`SEQUENCE_CAPACITY`] on every call
/// and is not reset when the millisecond changes.
pub struct MonotonicGuard<T: TimeSource> {
    state: Mutex<GuardState>,
    slot: WorkerSlot,
    check: RegressionCheck,
    time: T,
}

impl<T: TimeSource> MonotonicGuard<T> {
    /// Creates a guard that has not observed any time yet.
    pub fn new(slot: WorkerSlot, time: T, check: RegressionCheck) -> Self {
        Self::from_components(0, 0, slot, time, check)
    }

    /// Creates a guard preloaded with a last observed time (Unix ms) and
    /// sequence.
    ///
    /// # ⚠️ Note
    /// In typical use cases, you should prefer [`Self::new`].
    pub fn from_components(
        last_ms: u64,
        sequence: u64,
        slot: WorkerSlot,
        time: T,
        check: RegressionCheck,
    ) -> Self {
        debug_assert!(sequence < SEQUENCE_CAPACITY, "sequence overflow");
        Self {
            state: Mutex::new(GuardState {
                last_ms,
                sequence: sequence % SEQUENCE_CAPACITY,
            }),
            slot,
            check,
            time,
        }
    }

    pub const fn worker_slot(&self) -> WorkerSlot {
        self.slot
    }

    /// Returns `(last_ms, sequence)` as last committed.
    pub fn snapshot(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.last_ms, state.sequence)
    }

    /// Attempts to generate the next ID.
    ///
    /// # Returns
    /// - `Ok(IdGenStatus::Ready { id })`: a new ID
    /// - `Ok(IdGenStatus::Pending { yield_for })`: the sequence would wrap
    ///   inside the last stamped millisecond; retry after `yield_for` ms
    ///
    /// # Errors
    /// - [`Error::ClockRegression`] if the clock moved backwards past the last
    ///   generation time under the configured [`RegressionCheck`]. No state is
    ///   changed.
    /// - [`Error::InvalidField`] if the clock is before
    ///   [`EPOCH_START_MS`](crate::EPOCH_START_MS) or beyond the timestamp
    ///   range.
    #[instrument(level = "trace", skip(self))]
    pub fn try_next_id(&self) -> Result<IdGenStatus> {
        // The clock is read under the lock; a reading taken before another
        // thread commits could look like a regression.
        let mut state = self.state.lock();
        let now = self.time.current_millis();

        if self.check.is_regression(now, state.last_ms) {
            return Err(Self::cold_clock_behind(now, state.last_ms));
        }

        // A regression the check lets through is stamped with the last
        // observed millisecond so `last_ms` never decreases.
        let stamp = now.max(state.last_ms);
        let next = (state.sequence + 1) % SEQUENCE_CAPACITY;

        if next == 0 && stamp == state.last_ms {
            return Ok(IdGenStatus::Pending {
                yield_for: state.last_ms + 1 - now,
            });
        }

        let offset = stamp
            .checked_sub(EPOCH_START_MS)
            .ok_or(Error::InvalidField {
                field: "timestamp",
                value: stamp,
            })?;
        let id = FleetId::from_slot(offset, self.slot, next)?;

        state.last_ms = stamp;
        state.sequence = next;
        Ok(IdGenStatus::Ready { id })
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now_ms: u64, last_ms: u64) -> Error {
        tracing::warn!(now_ms, last_ms, "clock moved backwards; refusing to generate");
        Error::ClockRegression { last_ms, now_ms }
    }
}
