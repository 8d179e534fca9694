use core::fmt;

use crate::{
    Error, Result,
    id::layout::{MAX_WORKER_ID, SEQUENCE_BITS, WORKER_FIELD_MASK},
};

/// A worker id pre-shifted into its position inside an encoded ID.
///
/// The shifted form is what gets OR-ed into every ID and what appears in
/// coordination keys (`/UUID/workers/8192` is worker 1).
///
/// ```
/// use fleetid::WorkerSlot;
///
/// let slot = WorkerSlot::new(1).unwrap();
/// assert_eq!(slot.shifted(), 8192);
/// assert_eq!(slot.worker_id(), 1);
/// assert_eq!(slot.to_string(), "8192");
/// assert!(WorkerSlot::new(1024).is_err());
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerSlot(u64);

impl WorkerSlot {
    /// Shifts `worker_id` into place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `worker_id` exceeds
    /// [`MAX_WORKER_ID`].
    pub fn new(worker_id: u16) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(Error::config(format!(
                "worker id {worker_id} takes {} bits and must not exceed {MAX_WORKER_ID}",
                crate::WORKER_ID_BITS
            )));
        }
        Ok(Self(u64::from(worker_id) << SEQUENCE_BITS))
    }

    /// Accepts an already shifted slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if any bit outside the worker field is
    /// set.
    pub fn from_shifted(shifted: u64) -> Result<Self> {
        if shifted & !WORKER_FIELD_MASK != 0 {
            return Err(Error::InvalidField {
                field: "worker_slot",
                value: shifted,
            });
        }
        Ok(Self(shifted))
    }

    /// Keeps the low [`WORKER_ID_BITS`](crate::WORKER_ID_BITS) of `bits` as
    /// the worker id.
    pub(crate) const fn truncating(bits: u64) -> Self {
        Self((bits << SEQUENCE_BITS) & WORKER_FIELD_MASK)
    }

    /// The slot in its shifted position.
    pub const fn shifted(&self) -> u64 {
        self.0
    }

    /// The unshifted worker id, in `[0, MAX_WORKER_ID]`.
    pub const fn worker_id(&self) -> u16 {
        (self.0 >> SEQUENCE_BITS) as u16
    }
}

impl fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
