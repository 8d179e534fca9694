/// Number of low-order bits holding the per-millisecond sequence.
pub const SEQUENCE_BITS: u32 = 13;

/// Number of bits holding the worker id, directly above the sequence.
pub const WORKER_ID_BITS: u32 = 10;

/// Shift of the timestamp offset (bit 23).
pub const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;

/// Bits left for the timestamp offset below the (always zero) sign bit.
pub const TIMESTAMP_BITS: u32 = 63 - TIMESTAMP_SHIFT;

/// Largest worker id that fits the worker field.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// Number of distinct sequence values; the counter wraps modulo this value.
pub const SEQUENCE_CAPACITY: u64 = 1 << SEQUENCE_BITS;

/// Largest timestamp offset that keeps an encoded ID non-negative.
pub const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Unix milliseconds of timestamp offset zero: Friday, July 24, 2020
/// 12:02:34.670 UTC.
pub const EPOCH_START_MS: u64 = 1_595_592_154_670;

pub(crate) const SEQUENCE_MASK: u64 = SEQUENCE_CAPACITY - 1;
pub(crate) const WORKER_ID_MASK: u64 = (1 << WORKER_ID_BITS) - 1;
pub(crate) const WORKER_FIELD_MASK: u64 = WORKER_ID_MASK << SEQUENCE_BITS;
