use core::fmt;

use crate::{
    Error, Result, WorkerSlot,
    id::layout::{
        EPOCH_START_MS, MAX_TIMESTAMP, SEQUENCE_BITS, SEQUENCE_CAPACITY, SEQUENCE_MASK,
        TIMESTAMP_BITS, TIMESTAMP_SHIFT, WORKER_FIELD_MASK, WORKER_ID_BITS, WORKER_ID_MASK,
    },
};

/// The three fields packed into an ID.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdParts {
    /// Milliseconds since [`EPOCH_START_MS`].
    pub timestamp: u64,
    /// Unshifted worker id.
    pub worker_id: u16,
    pub sequence: u16,
}

/// Packs a timestamp offset, a pre-shifted worker slot and a sequence into a
/// signed 64-bit ID: `(timestamp << 23) | slot | sequence`.
///
/// # Errors
///
/// Returns [`Error::InvalidField`] if the timestamp exceeds
/// [`MAX_TIMESTAMP`], the slot has bits outside the worker field, or the
/// sequence is not below [`SEQUENCE_CAPACITY`].
///
/// ```
/// use fleetid::{decode, encode, IdParts, WorkerSlot};
///
/// let slot = WorkerSlot::new(3).unwrap();
/// let id = encode(1_000, slot.shifted(), 42).unwrap();
/// assert_eq!(id, (1_000 << 23) | (3 << 13) | 42);
/// assert_eq!(
///     decode(id),
///     IdParts { timestamp: 1_000, worker_id: 3, sequence: 42 }
/// );
/// ```
pub fn encode(timestamp: u64, slot: u64, sequence: u64) -> Result<i64> {
    if timestamp > MAX_TIMESTAMP {
        return Err(Error::InvalidField {
            field: "timestamp",
            value: timestamp,
        });
    }
    if slot & !WORKER_FIELD_MASK != 0 {
        return Err(Error::InvalidField {
            field: "worker_slot",
            value: slot,
        });
    }
    if sequence >= SEQUENCE_CAPACITY {
        return Err(Error::InvalidField {
            field: "sequence",
            value: sequence,
        });
    }
    // Bit 63 stays clear because the timestamp fits in 40 bits.
    Ok(((timestamp << TIMESTAMP_SHIFT) | slot | sequence) as i64)
}

/// Splits an ID back into its fields.
pub const fn decode(id: i64) -> IdParts {
    let raw = id as u64;
    IdParts {
        timestamp: (raw >> TIMESTAMP_SHIFT) & MAX_TIMESTAMP,
        worker_id: ((raw >> SEQUENCE_BITS) & WORKER_ID_MASK) as u16,
        sequence: (raw & SEQUENCE_MASK) as u16,
    }
}

/// A generated ID.
///
/// - 1 bit reserved (sign, always zero)
/// - 40 bits timestamp (ms since [`EPOCH_START_MS`])
/// - 10 bits worker id
/// - 13 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            23 22            13 12             0
///              +--------------+----------------+----------------+---------------+
///  Field:      | reserved (1) | timestamp (40) | worker id (10) | sequence (13) |
///              +--------------+----------------+----------------+---------------+
///              |<----------- MSB ---------- 64 bits ----------- LSB ----------->|
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FleetId {
    id: i64,
}

impl FleetId {
    /// Builds an ID from an unshifted worker id.
    ///
    /// # Errors
    ///
    /// Returns an error if any component is out of range.
    pub fn from_components(timestamp: u64, worker_id: u16, sequence: u64) -> Result<Self> {
        let slot = WorkerSlot::new(worker_id)?;
        Ok(Self {
            id: encode(timestamp, slot.shifted(), sequence)?,
        })
    }

    pub(crate) fn from_slot(timestamp: u64, slot: WorkerSlot, sequence: u64) -> Result<Self> {
        Ok(Self {
            id: encode(timestamp, slot.shifted(), sequence)?,
        })
    }

    pub const fn from_raw(raw: i64) -> Self {
        Self { id: raw }
    }

    pub const fn to_raw(&self) -> i64 {
        self.id
    }

    pub const fn parts(&self) -> IdParts {
        decode(self.id)
    }

    /// Milliseconds since [`EPOCH_START_MS`].
    pub const fn timestamp(&self) -> u64 {
        self.parts().timestamp
    }

    /// Wall-clock Unix milliseconds at which the ID was stamped.
    pub const fn unix_millis(&self) -> u64 {
        self.timestamp() + EPOCH_START_MS
    }

    pub const fn worker_id(&self) -> u16 {
        self.parts().worker_id
    }

    pub const fn sequence(&self) -> u16 {
        self.parts().sequence
    }

    /// Returns the ID as a zero-padded 19-digit string, which sorts
    /// lexicographically in the same order as the integer.
    pub fn to_padded_string(&self) -> String {
        format!("{:019}", self.id)
    }
}

impl From<FleetId> for i64 {
    fn from(id: FleetId) -> Self {
        id.id
    }
}

impl fmt::Display for FleetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for FleetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.parts();
        let fields = [
            ("timestamp", TIMESTAMP_BITS, parts.timestamp),
            ("worker_id", WORKER_ID_BITS, u64::from(parts.worker_id)),
            ("sequence", SEQUENCE_BITS, u64::from(parts.sequence)),
        ];

        // Column width fits the label, decimal and hex rendering plus padding
        let columns: Vec<usize> = fields
            .iter()
            .map(|(name, bits, value)| {
                let label_len = format!("{name} ({bits})").len();
                let dec_len = value.to_string().len();
                let hex_len = format!("0x{value:x}").len();
                label_len.max(dec_len).max(hex_len) + 2
            })
            .collect();

        fn center(s: impl ToString, width: usize) -> String {
            let s = s.to_string();
            let pad = width.saturating_sub(s.len());
            let left = pad / 2;
            format!("{}{}{}", " ".repeat(left), s, " ".repeat(pad - left))
        }

        fn border(f: &mut fmt::Formatter<'_>, columns: &[usize]) -> fmt::Result {
            write!(f, "        +")?;
            for &w in columns {
                write!(f, "{}+", "-".repeat(w))?;
            }
            writeln!(f)
        }

        writeln!(f, "FleetId {{")?;
        writeln!(f, "    raw id     : 0x{:016x} ({})", self.id, self.id)?;
        writeln!(f, "    padded     : {}", self.to_padded_string())?;
        writeln!(f, "    layout     :")?;
        border(f, &columns)?;
        write!(f, "        |")?;
        for ((name, bits, _), &w) in fields.iter().zip(&columns) {
            write!(f, "{}|", center(format!("{name} ({bits})"), w))?;
        }
        writeln!(f)?;
        border(f, &columns)?;
        write!(f, "        |")?;
        for ((_, _, value), &w) in fields.iter().zip(&columns) {
            write!(f, "{}|", center(value, w))?;
        }
        writeln!(f)?;
        write!(f, "        |")?;
        for ((_, _, value), &w) in fields.iter().zip(&columns) {
            write!(f, "{}|", center(format!("0x{value:x}"), w))?;
        }
        writeln!(f)?;
        border(f, &columns)?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_WORKER_ID;

    #[test]
    fn test_fleet_id_fields_and_bounds() {
        let ts = MAX_TIMESTAMP;
        let wid = MAX_WORKER_ID;
        let seq = SEQUENCE_CAPACITY - 1;

        let id = FleetId::from_components(ts, wid, seq).unwrap();
        println!("ID: {id:?}");
        assert_eq!(id.timestamp(), ts);
        assert_eq!(id.worker_id(), wid);
        assert_eq!(u64::from(id.sequence()), seq);
        assert!(id.to_raw() > 0, "sign bit must stay clear");
        assert_eq!(id.to_raw(), i64::MAX);
    }

    #[test]
    fn test_round_trip_across_field_edges() {
        let timestamps = [0, 1, 1 << 20, MAX_TIMESTAMP - 1, MAX_TIMESTAMP];
        let workers = [0, 1, 512, MAX_WORKER_ID];
        let sequences = [0, 1, 4096, SEQUENCE_CAPACITY - 1];

        for &ts in &timestamps {
            for &wid in &workers {
                for &seq in &sequences {
                    let slot = WorkerSlot::new(wid).unwrap();
                    let id = encode(ts, slot.shifted(), seq).unwrap();
                    assert_eq!(
                        decode(id),
                        IdParts {
                            timestamp: ts,
                            worker_id: wid,
                            sequence: seq as u16,
                        }
                    );
                }
            }
        }
    }

    #[test]
    fn test_encode_matches_shift_formula() {
        let id = encode(1_234_567, 5 << 13, 77).unwrap();
        assert_eq!(id, (1_234_567_i64 << 23) | (5 << 13) | 77);
    }

    #[test]
    fn test_encode_rejects_out_of_range_fields() {
        assert_eq!(
            encode(0, 0, SEQUENCE_CAPACITY),
            Err(Error::InvalidField {
                field: "sequence",
                value: SEQUENCE_CAPACITY,
            })
        );
        assert!(matches!(
            encode(0, u64::from(MAX_WORKER_ID + 1) << SEQUENCE_BITS, 0),
            Err(Error::InvalidField { field: "worker_slot", .. })
        ));
        // An unshifted slot overlaps the sequence field.
        assert!(matches!(
            encode(0, 3, 0),
            Err(Error::InvalidField { field: "worker_slot", .. })
        ));
        assert!(matches!(
            encode(MAX_TIMESTAMP + 1, 0, 0),
            Err(Error::InvalidField { field: "timestamp", .. })
        ));
    }

    #[test]
    fn test_worker_id_out_of_range_is_configuration_error() {
        assert!(matches!(
            FleetId::from_components(0, MAX_WORKER_ID + 1, 0),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_ordering_follows_timestamp_then_worker_then_sequence() {
        let a = FleetId::from_components(10, 900, 8000).unwrap();
        let b = FleetId::from_components(11, 0, 0).unwrap();
        let c = FleetId::from_components(11, 1, 0).unwrap();
        let d = FleetId::from_components(11, 1, 1).unwrap();
        assert!(a < b && b < c && c < d);
        assert!(a.to_padded_string() < b.to_padded_string());
    }

    #[test]
    fn test_unix_millis_adds_epoch() {
        let id = FleetId::from_components(5, 0, 0).unwrap();
        assert_eq!(id.unix_millis(), EPOCH_START_MS + 5);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_is_transparent() {
        let id = FleetId::from_components(9, 2, 3).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, id.to_raw().to_string());
        let back: FleetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
