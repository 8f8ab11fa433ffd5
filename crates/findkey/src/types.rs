//! Core identifiers and the record type shared by every layer.

use std::fmt;

/// Log sequence number. Totally ordered and non-decreasing within a log.
pub type Lsn = u64;

/// Record timestamp in milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Partition identifier, unique within a log and increasing with rotation.
pub type PartitionId = u64;

/// Reserved LSN that never identifies a record.
pub const LSN_INVALID: Lsn = 0;

/// First LSN that can be assigned in a fresh log.
pub const LSN_OLDEST: Lsn = 1;

/// Largest LSN; reserved so that `tail + 1` never overflows.
pub const LSN_MAX: Lsn = u64::MAX;

/// Largest valid log identifier.
pub const LOGID_MAX: u64 = (1 << 62) - 1;

/// Opaque per-log identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogId(pub u64);

impl LogId {
    /// The invalid log id.
    pub const INVALID: LogId = LogId(0);

    /// Returns the raw identifier.
    pub fn val(self) -> u64 {
        self.0
    }

    /// Returns true if the id is syntactically valid (`1..=LOGID_MAX`).
    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= LOGID_MAX
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LogId {
    fn from(value: u64) -> Self {
        LogId(value)
    }
}

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position of the record in its log. `LSN_INVALID` asks the store to assign one.
    pub lsn: Lsn,
    /// Append timestamp in milliseconds.
    pub timestamp: Timestamp,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl Record {
    /// Creates a record whose LSN is assigned by the partition on append.
    pub fn new(timestamp: Timestamp, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            lsn: LSN_INVALID,
            timestamp,
            payload: payload.into(),
        }
    }

    /// Creates a record with an LSN assigned by an external sequencer.
    pub fn with_lsn(lsn: Lsn, timestamp: Timestamp, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            lsn,
            timestamp,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_id_validity() {
        assert!(!LogId::INVALID.is_valid());
        assert!(LogId(1).is_valid());
        assert!(LogId(LOGID_MAX).is_valid());
        assert!(!LogId(LOGID_MAX + 1).is_valid());
    }

    #[test]
    fn test_record_new_leaves_lsn_unassigned() {
        let record = Record::new(10, b"x".to_vec());
        assert_eq!(record.lsn, LSN_INVALID);
        assert_eq!(Record::with_lsn(7, 10, b"x".to_vec()).lsn, 7);
    }
}
