//! Error and Result types for partition storage and FINDKEY resolution.

use crate::storage::StoreState;
use crate::types::{LogId, Lsn, PartitionId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for findkey operations.
pub type Result<T> = std::result::Result<T, FindKeyError>;

/// The error type for partition storage and FINDKEY operations.
#[derive(Debug, Error)]
pub enum FindKeyError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// I/O error against a specific partition file.
    #[error("Storage error on {}: {source}", path.display())]
    Storage {
        /// Path of the partition file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Invalid magic bytes in a partition file header.
    #[error("Invalid magic bytes: expected ALPT, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported partition file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Entry checksum does not match expected value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// Partition entry could not be decoded.
    #[error("Corrupt entry at offset {offset}: {reason}")]
    CorruptEntry {
        /// Byte offset of the entry in the file.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The partition store is not open for the requested operation.
    #[error("Partition {partition} unavailable (state {state:?})")]
    StoreUnavailable {
        /// Partition identifier.
        partition: PartitionId,
        /// State the store was found in.
        state: StoreState,
    },

    /// Write attempted against a sealed partition.
    #[error("Partition {0} is sealed")]
    Sealed(PartitionId),

    /// Record LSN does not advance past the partition's last LSN.
    #[error("LSN out of order: got {got}, last was {last}")]
    LsnOutOfOrder {
        /// LSN presented by the caller.
        got: Lsn,
        /// Last LSN stored in the partition.
        last: Lsn,
    },

    /// The partition directory ordering invariant was broken.
    ///
    /// Fatal for the affected log's directory only.
    #[error("Invariant violation in log {log}: {reason}")]
    InvariantViolation {
        /// Log whose directory is faulted.
        log: LogId,
        /// Description of the violation.
        reason: String,
    },

    /// Malformed request or unknown log.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request deadline expired before a result was delivered.
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

impl FindKeyError {
    /// Wraps an I/O error with the partition file path it occurred on.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures of the backing store (I/O, corruption, unavailable).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Storage { .. }
                | Self::InvalidMagic(_)
                | Self::UnsupportedVersion(_)
                | Self::ChecksumMismatch { .. }
                | Self::CorruptEntry { .. }
                | Self::StoreUnavailable { .. }
        )
    }
}
