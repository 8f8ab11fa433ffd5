//! Configuration for partition storage and rotation.

use std::path::{Path, PathBuf};

/// Default permission bits for partition files: owner rw, group rw, other r.
pub const DEFAULT_FILE_MODE: u32 = 0o664;

/// Default size threshold for rotating the active partition (256 MB).
pub const DEFAULT_MAX_PARTITION_BYTES: u64 = 256 * 1024 * 1024;

/// Default time span covered by one partition (1 hour, in milliseconds).
pub const DEFAULT_MAX_PARTITION_SPAN_MS: i64 = 60 * 60 * 1000;

/// Sync mode for partition append durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync after each append (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for a node's partition storage.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per log.
    pub data_dir: PathBuf,

    /// Durability applied after each append.
    pub sync_mode: SyncMode,

    /// Permission bits applied to newly created partition files.
    pub file_mode: u32,

    /// Size threshold for rotating the active partition.
    ///
    /// An append that would grow the active partition past this size seals it
    /// first. Default: 256 MB.
    pub max_partition_bytes: u64,

    /// Time span threshold for rotating the active partition.
    ///
    /// An append whose timestamp lies this far past the active partition's
    /// start seals it first. Default: 1 hour.
    pub max_partition_span_ms: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sync_mode: SyncMode::default(),
            file_mode: DEFAULT_FILE_MODE,
            max_partition_bytes: DEFAULT_MAX_PARTITION_BYTES,
            max_partition_span_ms: DEFAULT_MAX_PARTITION_SPAN_MS,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration rooted at `data_dir` with default thresholds.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Sets the permission bits for new partition files.
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Sets the size rotation threshold.
    pub fn with_max_partition_bytes(mut self, bytes: u64) -> Self {
        self.max_partition_bytes = bytes;
        self
    }

    /// Sets the time span rotation threshold.
    pub fn with_max_partition_span_ms(mut self, span_ms: i64) -> Self {
        self.max_partition_span_ms = span_ms;
        self
    }
}
