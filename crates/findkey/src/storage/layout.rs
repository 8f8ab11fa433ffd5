//! On-disk layout of log directories and partition files.

use crate::error::Result;
use crate::types::{LogId, PartitionId};
use std::fs;
use std::path::{Path, PathBuf};

/// Partition file extension.
const PARTITION_EXTENSION: &str = "alp";

/// Partition file prefix.
const PARTITION_PREFIX: &str = "partition";

/// Log directory prefix.
const LOG_DIR_PREFIX: &str = "log";

/// Information parsed from a partition file name.
///
/// # Examples
/// ```rust,ignore
/// use alopex_findkey::storage::PartitionFileInfo;
///
/// let name = PartitionFileInfo::file_name(3);
/// let parsed = PartitionFileInfo::parse_file_name(&name);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFileInfo {
    /// Partition identifier.
    pub partition_id: PartitionId,
    /// Full file path.
    pub path: PathBuf,
}

impl PartitionFileInfo {
    /// Builds a file name using `partition_{id_hex}.alp`.
    pub fn file_name(partition_id: PartitionId) -> String {
        format!(
            "{}_{:016x}.{}",
            PARTITION_PREFIX, partition_id, PARTITION_EXTENSION
        )
    }

    /// Parses a partition file name into its identifier.
    pub fn parse_file_name(name: &str) -> Option<PartitionId> {
        let stem = name.strip_suffix(&format!(".{}", PARTITION_EXTENSION))?;
        let id_hex = stem.strip_prefix(&format!("{}_", PARTITION_PREFIX))?;
        if id_hex.len() != 16 {
            return None;
        }
        u64::from_str_radix(id_hex, 16).ok()
    }
}

/// Provides filesystem paths for logs and their partition files.
///
/// # Examples
/// ```rust,ignore
/// use alopex_findkey::storage::PartitionLayout;
/// use alopex_findkey::LogId;
///
/// let layout = PartitionLayout::new("/data");
/// let path = layout.partition_path(LogId(7), 0);
/// ```
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    data_dir: PathBuf,
}

impl PartitionLayout {
    /// Creates a layout rooted at `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the root data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the directory holding a log's partitions.
    pub fn log_dir(&self, log_id: LogId) -> PathBuf {
        self.data_dir
            .join(format!("{}_{:016x}", LOG_DIR_PREFIX, log_id.val()))
    }

    /// Returns the path of a partition file.
    pub fn partition_path(&self, log_id: LogId, partition_id: PartitionId) -> PathBuf {
        self.log_dir(log_id)
            .join(PartitionFileInfo::file_name(partition_id))
    }

    /// Lists the log ids that have a directory under the data root.
    pub fn list_logs(&self) -> Result<Vec<LogId>> {
        let mut logs = Vec::new();

        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(logs),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let parsed = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(&format!("{}_", LOG_DIR_PREFIX)))
                .filter(|hex| hex.len() == 16)
                .and_then(|hex| u64::from_str_radix(hex, 16).ok());
            if let Some(id) = parsed {
                logs.push(LogId(id));
            }
        }

        logs.sort();
        Ok(logs)
    }

    /// Lists partition files of a log in partition id order.
    pub fn list_partition_files(&self, log_id: LogId) -> Result<Vec<PartitionFileInfo>> {
        let dir = self.log_dir(log_id);
        let mut files = Vec::new();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = match path.file_name().and_then(|name| name.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if let Some(partition_id) = PartitionFileInfo::parse_file_name(file_name) {
                files.push(PartitionFileInfo { partition_id, path });
            }
        }

        files.sort_by_key(|info| info.partition_id);
        Ok(files)
    }
}
