//! Registry of the logs stored on this node.

use crate::config::StoreConfig;
use crate::error::{FindKeyError, Result};
use crate::lifecycle::log::LogPartitions;
use crate::storage::PartitionLayout;
use crate::types::LogId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

/// Maps log ids to their partitions.
///
/// Failure to open one log never prevents the others from opening; the
/// failed log is left out of the registry and the error is logged.
#[derive(Debug)]
pub struct LogRegistry {
    config: StoreConfig,
    logs: RwLock<HashMap<LogId, Arc<LogPartitions>>>,
}

impl LogRegistry {
    /// Creates an empty registry.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Opens every log found under the configured data directory.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let layout = PartitionLayout::new(&config.data_dir);
        let mut logs = HashMap::new();

        for log_id in layout.list_logs()? {
            match LogPartitions::open(log_id, &config) {
                Ok(log) => {
                    logs.insert(log_id, Arc::new(log));
                }
                Err(err) => {
                    error!("Failed to open log {}: {}", log_id, err);
                }
            }
        }

        info!(
            "Opened {} logs under {}",
            logs.len(),
            config.data_dir.display()
        );
        Ok(Self {
            config,
            logs: RwLock::new(logs),
        })
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the log if it is registered.
    pub fn get(&self, log_id: LogId) -> Option<Arc<LogPartitions>> {
        self.logs
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(&log_id)
            .cloned()
    }

    /// Returns the log, creating its directory if it does not exist yet.
    pub fn create_log(&self, log_id: LogId) -> Result<Arc<LogPartitions>> {
        if !log_id.is_valid() {
            return Err(FindKeyError::Validation(format!(
                "invalid log id {}",
                log_id
            )));
        }

        let mut logs = self.logs.write().unwrap_or_else(|err| err.into_inner());
        if let Some(log) = logs.get(&log_id) {
            return Ok(Arc::clone(log));
        }
        let log = Arc::new(LogPartitions::open(log_id, &self.config)?);
        logs.insert(log_id, Arc::clone(&log));
        Ok(log)
    }

    /// Returns the registered log ids in ascending order.
    pub fn log_ids(&self) -> Vec<LogId> {
        let mut ids: Vec<_> = self
            .logs
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered logs.
    pub fn len(&self) -> usize {
        self.logs.read().unwrap_or_else(|err| err.into_inner()).len()
    }

    /// Returns true if no log is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncMode;
    use crate::types::Record;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_log_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let registry = LogRegistry::new(StoreConfig::new(temp_dir.path()));

        let first = registry.create_log(LogId(4)).unwrap();
        let second = registry.create_log(LogId(4)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.log_ids(), vec![LogId(4)]);
        assert!(registry.get(LogId(5)).is_none());
        assert!(registry.create_log(LogId::INVALID).is_err());
    }

    #[test]
    fn test_open_skips_broken_logs() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path()).with_sync_mode(SyncMode::None);
        {
            let registry = LogRegistry::new(config.clone());
            registry
                .create_log(LogId(1))
                .unwrap()
                .append(Record::new(1, b"a".to_vec()))
                .unwrap();
            registry.create_log(LogId(2)).unwrap();
        }

        let layout = PartitionLayout::new(temp_dir.path());
        fs::write(layout.partition_path(LogId(2), 0), b"not a partition").unwrap();

        let registry = LogRegistry::open(config).unwrap();
        assert_eq!(registry.log_ids(), vec![LogId(1)]);
        assert_eq!(registry.get(LogId(1)).unwrap().tail_lsn(), 1);
    }
}
