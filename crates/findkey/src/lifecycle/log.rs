//! Partition management for a single log: append, rotation, trim and
//! recovery from disk.

use crate::config::StoreConfig;
use crate::error::{FindKeyError, Result};
use crate::lifecycle::directory::{PartitionDescriptor, PartitionDirectory};
use crate::lifecycle::trim::TrimTracker;
use crate::storage::{LocalPartitionStore, PartitionLayout, PartitionMeta};
use crate::types::{LogId, Lsn, PartitionId, Record, Timestamp, LSN_INVALID};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Partitions of one log.
///
/// Appends are serialized by an internal writer lock, which stands in for the
/// log's sequencer. Rotation holds the directory write lock while it seals
/// the active partition and registers the next one, so searches observe
/// either the old or the new configuration.
#[derive(Debug)]
pub struct LogPartitions {
    log_id: LogId,
    layout: PartitionLayout,
    config: StoreConfig,
    directory: RwLock<PartitionDirectory>,
    trim: TrimTracker,
    writer: Mutex<()>,
}

impl LogPartitions {
    /// Opens the log, loading every partition file found in its directory.
    ///
    /// A log with no files starts with zero partitions; the first append
    /// creates one.
    ///
    /// A tail file too short to hold a header was being created when the
    /// process stopped and holds no records; it is removed. Any other file
    /// that cannot be loaded is kept in the directory as an unreadable
    /// partition, so searches that reach it degrade while the rest of the
    /// log stays available.
    ///
    /// # Errors
    ///
    /// Fails on an invalid log id or when the log directory cannot be read.
    /// Files that violate partition ordering leave the log open with a
    /// faulted directory.
    pub fn open(log_id: LogId, config: &StoreConfig) -> Result<Self> {
        if !log_id.is_valid() {
            return Err(FindKeyError::Validation(format!(
                "invalid log id {}",
                log_id
            )));
        }

        let layout = PartitionLayout::new(&config.data_dir);
        let log_dir = layout.log_dir(log_id);
        fs::create_dir_all(&log_dir).map_err(|e| FindKeyError::storage(&log_dir, e))?;
        let trim = TrimTracker::load(&log_dir)?;

        let mut files = layout.list_partition_files(log_id)?;
        if files.last().map_or(false, |info| is_headerless(&info.path)) {
            if let Some(tail) = files.pop() {
                warn!(
                    "Removing partition file {} of log {}: no header was written",
                    tail.path.display(),
                    log_id
                );
                if let Err(err) = fs::remove_file(&tail.path) {
                    error!(
                        "Failed to remove partition file {}: {:?}",
                        tail.path.display(),
                        err
                    );
                }
            }
        }

        let mut directory = PartitionDirectory::new(log_id);
        let file_count = files.len();
        for (i, info) in files.iter().enumerate() {
            let before_tail = i + 1 < file_count;
            let loaded = if before_tail {
                LocalPartitionStore::load_complete(&info.path, config)
            } else {
                LocalPartitionStore::load(&info.path, config)
            };
            let loaded = loaded.and_then(|store| {
                let meta = store.meta();
                if meta.log_id == log_id && meta.partition_id == info.partition_id {
                    Ok(store)
                } else {
                    Err(FindKeyError::CorruptEntry {
                        offset: 0,
                        reason: format!(
                            "{} holds partition {} of log {}",
                            info.path.display(),
                            meta.partition_id,
                            meta.log_id
                        ),
                    })
                }
            });

            let store = match loaded {
                Ok(store) => {
                    if !store.is_sealed() && before_tail {
                        // Crash between creating the next partition and sealing this one.
                        warn!(
                            "Sealing unsealed partition {} of log {} found before the tail",
                            info.partition_id, log_id
                        );
                        store.seal(store.max_timestamp())?;
                    }
                    store
                }
                Err(err) => {
                    error!(
                        "Partition file {} of log {} is unreadable, searches over it will degrade: {}",
                        info.path.display(),
                        log_id,
                        err
                    );
                    let start_ts = directory.descriptors().last().map_or(Timestamp::MIN, |prev| {
                        prev.end_ts.or(prev.max_timestamp).unwrap_or(prev.start_ts)
                    });
                    let meta = PartitionMeta {
                        log_id,
                        partition_id: info.partition_id,
                        start_ts,
                        base_lsn: LSN_INVALID,
                    };
                    LocalPartitionStore::unreadable(&info.path, meta, config)
                }
            };
            match directory.register(Arc::new(store)) {
                Ok(_) => {}
                // The directory is now faulted and rejects every later call;
                // keep the log registered so requests see the fault.
                Err(FindKeyError::InvariantViolation { .. }) => break,
                Err(err) => return Err(err),
            }
        }

        info!(
            "Opened log {} with {} partitions (trim point {})",
            log_id,
            directory.len(),
            trim.trim_point()
        );

        Ok(Self {
            log_id,
            layout,
            config: config.clone(),
            directory: RwLock::new(directory),
            trim,
            writer: Mutex::new(()),
        })
    }

    /// Returns the log id.
    pub fn log_id(&self) -> LogId {
        self.log_id
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Read access to the partition directory.
    pub fn directory(&self) -> RwLockReadGuard<'_, PartitionDirectory> {
        self.directory.read().unwrap_or_else(|err| err.into_inner())
    }

    fn directory_mut(&self) -> RwLockWriteGuard<'_, PartitionDirectory> {
        self.directory.write().unwrap_or_else(|err| err.into_inner())
    }

    /// Returns descriptors of all partitions in order.
    pub fn descriptors(&self) -> Vec<PartitionDescriptor> {
        self.directory().descriptors()
    }

    /// Returns the highest LSN stored in the log.
    pub fn tail_lsn(&self) -> Lsn {
        self.directory().tail_lsn()
    }

    /// Returns the trim point.
    pub fn trim_point(&self) -> Lsn {
        self.trim.trim_point()
    }

    /// Appends a record to the active partition, rotating first if the
    /// partition is full, spans too much time, or does not exist.
    pub fn append(&self, record: Record) -> Result<Lsn> {
        let _writer = self.writer.lock().unwrap_or_else(|err| err.into_inner());

        let needs_rotation = match self.directory().active() {
            None => true,
            Some(active) => {
                let full = active.record_count() > 0
                    && active.size() + record.payload.len() as u64 > self.config.max_partition_bytes;
                let expired = record.timestamp.saturating_sub(active.meta().start_ts)
                    >= self.config.max_partition_span_ms;
                full || expired
            }
        };
        if needs_rotation {
            self.rotate_locked(record.timestamp)?;
        }

        let active = self
            .directory()
            .active()
            .cloned()
            .ok_or_else(|| FindKeyError::Validation(format!("log {} has no active partition", self.log_id)))?;
        active.append(record)
    }

    /// Seals the active partition and starts a new one at `start_ts` or
    /// later. Returns the new partition's id.
    pub fn rotate(&self, start_ts: Timestamp) -> Result<PartitionId> {
        let _writer = self.writer.lock().unwrap_or_else(|err| err.into_inner());
        self.rotate_locked(start_ts)
    }

    fn rotate_locked(&self, start_ts: Timestamp) -> Result<PartitionId> {
        let mut directory = self.directory_mut();

        let mut start_ts = start_ts;
        if let Some(active) = directory.active().cloned() {
            let bounds = directory.seal_tail(start_ts.max(active.max_timestamp()))?;
            start_ts = bounds.end_ts;
        } else if let Some(last) = directory.descriptors().last() {
            start_ts = start_ts
                .max(last.end_ts.unwrap_or(last.start_ts))
                .max(last.max_timestamp.unwrap_or(last.start_ts));
        }

        let partition_id = directory
            .descriptors()
            .last()
            .map_or(0, |last| last.partition_id + 1);
        let meta = PartitionMeta {
            log_id: self.log_id,
            partition_id,
            start_ts,
            base_lsn: directory.tail_lsn().saturating_add(1),
        };
        let path = self.layout.partition_path(self.log_id, partition_id);
        let store = LocalPartitionStore::open(&path, meta, &self.config)?;
        directory.register(Arc::new(store))?;

        debug!(
            "Rotated log {} to partition {} starting at {}",
            self.log_id, partition_id, start_ts
        );
        Ok(partition_id)
    }

    /// Seals the active partition without starting a new one.
    pub fn seal_active(&self, end_ts: Timestamp) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(|err| err.into_inner());
        self.directory_mut().seal_tail(end_ts).map(|_| ())
    }

    /// Moves the trim point to `lsn` and deletes sealed partitions that hold
    /// only trimmed records. Returns the number of partitions deleted.
    ///
    /// A partition file that cannot be deleted is logged and left behind.
    pub fn trim(&self, lsn: Lsn) -> Result<usize> {
        self.trim.advance(lsn)?;
        let dropped = self
            .directory_mut()
            .drop_trimmed(self.trim.trim_point())?;

        for store in &dropped {
            if let Err(err) = fs::remove_file(store.path()) {
                error!(
                    "Failed to delete trimmed partition {}: {:?}",
                    store.path().display(),
                    err
                );
            }
        }
        if !dropped.is_empty() {
            info!(
                "Trimmed log {} to LSN {}, deleted {} partitions",
                self.log_id,
                self.trim.trim_point(),
                dropped.len()
            );
        }
        Ok(dropped.len())
    }

    /// Reads the record stored at `lsn`, if any.
    pub fn read(&self, lsn: Lsn) -> Result<Option<Record>> {
        let store = {
            let directory = self.directory();
            let position = directory.descriptors().iter().position(|descriptor| {
                matches!(
                    (descriptor.first_lsn, descriptor.last_lsn),
                    (Some(first), Some(last)) if first <= lsn && lsn <= last
                )
            });
            match position.and_then(|pos| directory.store(pos)) {
                Some(store) => Arc::clone(store),
                None => return Ok(None),
            }
        };
        store.read(lsn)
    }
}

/// True if the file at `path` is too short to hold a partition header.
fn is_headerless(path: &Path) -> bool {
    fs::metadata(path).map_or(false, |metadata| metadata.len() < PartitionMeta::SIZE as u64)
}
