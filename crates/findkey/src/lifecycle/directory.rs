//! Ordered directory of a log's partitions.
//!
//! Partitions are kept in an arena indexed by position. Positions only grow
//! at the tail (rotation) and shrink at the head (trim), so descriptors are
//! never reordered. At most one partition, the last, is active.
//!
//! # Search Keys
//!
//! Every partition has a search key: its highest record watermark, or its
//! start timestamp when it holds no record. Rotation starts the next
//! partition at or after the previous partition's highest watermark, so the
//! keys are non-decreasing across positions and a binary search over them
//! finds the first partition that can hold a record at or after a target.
//!
//! A damaged partition's highest watermark is unknown, so its key is the
//! next partition's start (or unbounded at the tail). That is still within
//! the ordering above, since the next partition starts at or after
//! everything the damaged one held.

use crate::error::{FindKeyError, Result};
use crate::storage::{LocalPartitionStore, PartitionSnapshot, SealedBounds};
use crate::types::{LogId, Lsn, PartitionId, Timestamp, LSN_INVALID};
use std::sync::Arc;
use tracing::{debug, error};

/// Bounds of one partition as known to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    /// Partition identifier.
    pub partition_id: PartitionId,
    /// Inclusive start timestamp.
    pub start_ts: Timestamp,
    /// Exclusive end timestamp; `None` while the partition is active.
    pub end_ts: Option<Timestamp>,
    /// First LSN the partition may hold, or `LSN_INVALID` when unknown.
    pub base_lsn: Lsn,
    /// First record LSN, if any.
    pub first_lsn: Option<Lsn>,
    /// Last record LSN, if any.
    pub last_lsn: Option<Lsn>,
    /// Highest record watermark, if any.
    pub max_timestamp: Option<Timestamp>,
    /// Whether the partition is sealed.
    pub sealed: bool,
    /// Whether records past the indexed ones could not be read.
    pub damaged: bool,
}

impl PartitionDescriptor {
    /// Builds a descriptor from a store's current state.
    pub fn from_store(store: &LocalPartitionStore) -> Self {
        let meta = store.meta();
        let bounds = store.bounds();
        Self {
            partition_id: meta.partition_id,
            start_ts: meta.start_ts,
            end_ts: bounds.end_ts,
            base_lsn: meta.base_lsn,
            first_lsn: bounds.first_lsn,
            last_lsn: bounds.last_lsn,
            max_timestamp: bounds.max_timestamp,
            sealed: bounds.sealed,
            damaged: bounds.damaged,
        }
    }

    /// Returns true if the partition holds at least one record.
    pub fn has_records(&self) -> bool {
        self.first_lsn.is_some()
    }

    /// Highest LSN known to precede or belong to this partition.
    pub fn last_known_lsn(&self) -> Lsn {
        self.last_lsn
            .unwrap_or_else(|| self.base_lsn.saturating_sub(1))
    }

    fn search_key(&self) -> Timestamp {
        self.max_timestamp.unwrap_or(self.start_ts)
    }

    fn apply_seal(&mut self, bounds: &SealedBounds) {
        self.end_ts = Some(bounds.end_ts);
        self.first_lsn = bounds.first_lsn;
        self.last_lsn = bounds.last_lsn;
        self.max_timestamp = bounds.max_timestamp;
        self.sealed = true;
    }
}

/// A partition selected by a directory search.
#[derive(Debug, Clone)]
pub struct PartitionRef {
    /// Position in the directory at search time.
    pub position: usize,
    /// Bounds at search time.
    pub descriptor: PartitionDescriptor,
    /// Backing store.
    pub store: Arc<LocalPartitionStore>,
}

/// Result of [`PartitionDirectory::find_partitions_covering`].
///
/// `candidates` are searched in order: the first record at or after the
/// target lies in the first candidate that holds one.
#[derive(Debug, Clone)]
pub struct Coverage {
    /// Partitions to search, in position order.
    pub candidates: Vec<PartitionRef>,
    /// Partition preceding the first candidate.
    pub before: Option<PartitionDescriptor>,
    /// Partition following the last candidate.
    pub after: Option<PartitionDescriptor>,
    /// Snapshot of the active partition, captured when it is a candidate.
    pub active_snapshot: Option<PartitionSnapshot>,
    /// True if the target lies at or beyond the active partition's maximum.
    pub tail: bool,
    /// Highest LSN known to the log when the search ran.
    pub tail_lsn: Lsn,
}

#[derive(Debug)]
struct Slot {
    descriptor: PartitionDescriptor,
    store: Arc<LocalPartitionStore>,
}

impl Slot {
    /// Descriptor with live bounds for the active partition.
    fn current(&self) -> PartitionDescriptor {
        if self.descriptor.sealed {
            self.descriptor
        } else {
            PartitionDescriptor::from_store(&self.store)
        }
    }
}

/// Ordered sequence of a log's partitions.
#[derive(Debug)]
pub struct PartitionDirectory {
    log_id: LogId,
    slots: Vec<Slot>,
    fault: Option<String>,
}

impl PartitionDirectory {
    /// Creates an empty directory for `log_id`.
    pub fn new(log_id: LogId) -> Self {
        Self {
            log_id,
            slots: Vec::new(),
            fault: None,
        }
    }

    /// Returns the owning log.
    pub fn log_id(&self) -> LogId {
        self.log_id
    }

    /// Returns the number of partitions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the log has no partitions.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true once an ordering violation has been detected.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Returns the active partition's store, if the tail is unsealed.
    pub fn active(&self) -> Option<&Arc<LocalPartitionStore>> {
        self.slots
            .last()
            .filter(|slot| !slot.descriptor.sealed)
            .map(|slot| &slot.store)
    }

    /// Returns the store at `position`.
    pub fn store(&self, position: usize) -> Option<&Arc<LocalPartitionStore>> {
        self.slots.get(position).map(|slot| &slot.store)
    }

    /// Returns descriptors of all partitions in position order.
    pub fn descriptors(&self) -> Vec<PartitionDescriptor> {
        self.slots.iter().map(Slot::current).collect()
    }

    /// Returns the highest LSN known to the log.
    pub fn tail_lsn(&self) -> Lsn {
        self.slots
            .iter()
            .map(|slot| slot.current().last_known_lsn())
            .max()
            .unwrap_or(LSN_INVALID)
    }

    /// Search key of the sealed partition at `position`.
    fn key_at(&self, position: usize) -> Timestamp {
        let descriptor = &self.slots[position].descriptor;
        if descriptor.damaged {
            return self
                .slots
                .get(position + 1)
                .map_or(Timestamp::MAX, |next| next.descriptor.start_ts);
        }
        descriptor.search_key()
    }

    fn check_healthy(&self) -> Result<()> {
        match &self.fault {
            Some(reason) => Err(FindKeyError::InvariantViolation {
                log: self.log_id,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn fail(&mut self, reason: String) -> FindKeyError {
        error!(
            "Partition directory of log {} faulted: {}",
            self.log_id, reason
        );
        self.fault = Some(reason.clone());
        FindKeyError::InvariantViolation {
            log: self.log_id,
            reason,
        }
    }

    /// Appends a partition at the tail.
    ///
    /// The new partition must follow the current tail in time and LSN order,
    /// and the current tail must be sealed. A violation faults the directory:
    /// every later `register` and search on this log fails with
    /// [`FindKeyError::InvariantViolation`].
    pub fn register(&mut self, store: Arc<LocalPartitionStore>) -> Result<usize> {
        self.check_healthy()?;

        let descriptor = PartitionDescriptor::from_store(&store);
        if let Some(prev) = self.slots.last().map(Slot::current) {
            let violation = if !prev.sealed {
                Some(format!(
                    "partition {} registered while partition {} is still active",
                    descriptor.partition_id, prev.partition_id
                ))
            } else if descriptor.partition_id <= prev.partition_id {
                Some(format!(
                    "partition id {} does not follow {}",
                    descriptor.partition_id, prev.partition_id
                ))
            } else if descriptor.start_ts < prev.end_ts.unwrap_or(prev.start_ts) {
                Some(format!(
                    "partition {} starts at {} before previous end {:?}",
                    descriptor.partition_id, descriptor.start_ts, prev.end_ts
                ))
            } else if descriptor.search_key() < prev.search_key() {
                Some(format!(
                    "partition {} timestamps regress below {}",
                    descriptor.partition_id,
                    prev.search_key()
                ))
            } else if let Some(prev_last) = prev.last_lsn {
                let next_first = descriptor
                    .first_lsn
                    .or(Some(descriptor.base_lsn).filter(|&lsn| lsn != LSN_INVALID));
                match next_first {
                    Some(first) if first <= prev_last => Some(format!(
                        "partition {} starts at LSN {} not after {}",
                        descriptor.partition_id, first, prev_last
                    )),
                    _ => None,
                }
            } else {
                None
            };

            if let Some(reason) = violation {
                return Err(self.fail(reason));
            }
        }

        debug!(
            "Registered partition {} of log {} at position {}",
            descriptor.partition_id,
            self.log_id,
            self.slots.len()
        );
        self.slots.push(Slot { descriptor, store });
        Ok(self.slots.len() - 1)
    }

    /// Seals the active partition at `end_ts` and records its final bounds.
    pub fn seal_tail(&mut self, end_ts: Timestamp) -> Result<SealedBounds> {
        self.check_healthy()?;

        let slot = match self.slots.last_mut() {
            Some(slot) if !slot.descriptor.sealed => slot,
            _ => {
                return Err(FindKeyError::Validation(format!(
                    "log {} has no active partition to seal",
                    self.log_id
                )))
            }
        };

        let bounds = slot.store.seal(end_ts)?;
        slot.descriptor.apply_seal(&bounds);
        Ok(bounds)
    }

    /// Removes sealed partitions at the head whose records all lie at or
    /// below `trim_point`. Returns the removed stores.
    pub fn drop_trimmed(&mut self, trim_point: Lsn) -> Result<Vec<Arc<LocalPartitionStore>>> {
        self.check_healthy()?;

        let count = self
            .slots
            .iter()
            .take_while(|slot| {
                slot.descriptor.sealed
                    && slot.descriptor.last_known_lsn() <= trim_point
                    && slot.descriptor.last_known_lsn() != LSN_INVALID
            })
            .count();
        Ok(self.slots.drain(..count).map(|slot| slot.store).collect())
    }

    /// Selects the partitions to search for the first record at or after
    /// `target`.
    ///
    /// Returns `Ok(None)` when the log has no partitions. Runs in
    /// O(log P) plus the number of empty partitions skipped.
    pub fn find_partitions_covering(&self, target: Timestamp) -> Result<Option<Coverage>> {
        self.check_healthy()?;

        if self.slots.is_empty() {
            return Ok(None);
        }

        let sealed_count = if self.active().is_some() {
            self.slots.len() - 1
        } else {
            self.slots.len()
        };
        let (mut start, mut end) = (0, sealed_count);
        while start < end {
            let mid = start + (end - start) / 2;
            if self.key_at(mid) < target {
                start = mid + 1;
            } else {
                end = mid;
            }
        }

        let mut candidates = Vec::new();
        let mut active_snapshot = None;
        let mut tail = false;

        for (position, slot) in self.slots.iter().enumerate().skip(start) {
            let descriptor = slot.current();
            candidates.push(PartitionRef {
                position,
                descriptor,
                store: Arc::clone(&slot.store),
            });

            if !descriptor.sealed {
                if let Ok(snapshot) = slot.store.snapshot() {
                    tail = target >= snapshot.max_timestamp;
                    active_snapshot = Some(snapshot);
                }
                break;
            }
            if descriptor.has_records() || descriptor.damaged {
                break;
            }
        }

        let mut tail_lsn = self
            .slots
            .iter()
            .filter(|slot| slot.descriptor.sealed)
            .map(|slot| slot.descriptor.last_known_lsn())
            .max()
            .unwrap_or(LSN_INVALID);
        if let Some(snapshot) = &active_snapshot {
            tail_lsn = tail_lsn.max(snapshot.last_lsn);
        } else if let Some(active) = self.slots.last().filter(|slot| !slot.descriptor.sealed) {
            tail_lsn = tail_lsn.max(active.current().last_known_lsn());
        }

        // Every sealed partition lies before the target: the target is past
        // everything the log holds.
        if candidates.is_empty() {
            tail = true;
        }

        let after_position = start + candidates.len();
        Ok(Some(Coverage {
            candidates,
            before: start
                .checked_sub(1)
                .and_then(|pos| self.slots.get(pos))
                .map(Slot::current),
            after: self.slots.get(after_position).map(Slot::current),
            active_snapshot,
            tail,
            tail_lsn,
        }))
    }
}
