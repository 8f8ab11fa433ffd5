//! Timestamp to LSN resolution.
//!
//! Given a target timestamp, finds the LSN of the first record whose
//! timestamp is at or after it:
//!
//! 1. Select candidate partitions from the log's directory.
//! 2. Capture a snapshot of the active partition, if it is a candidate.
//! 3. Binary search each candidate's index until one yields a record.
//! 4. With nothing found, answer the tail sentinel: last LSN + 1.
//!
//! A candidate whose store is unavailable is reopened once. If that fails
//! too, the answer is inferred from neighbouring partitions and flagged as
//! approximate and degraded. A damaged partition serves its readable prefix
//! exactly; past the prefix the answer is the LSN after it, also flagged.

use crate::error::{FindKeyError, Result};
use crate::lifecycle::{Coverage, LogPartitions, LogRegistry, PartitionDescriptor, PartitionRef};
use crate::storage::{IndexEntry, PartitionSnapshot};
use crate::types::{LogId, Lsn, Timestamp, LSN_INVALID};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a result interacts with the log's trim point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Never return an LSN at or below the trim point.
    #[default]
    Strict,
    /// Return the boundary as stored, even if it has been trimmed.
    Approximate,
}

/// A resolved boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindKeyResult {
    /// First LSN at or after the target, or the tail sentinel.
    pub lsn: Lsn,
    /// Timestamp of the record at `lsn`; for the sentinel, the highest
    /// timestamp the log held when searched.
    pub timestamp: Timestamp,
    /// True if `lsn` is a best-effort bound rather than the exact boundary.
    pub approximate: bool,
    /// True if a partition was unavailable and the bound was inferred.
    pub degraded: bool,
}

impl FindKeyResult {
    fn exact(lsn: Lsn, timestamp: Timestamp) -> Self {
        Self {
            lsn,
            timestamp,
            approximate: false,
            degraded: false,
        }
    }
}

/// Outcome of a FINDKEY search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindKeyOutcome {
    /// The boundary was resolved.
    Found(FindKeyResult),
    /// The log has no partitions.
    NotFound,
}

enum Search {
    Hit(IndexEntry, PartitionSnapshot),
    Tail(PartitionSnapshot),
    /// Past the readable prefix of a damaged partition.
    Lost(PartitionSnapshot),
    Miss,
}

/// Resolves timestamps to LSNs over the logs of a registry.
///
/// # Examples
/// ```rust,ignore
/// use alopex_findkey::findkey::{LsnResolver, SearchMode};
///
/// let resolver = LsnResolver::new(registry);
/// let outcome = resolver.find_key(LogId(1), 150, SearchMode::Strict)?;
/// ```
#[derive(Debug, Clone)]
pub struct LsnResolver {
    registry: Arc<LogRegistry>,
}

impl LsnResolver {
    /// Creates a resolver over `registry`.
    pub fn new(registry: Arc<LogRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry searched by this resolver.
    pub fn registry(&self) -> &Arc<LogRegistry> {
        &self.registry
    }

    /// Finds the first LSN at or after `target` in `log_id`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an unknown log, `InvariantViolation` if the
    /// log's directory is faulted, or a storage error when a partition is
    /// unavailable and no bound can be inferred.
    pub fn find_key(
        &self,
        log_id: LogId,
        target: Timestamp,
        mode: SearchMode,
    ) -> Result<FindKeyOutcome> {
        let log = self
            .registry
            .get(log_id)
            .ok_or_else(|| FindKeyError::Validation(format!("unknown log {}", log_id)))?;
        find_key_in(&log, target, mode)
    }
}

/// Finds the first LSN at or after `target` in one log.
pub fn find_key_in(log: &LogPartitions, target: Timestamp, mode: SearchMode) -> Result<FindKeyOutcome> {
    let coverage = match log.directory().find_partitions_covering(target)? {
        Some(coverage) => coverage,
        None => {
            debug!("FINDKEY log {} ts {}: no partitions", log.log_id(), target);
            return Ok(FindKeyOutcome::NotFound);
        }
    };
    let trim_point = log.trim_point();

    if coverage.tail {
        let result = tail_result(&coverage, coverage.active_snapshot.as_ref(), mode, trim_point);
        debug!(
            "FINDKEY log {} ts {}: tail sentinel {}",
            log.log_id(),
            target,
            result.lsn
        );
        return Ok(FindKeyOutcome::Found(result));
    }

    for (i, candidate) in coverage.candidates.iter().enumerate() {
        let snapshot = if candidate.descriptor.sealed {
            None
        } else {
            coverage.active_snapshot
        };

        let searched = match search_with_retry(candidate, snapshot, target) {
            Ok(searched) => searched,
            Err(err) if err.is_storage() => {
                return degrade(log.log_id(), &coverage, i, mode, trim_point, err)
                    .map(FindKeyOutcome::Found)
            }
            Err(err) => return Err(err),
        };

        match searched {
            Search::Hit(entry, snapshot) => {
                let result = strict_advance(candidate, &snapshot, entry, mode, trim_point);
                debug!(
                    "FINDKEY log {} ts {}: lsn {} in partition {}",
                    log.log_id(),
                    target,
                    result.lsn,
                    candidate.descriptor.partition_id
                );
                return Ok(FindKeyOutcome::Found(result));
            }
            Search::Tail(snapshot) => {
                return Ok(FindKeyOutcome::Found(tail_result(
                    &coverage,
                    Some(&snapshot),
                    mode,
                    trim_point,
                )))
            }
            Search::Lost(snapshot) => {
                if let Some(result) = lost_result(candidate, &snapshot, mode, trim_point) {
                    warn!(
                        "FINDKEY log {} ts {}: partition {} damaged, inferred lsn {}",
                        log.log_id(),
                        target,
                        candidate.descriptor.partition_id,
                        result.lsn
                    );
                    return Ok(FindKeyOutcome::Found(result));
                }
                let err = FindKeyError::storage(
                    candidate.store.path(),
                    io::Error::new(io::ErrorKind::InvalidData, "unreadable past indexed prefix"),
                );
                return degrade(log.log_id(), &coverage, i, mode, trim_point, err)
                    .map(FindKeyOutcome::Found);
            }
            Search::Miss => continue,
        }
    }

    Ok(FindKeyOutcome::Found(tail_result(
        &coverage,
        coverage.active_snapshot.as_ref(),
        mode,
        trim_point,
    )))
}

/// Searches one candidate, reopening its store once on a storage error.
fn search_with_retry(
    candidate: &PartitionRef,
    snapshot: Option<PartitionSnapshot>,
    target: Timestamp,
) -> Result<Search> {
    match search(candidate, snapshot, target) {
        Err(err) if err.is_storage() => {
            warn!(
                "Partition {} unavailable ({}), reopening",
                candidate.descriptor.partition_id, err
            );
            candidate.store.reopen()?;
            // Snapshot is retaken: the one captured before the failure may
            // describe an index the reopened store no longer serves.
            search(candidate, None, target)
        }
        other => other,
    }
}

fn search(
    candidate: &PartitionRef,
    snapshot: Option<PartitionSnapshot>,
    target: Timestamp,
) -> Result<Search> {
    let store = &candidate.store;
    let snapshot = match snapshot {
        Some(snapshot) => snapshot,
        None => store.snapshot()?,
    };

    if !candidate.descriptor.sealed && target >= snapshot.max_timestamp {
        return Ok(Search::Tail(snapshot));
    }

    Ok(match store.lower_bound(&snapshot, target)? {
        Some(entry) => Search::Hit(entry, snapshot),
        None if !candidate.descriptor.sealed => Search::Tail(snapshot),
        None if candidate.descriptor.damaged => Search::Lost(snapshot),
        None => Search::Miss,
    })
}

/// In strict mode, moves a trimmed result to the first retained LSN.
fn strict_advance(
    candidate: &PartitionRef,
    snapshot: &PartitionSnapshot,
    entry: IndexEntry,
    mode: SearchMode,
    trim_point: Lsn,
) -> FindKeyResult {
    if mode == SearchMode::Approximate || entry.lsn > trim_point {
        return FindKeyResult::exact(entry.lsn, entry.timestamp);
    }

    match candidate
        .store
        .first_at_or_after_lsn(snapshot, trim_point.saturating_add(1))
        .ok()
        .flatten()
    {
        Some(retained) => FindKeyResult::exact(retained.lsn, retained.timestamp),
        None => FindKeyResult::exact(trim_point.saturating_add(1), entry.timestamp),
    }
}

/// Bound for a target past a damaged partition's readable prefix: the LSN
/// after the prefix, or the partition's base LSN when nothing was readable.
fn lost_result(
    candidate: &PartitionRef,
    snapshot: &PartitionSnapshot,
    mode: SearchMode,
    trim_point: Lsn,
) -> Option<FindKeyResult> {
    let mut lsn = match snapshot.first_lsn {
        Some(_) => snapshot.last_lsn.saturating_add(1),
        None if candidate.descriptor.base_lsn != LSN_INVALID => candidate.descriptor.base_lsn,
        None => return None,
    };
    if mode == SearchMode::Strict {
        lsn = lsn.max(trim_point.saturating_add(1));
    }
    Some(FindKeyResult {
        lsn,
        timestamp: snapshot.max_timestamp,
        approximate: true,
        degraded: true,
    })
}

fn tail_result(
    coverage: &Coverage,
    snapshot: Option<&PartitionSnapshot>,
    mode: SearchMode,
    trim_point: Lsn,
) -> FindKeyResult {
    let tail_lsn = snapshot.map_or(coverage.tail_lsn, |snapshot| {
        snapshot.last_lsn.max(coverage.tail_lsn)
    });
    let timestamp = snapshot.map(|snapshot| snapshot.max_timestamp).unwrap_or_else(|| {
        coverage
            .before
            .iter()
            .chain(coverage.candidates.iter().map(|candidate| &candidate.descriptor))
            .filter_map(|descriptor| descriptor.max_timestamp)
            .max()
            .unwrap_or_default()
    });

    let mut lsn = tail_lsn.saturating_add(1);
    if mode == SearchMode::Strict {
        lsn = lsn.max(trim_point.saturating_add(1));
    }
    FindKeyResult::exact(lsn, timestamp)
}

/// Infers a bound for an unavailable candidate from its neighbours.
fn degrade(
    log_id: LogId,
    coverage: &Coverage,
    failed: usize,
    mode: SearchMode,
    trim_point: Lsn,
    err: FindKeyError,
) -> Result<FindKeyResult> {
    let failed_descriptor = coverage.candidates[failed].descriptor;
    let prev: Option<PartitionDescriptor> = match failed.checked_sub(1) {
        Some(i) => Some(coverage.candidates[i].descriptor),
        None => coverage.before,
    };
    let next: Option<PartitionDescriptor> = coverage
        .candidates
        .get(failed + 1)
        .map(|candidate| candidate.descriptor)
        .or(coverage.after);

    let inferred = prev
        .and_then(|descriptor| descriptor.last_lsn)
        .map(|lsn| lsn.saturating_add(1))
        .or(Some(failed_descriptor.base_lsn).filter(|&lsn| lsn != LSN_INVALID))
        .or_else(|| next.and_then(|descriptor| descriptor.first_lsn));

    match inferred {
        Some(mut lsn) => {
            if mode == SearchMode::Strict {
                lsn = lsn.max(trim_point.saturating_add(1));
            }
            warn!(
                "FINDKEY log {}: partition {} unavailable ({}), inferred lsn {}",
                log_id, failed_descriptor.partition_id, err, lsn
            );
            Ok(FindKeyResult {
                lsn,
                timestamp: failed_descriptor.start_ts,
                approximate: true,
                degraded: true,
            })
        }
        None => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, SyncMode};
    use crate::storage::{LocalPartitionStore, PartitionLayout, PartitionMeta};
    use crate::types::{Record, LSN_MAX};
    use std::fs;
    use tempfile::TempDir;

    /// Sealed [0,100), [100,200), [200,300) with a record every 10ms and an
    /// empty active partition at 300. LSNs 1..=30.
    fn sample_registry(temp_dir: &TempDir) -> Arc<LogRegistry> {
        let config = StoreConfig::new(temp_dir.path())
            .with_sync_mode(SyncMode::None)
            .with_max_partition_span_ms(100);
        let registry = Arc::new(LogRegistry::new(config));
        let log = registry.create_log(LogId(1)).unwrap();
        for ts in (0..300).step_by(10) {
            log.append(Record::new(ts, b"x".to_vec())).unwrap();
        }
        log.rotate(300).unwrap();
        registry
    }

    fn found(outcome: FindKeyOutcome) -> FindKeyResult {
        match outcome {
            FindKeyOutcome::Found(result) => result,
            FindKeyOutcome::NotFound => panic!("expected a result"),
        }
    }

    #[test]
    fn test_lower_bound_in_covering_partition() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = LsnResolver::new(sample_registry(&temp_dir));

        let result = found(resolver.find_key(LogId(1), 150, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 16);
        assert_eq!(result.timestamp, 150);
        assert!(!result.approximate);

        let result = found(resolver.find_key(LogId(1), 151, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 17);
        assert_eq!(result.timestamp, 160);
    }

    #[test]
    fn test_before_first_partition_returns_first_record() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = LsnResolver::new(sample_registry(&temp_dir));

        let result = found(resolver.find_key(LogId(1), -1_000, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 1);
        assert_eq!(result.timestamp, 0);
    }

    #[test]
    fn test_beyond_tail_returns_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = LsnResolver::new(sample_registry(&temp_dir));

        let result = found(resolver.find_key(LogId(1), 500, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 31);
        assert!(!result.approximate);
        assert!(!result.degraded);

        // Between the last sealed record and the active start.
        let result = found(resolver.find_key(LogId(1), 295, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 31);
    }

    #[test]
    fn test_active_partition_records_are_found() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        let log = registry.get(LogId(1)).unwrap();
        log.append(Record::new(310, b"a".to_vec())).unwrap();
        log.append(Record::new(320, b"b".to_vec())).unwrap();
        let resolver = LsnResolver::new(registry);

        let result = found(resolver.find_key(LogId(1), 305, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 31);
        // At the active maximum the tail sentinel is returned.
        let result = found(resolver.find_key(LogId(1), 320, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 33);
    }

    #[test]
    fn test_zero_partitions_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(LogRegistry::new(StoreConfig::new(temp_dir.path())));
        registry.create_log(LogId(9)).unwrap();
        let resolver = LsnResolver::new(registry);

        assert_eq!(
            resolver.find_key(LogId(9), 10, SearchMode::Strict).unwrap(),
            FindKeyOutcome::NotFound
        );
    }

    #[test]
    fn test_unknown_log_is_validation_error() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = LsnResolver::new(sample_registry(&temp_dir));
        assert!(matches!(
            resolver.find_key(LogId(77), 10, SearchMode::Strict),
            Err(FindKeyError::Validation(_))
        ));
    }

    #[test]
    fn test_strict_mode_skips_trimmed_records() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        registry.get(LogId(1)).unwrap().trim(12).unwrap();
        let resolver = LsnResolver::new(registry);

        let strict = found(resolver.find_key(LogId(1), 100, SearchMode::Strict).unwrap());
        assert_eq!(strict.lsn, 13);
        assert_eq!(strict.timestamp, 120);

        let approximate = found(resolver.find_key(LogId(1), 100, SearchMode::Approximate).unwrap());
        assert_eq!(approximate.lsn, 11);
    }

    #[test]
    fn test_reopen_retry_recovers_closed_store() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        let log = registry.get(LogId(1)).unwrap();
        log.directory().store(1).unwrap().close().unwrap();
        let resolver = LsnResolver::new(registry);

        let result = found(resolver.find_key(LogId(1), 150, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 16);
        assert!(!result.degraded);
    }

    #[test]
    fn test_missing_partition_degrades_to_neighbour_bound() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        let log = registry.get(LogId(1)).unwrap();
        {
            let directory = log.directory();
            let store = directory.store(1).unwrap();
            store.close().unwrap();
            fs::remove_file(store.path()).unwrap();
        }
        let resolver = LsnResolver::new(registry);

        let result = found(resolver.find_key(LogId(1), 150, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 11);
        assert_eq!(result.timestamp, 100);
        assert!(result.approximate);
        assert!(result.degraded);
    }

    #[test]
    fn test_failed_active_partition_degrades_to_previous_bound() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path())
            .with_sync_mode(SyncMode::None)
            .with_max_partition_span_ms(100);
        let log = LogPartitions::open(LogId(1), &config).unwrap();
        for ts in (0..150).step_by(10) {
            log.append(Record::new(ts, b"x".to_vec())).unwrap();
        }
        {
            let directory = log.directory();
            let active = directory.active().unwrap();
            assert_eq!(active.meta().start_ts, 100);
            active.close().unwrap();
            fs::remove_file(active.path()).unwrap();
        }

        let result = found(find_key_in(&log, 120, SearchMode::Strict).unwrap());
        assert_eq!(result.lsn, 11);
        assert_eq!(result.timestamp, 100);
        assert!(result.approximate);
        assert!(result.degraded);
        assert_eq!(
            log.directory().active().unwrap().state(),
            crate::storage::StoreState::Failed
        );
    }

    #[test]
    fn test_strict_mode_clamps_degraded_result() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        let log = registry.get(LogId(1)).unwrap();
        assert_eq!(log.trim(25).unwrap(), 2);
        {
            let directory = log.directory();
            let store = directory.store(0).unwrap();
            assert_eq!(store.meta().base_lsn, 21);
            store.close().unwrap();
            fs::remove_file(store.path()).unwrap();
        }
        let resolver = LsnResolver::new(registry);

        let strict = found(resolver.find_key(LogId(1), 250, SearchMode::Strict).unwrap());
        assert_eq!(strict.lsn, 26);
        assert!(strict.degraded);

        let approximate = found(resolver.find_key(LogId(1), 250, SearchMode::Approximate).unwrap());
        assert_eq!(approximate.lsn, 21);
        assert_eq!(approximate.timestamp, 200);
        assert!(approximate.degraded);
    }

    #[test]
    fn test_no_inferable_bound_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path()).with_sync_mode(SyncMode::None);
        let path = PartitionLayout::new(&config.data_dir).partition_path(LogId(1), 0);
        {
            let meta = PartitionMeta {
                log_id: LogId(1),
                partition_id: 0,
                start_ts: 0,
                base_lsn: LSN_INVALID,
            };
            let store = LocalPartitionStore::open(&path, meta, &config).unwrap();
            store.append(Record::new(10, b"x".to_vec())).unwrap();
            store.seal(20).unwrap();
        }

        let log = LogPartitions::open(LogId(1), &config).unwrap();
        {
            let directory = log.directory();
            let store = directory.store(0).unwrap();
            store.close().unwrap();
            fs::remove_file(store.path()).unwrap();
        }

        let err = find_key_in(&log, 0, SearchMode::Strict).unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_full_trim_does_not_overflow() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        let log = registry.get(LogId(1)).unwrap();
        log.trim(LSN_MAX).unwrap();
        let resolver = LsnResolver::new(Arc::clone(&registry));

        let strict = found(resolver.find_key(LogId(1), 150, SearchMode::Strict).unwrap());
        assert_eq!(strict.lsn, LSN_MAX);
        let approximate = found(resolver.find_key(LogId(1), 150, SearchMode::Approximate).unwrap());
        assert_eq!(approximate.lsn, 31);
        let tail = found(resolver.find_key(LogId(1), 500, SearchMode::Strict).unwrap());
        assert_eq!(tail.lsn, LSN_MAX);

        // A record appended after the full trim is itself trimmed.
        assert_eq!(log.append(Record::new(310, b"y".to_vec())).unwrap(), 31);
        let strict = found(resolver.find_key(LogId(1), 305, SearchMode::Strict).unwrap());
        assert_eq!(strict.lsn, LSN_MAX);
        let approximate = found(resolver.find_key(LogId(1), 305, SearchMode::Approximate).unwrap());
        assert_eq!(approximate.lsn, 31);
    }

    #[test]
    fn test_damaged_partition_serves_readable_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let registry = sample_registry(&temp_dir);
        let config = registry.config().clone();
        let (path, offset) = {
            let log = registry.get(LogId(1)).unwrap();
            let directory = log.directory();
            let store = directory.store(0).unwrap();
            let snapshot = store.snapshot().unwrap();
            let fourth = store.first_at_or_after_lsn(&snapshot, 4).unwrap().unwrap();
            (store.path().to_path_buf(), fourth.offset - 1)
        };
        drop(registry);

        // Last payload byte of LSN 3.
        let mut bytes = fs::read(&path).unwrap();
        bytes[offset as usize] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let resolver = LsnResolver::new(Arc::new(LogRegistry::open(config).unwrap()));

        let before = found(resolver.find_key(LogId(1), 10, SearchMode::Strict).unwrap());
        assert_eq!(before.lsn, 2);
        assert!(!before.degraded);

        let lost = found(resolver.find_key(LogId(1), 50, SearchMode::Strict).unwrap());
        assert_eq!(lost.lsn, 3);
        assert_eq!(lost.timestamp, 10);
        assert!(lost.approximate);
        assert!(lost.degraded);

        let after = found(resolver.find_key(LogId(1), 150, SearchMode::Strict).unwrap());
        assert_eq!(after.lsn, 16);
        assert!(!after.degraded);

        assert_eq!(fs::read(&path).unwrap(), bytes);
    }
}
