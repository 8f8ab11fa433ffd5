//! Durable append-only storage for a single partition file.
//!
//! # File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (38 bytes)                                           │
//! │  - Magic: "ALPT" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Partition ID: u64 (8 bytes)                               │
//! │  - Log ID: u64 (8 bytes)                                     │
//! │  - Start Timestamp: i64 (8 bytes)                            │
//! │  - Base LSN: u64 (8 bytes, 0 = unknown)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entries (repeated)                                          │
//! │  - Length: u32 | CRC32: u32 | Body                           │
//! │  - Body: type u8 | lsn u64 | timestamp i64 | payload         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entry type 1 is a record, type 2 is the seal marker. A sealed partition
//! carries exactly one seal marker as its last entry; its timestamp field is
//! the partition's exclusive end timestamp.
//!
//! # Recovery
//!
//! Opening a file scans it from the start. An entry cut short by the end of
//! the file is a torn append: an unsealed file is truncated back to the last
//! complete entry. Any other unreadable entry (bad checksum, impossible
//! length, unknown type) leaves the file untouched and the store *damaged*:
//! the readable prefix is served read-only and searches that run past it
//! report a degraded bound. A file loaded with [`LocalPartitionStore::load_complete`]
//! is known to have been finished, so an entry cut short there is damage too.
//!
//! # Visibility
//!
//! Each append is encoded into one buffer and written with a single
//! `write_all` on an `O_APPEND` handle. The record becomes visible to
//! searchers only once its index entry is pushed under the index write lock,
//! which happens after the bytes are on disk.

use crate::config::{StoreConfig, SyncMode};
use crate::error::{FindKeyError, Result};
use crate::types::{LogId, Lsn, PartitionId, Record, Timestamp, LSN_INVALID, LSN_MAX};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

/// Magic bytes for the partition file header: "ALPT"
pub const PARTITION_MAGIC: [u8; 4] = *b"ALPT";

/// Current partition file format version.
pub const PARTITION_VERSION: u16 = 1;

/// Largest payload accepted by a single append (32 MB).
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Size of the fixed part of an entry body (type + lsn + timestamp).
const ENTRY_BODY_FIXED: usize = 1 + 8 + 8;

/// Size of the entry frame prefix (length + crc).
const ENTRY_FRAME: usize = 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum EntryType {
    Record = 1,
    Seal = 2,
}

/// Lifecycle state of a partition store's file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No handle is held; `reopen` is required before use.
    Closed,
    /// The file is open and the index is servable.
    Open,
    /// The last open or write failed; `reopen` may recover.
    Failed,
}

/// Identity and starting bounds of a partition, persisted in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMeta {
    /// Owning log.
    pub log_id: LogId,
    /// Partition identifier within the log.
    pub partition_id: PartitionId,
    /// Inclusive start of the partition's time range.
    pub start_ts: Timestamp,
    /// First LSN this partition may hold, or `LSN_INVALID` when unknown.
    pub base_lsn: Lsn,
}

impl PartitionMeta {
    /// Serialized header size in bytes.
    pub const SIZE: usize = 38; // 4 + 2 + 8 + 8 + 8 + 8

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&PARTITION_MAGIC)?;
        writer.write_all(&PARTITION_VERSION.to_le_bytes())?;
        writer.write_all(&self.partition_id.to_le_bytes())?;
        writer.write_all(&self.log_id.val().to_le_bytes())?;
        writer.write_all(&self.start_ts.to_le_bytes())?;
        writer.write_all(&self.base_lsn.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != PARTITION_MAGIC {
            return Err(FindKeyError::InvalidMagic(magic));
        }

        let mut buf2 = [0u8; 2];
        reader.read_exact(&mut buf2)?;
        let version = u16::from_le_bytes(buf2);
        if version != PARTITION_VERSION {
            return Err(FindKeyError::UnsupportedVersion(version));
        }

        let mut buf8 = [0u8; 8];
        reader.read_exact(&mut buf8)?;
        let partition_id = u64::from_le_bytes(buf8);
        reader.read_exact(&mut buf8)?;
        let log_id = LogId(u64::from_le_bytes(buf8));
        reader.read_exact(&mut buf8)?;
        let start_ts = i64::from_le_bytes(buf8);
        reader.read_exact(&mut buf8)?;
        let base_lsn = u64::from_le_bytes(buf8);

        Ok(Self {
            log_id,
            partition_id,
            start_ts,
            base_lsn,
        })
    }
}

/// Position of one record in the partition's in-memory index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record LSN.
    pub lsn: Lsn,
    /// Timestamp as appended.
    pub timestamp: Timestamp,
    /// Running maximum of timestamps up to and including this record.
    ///
    /// Never below the partition start. Searches run over watermarks so that
    /// small timestamp disorder cannot break the lower-bound search.
    pub watermark: Timestamp,
    /// Byte offset of the entry frame in the file.
    pub offset: u64,
}

/// Bounds of a partition captured at one instant.
///
/// Searches against a snapshot only see the first `len` index entries, so
/// records appended afterwards stay invisible to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSnapshot {
    /// Partition identifier.
    pub partition_id: PartitionId,
    /// Number of visible index entries.
    pub len: usize,
    /// LSN of the first visible record.
    pub first_lsn: Option<Lsn>,
    /// LSN of the last visible record, or `base_lsn - 1` when empty.
    pub last_lsn: Lsn,
    /// Highest visible watermark, or the partition start when empty.
    pub max_timestamp: Timestamp,
    /// Whether the partition was sealed when captured.
    pub sealed: bool,
}

impl PartitionSnapshot {
    /// Returns true if no record is visible.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bounds of a partition read under a single index lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreBounds {
    /// First record LSN, if any.
    pub first_lsn: Option<Lsn>,
    /// Last record LSN, if any.
    pub last_lsn: Option<Lsn>,
    /// Highest watermark, if any record is indexed.
    pub max_timestamp: Option<Timestamp>,
    /// Exclusive end timestamp, once sealed and known.
    pub end_ts: Option<Timestamp>,
    /// Whether the partition is sealed.
    pub sealed: bool,
    /// Whether records past the indexed prefix could not be read.
    pub damaged: bool,
}

/// Final bounds of a partition, produced by [`LocalPartitionStore::seal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealedBounds {
    /// Partition identifier.
    pub partition_id: PartitionId,
    /// Inclusive start timestamp.
    pub start_ts: Timestamp,
    /// Exclusive end timestamp.
    pub end_ts: Timestamp,
    /// First record LSN, if any record was stored.
    pub first_lsn: Option<Lsn>,
    /// Last record LSN, if any record was stored.
    pub last_lsn: Option<Lsn>,
    /// Highest watermark, if any record was stored.
    pub max_timestamp: Option<Timestamp>,
    /// Number of records.
    pub record_count: usize,
}

#[derive(Debug)]
struct ReadView {
    state: StoreState,
    sealed: bool,
    damaged: bool,
    end_ts: Option<Timestamp>,
    entries: Vec<IndexEntry>,
}

#[derive(Debug)]
struct WriteHandle {
    file: Option<File>,
    size: u64,
}

/// Result of scanning a partition file from the start.
struct ScanOutcome {
    meta: PartitionMeta,
    entries: Vec<IndexEntry>,
    end_ts: Option<Timestamp>,
    valid_len: u64,
    file_len: u64,
    /// First unreadable entry that is not a torn tail.
    corrupt: Option<FindKeyError>,
}

/// Durable, append-only storage for one partition of a log.
///
/// The store is single-writer (appends are serialized by the caller's
/// sequencer and by an internal mutex) and many-reader: searches take only a
/// read lock on the in-memory index.
#[derive(Debug)]
pub struct LocalPartitionStore {
    path: PathBuf,
    meta: PartitionMeta,
    sync_mode: SyncMode,
    file_mode: u32,
    writer: Mutex<WriteHandle>,
    view: RwLock<ReadView>,
    /// Whether a short final entry may be cut off as a torn append.
    truncate_torn: bool,
}

impl LocalPartitionStore {
    /// Creates or opens the partition file at `path` for append.
    ///
    /// A new file gets the configured permission bits (`0o664` by default)
    /// and a header built from `meta`. An existing file is scanned to rebuild
    /// the record index; its header must match `meta`.
    ///
    /// # Errors
    ///
    /// Returns a storage error on filesystem denial or exhaustion, or if the
    /// existing file is not a partition file for `meta`.
    pub fn open(path: impl AsRef<Path>, meta: PartitionMeta, config: &StoreConfig) -> Result<Self> {
        let store = Self::closed(path.as_ref(), meta, config);
        store.reopen()?;
        Ok(store)
    }

    /// Opens an existing partition file, taking its identity from the header.
    ///
    /// Used on restart when only the file is known.
    pub fn load(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        Self::open(path, Self::read_meta(path)?, config)
    }

    /// Like [`load`](Self::load), for a file that a later partition follows.
    ///
    /// Such a file was finished before the next one was created, so an entry
    /// cut short at its end is damage and the file is never truncated.
    pub fn load_complete(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut store = Self::closed(path, Self::read_meta(path)?, config);
        store.truncate_torn = false;
        store.reopen()?;
        Ok(store)
    }

    fn read_meta(path: &Path) -> Result<PartitionMeta> {
        let file = File::open(path).map_err(|e| FindKeyError::storage(path, e))?;
        let mut reader = BufReader::new(file);
        PartitionMeta::read_from(&mut reader).map_err(|e| match e {
            FindKeyError::Io(source) => FindKeyError::storage(path, source),
            other => other,
        })
    }

    /// Builds a store for a partition file whose header cannot be read.
    ///
    /// The store starts `Failed`, sealed and damaged with an empty index, so
    /// searches that reach it degrade instead of failing the whole log.
    /// `meta` is the caller's best estimate of the partition's identity.
    pub fn unreadable(path: impl AsRef<Path>, meta: PartitionMeta, config: &StoreConfig) -> Self {
        let store = Self::closed(path.as_ref(), meta, config);
        {
            let mut view = store.write_view();
            view.state = StoreState::Failed;
            view.sealed = true;
            view.damaged = true;
        }
        store
    }

    fn closed(path: &Path, meta: PartitionMeta, config: &StoreConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            meta,
            sync_mode: config.sync_mode,
            file_mode: config.file_mode,
            writer: Mutex::new(WriteHandle {
                file: None,
                size: 0,
            }),
            view: RwLock::new(ReadView {
                state: StoreState::Closed,
                sealed: false,
                damaged: false,
                end_ts: None,
                entries: Vec::new(),
            }),
            truncate_torn: true,
        }
    }

    /// Re-establishes the file handle after external rotation or restart.
    ///
    /// Calling it while the store is open is a no-op success. On failure the
    /// store is left `Failed` and the error is returned; the process is never
    /// terminated. The whole transition runs under the writer lock, so it
    /// always completes once started.
    pub fn reopen(&self) -> Result<()> {
        let mut handle = self.writer.lock().unwrap_or_else(|err| err.into_inner());

        if self.read_view().state == StoreState::Open {
            return Ok(());
        }

        match self.establish(&mut handle) {
            Ok(()) => {
                debug!(
                    "Opened partition {} of log {} at {}",
                    self.meta.partition_id,
                    self.meta.log_id,
                    self.path.display()
                );
                Ok(())
            }
            Err(err) => {
                handle.file = None;
                self.write_view().state = StoreState::Failed;
                error!(
                    "Could not re-open partition file {}: {}",
                    self.path.display(),
                    err
                );
                Err(err)
            }
        }
    }

    fn establish(&self, handle: &mut WriteHandle) -> Result<()> {
        let (sealed, known_records) = {
            let view = self.read_view();
            (view.sealed, view.entries.len())
        };

        let existing_len = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => 0,
            Err(err) => return Err(FindKeyError::storage(&self.path, err)),
        };

        // Shorter than a header: the file was never fully created.
        if existing_len < PartitionMeta::SIZE as u64 {
            if sealed || known_records > 0 {
                return Err(FindKeyError::storage(
                    &self.path,
                    std::io::Error::new(
                        ErrorKind::NotFound,
                        "partition file missing or emptied after records were stored",
                    ),
                ));
            }
            let file = self.create_file()?;
            handle.file = Some(file);
            handle.size = PartitionMeta::SIZE as u64;
            self.write_view().state = StoreState::Open;
            return Ok(());
        }

        let scan = self.scan()?;
        if scan.meta != self.meta {
            return Err(FindKeyError::CorruptEntry {
                offset: 0,
                reason: format!(
                    "header mismatch: expected partition {} of log {}, found partition {} of log {}",
                    self.meta.partition_id,
                    self.meta.log_id,
                    scan.meta.partition_id,
                    scan.meta.log_id
                ),
            });
        }
        if scan.entries.len() < known_records {
            return Err(FindKeyError::CorruptEntry {
                offset: scan.valid_len,
                reason: format!(
                    "file holds {} records, {} were acknowledged",
                    scan.entries.len(),
                    known_records
                ),
            });
        }

        let torn = scan.corrupt.is_none() && scan.valid_len < scan.file_len;
        let damaged = scan.corrupt.is_some() || (torn && !self.truncate_torn);
        if damaged {
            let cause = scan
                .corrupt
                .as_ref()
                .map_or_else(|| "entry cut short".to_string(), ToString::to_string);
            error!(
                "Partition {} is damaged at offset {} ({}); serving {} readable records",
                self.path.display(),
                scan.valid_len,
                cause,
                scan.entries.len()
            );
        }

        let now_sealed = sealed || damaged || scan.end_ts.is_some();
        if now_sealed {
            handle.file = None;
        } else {
            let file = self.open_append()?;
            if scan.valid_len < scan.file_len {
                warn!(
                    "Truncating torn tail of partition {}: {} -> {} bytes",
                    self.path.display(),
                    scan.file_len,
                    scan.valid_len
                );
                file.set_len(scan.valid_len)
                    .map_err(|e| FindKeyError::storage(&self.path, e))?;
            }
            handle.file = Some(file);
        }
        handle.size = if damaged { scan.file_len } else { scan.valid_len };

        let mut view = self.write_view();
        if view.entries.len() < scan.entries.len() {
            view.entries = scan.entries;
        }
        view.sealed = now_sealed;
        view.damaged = damaged;
        if view.end_ts.is_none() {
            view.end_ts = scan.end_ts;
        }
        view.state = StoreState::Open;
        Ok(())
    }

    fn create_file(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| FindKeyError::storage(parent, e))?;
        }

        let mut file = self.open_append()?;
        file.set_len(0)
            .map_err(|e| FindKeyError::storage(&self.path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(self.file_mode))
                .map_err(|e| FindKeyError::storage(&self.path, e))?;
        }

        let mut header = Vec::with_capacity(PartitionMeta::SIZE);
        self.meta.write_to(&mut header)?;
        file.write_all(&header)
            .and_then(|_| file.sync_all())
            .map_err(|e| FindKeyError::storage(&self.path, e))?;
        Ok(file)
    }

    fn open_append(&self) -> Result<File> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.file_mode);
        }
        options
            .open(&self.path)
            .map_err(|e| FindKeyError::storage(&self.path, e))
    }

    fn scan(&self) -> Result<ScanOutcome> {
        let file = File::open(&self.path).map_err(|e| FindKeyError::storage(&self.path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| FindKeyError::storage(&self.path, e))?
            .len();
        let mut reader = BufReader::new(file);

        let meta = PartitionMeta::read_from(&mut reader).map_err(|e| match e {
            FindKeyError::Io(source) => FindKeyError::storage(&self.path, source),
            other => other,
        })?;

        let mut entries: Vec<IndexEntry> = Vec::new();
        let mut end_ts = None;
        let mut offset = PartitionMeta::SIZE as u64;
        let mut watermark = meta.start_ts;
        let mut corrupt = None;

        loop {
            match read_entry(&mut reader, offset) {
                Ok(None) => break,
                Ok(Some((entry_type, lsn, timestamp, frame_len))) => {
                    if end_ts.is_some() {
                        warn!(
                            "Ignoring entries after seal marker in {} at offset {}",
                            self.path.display(),
                            offset
                        );
                        break;
                    }
                    match entry_type {
                        EntryType::Record => {
                            watermark = watermark.max(timestamp);
                            entries.push(IndexEntry {
                                lsn,
                                timestamp,
                                watermark,
                                offset,
                            });
                        }
                        EntryType::Seal => end_ts = Some(timestamp),
                    }
                    offset += frame_len;
                }
                Err(FindKeyError::Io(err)) => return Err(FindKeyError::storage(&self.path, err)),
                Err(err) => {
                    warn!(
                        "Stopping scan of {} at offset {}: {}",
                        self.path.display(),
                        offset,
                        err
                    );
                    corrupt = Some(err);
                    break;
                }
            }
        }

        debug!(
            "Scanned {} records from {}",
            entries.len(),
            self.path.display()
        );

        Ok(ScanOutcome {
            meta,
            entries,
            end_ts,
            valid_len: offset,
            file_len,
            corrupt,
        })
    }

    /// Closes the file handle, flushing pending writes.
    pub fn close(&self) -> Result<()> {
        let mut handle = self.writer.lock().unwrap_or_else(|err| err.into_inner());
        let synced = match handle.file.take() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        };
        self.write_view().state = StoreState::Closed;
        synced.map_err(|e| FindKeyError::storage(&self.path, e))
    }

    /// Appends one record and returns its LSN.
    ///
    /// A record carrying `LSN_INVALID` is assigned the next LSN; otherwise its
    /// LSN is accepted if it lies past the last stored LSN (gaps allowed).
    ///
    /// # Errors
    ///
    /// Fails if the store is not open, is sealed, if the LSN does not advance,
    /// or on I/O failure. An I/O failure leaves the store `Failed`.
    pub fn append(&self, record: Record) -> Result<Lsn> {
        let mut handle = self.writer.lock().unwrap_or_else(|err| err.into_inner());

        let (last_lsn, last_watermark) = {
            let view = self.read_view();
            if view.sealed {
                return Err(FindKeyError::Sealed(self.meta.partition_id));
            }
            if view.state != StoreState::Open {
                return Err(FindKeyError::StoreUnavailable {
                    partition: self.meta.partition_id,
                    state: view.state,
                });
            }
            (
                self.last_lsn_of(&view.entries),
                view.entries
                    .last()
                    .map_or(self.meta.start_ts, |entry| entry.watermark),
            )
        };

        let lsn = if record.lsn == LSN_INVALID {
            last_lsn + 1
        } else {
            record.lsn
        };
        if lsn <= last_lsn || lsn >= LSN_MAX {
            return Err(FindKeyError::LsnOutOfOrder {
                got: lsn,
                last: last_lsn,
            });
        }
        if record.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FindKeyError::Validation(format!(
                "payload of {} bytes exceeds limit of {}",
                record.payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let frame = encode_entry(EntryType::Record, lsn, record.timestamp, &record.payload);
        let offset = handle.size;
        if let Err(err) = self.write_frame(&mut handle, &frame) {
            handle.file = None;
            self.write_view().state = StoreState::Failed;
            error!(
                "Append to partition {} failed: {}",
                self.path.display(),
                err
            );
            return Err(err);
        }
        handle.size += frame.len() as u64;

        self.write_view().entries.push(IndexEntry {
            lsn,
            timestamp: record.timestamp,
            watermark: last_watermark.max(record.timestamp),
            offset,
        });

        Ok(lsn)
    }

    fn write_frame(&self, handle: &mut WriteHandle, frame: &[u8]) -> Result<()> {
        let file = handle
            .file
            .as_mut()
            .ok_or(FindKeyError::StoreUnavailable {
                partition: self.meta.partition_id,
                state: StoreState::Closed,
            })?;

        file.write_all(frame)
            .and_then(|_| file.flush())
            .map_err(|e| FindKeyError::storage(&self.path, e))?;

        match self.sync_mode {
            SyncMode::Fsync => file.sync_all(),
            SyncMode::Fdatasync => file.sync_data(),
            SyncMode::None => Ok(()),
        }
        .map_err(|e| FindKeyError::storage(&self.path, e))
    }

    /// Seals the partition: flushes, writes the seal marker, and drops the
    /// write handle for good.
    ///
    /// `end_ts` becomes the exclusive end of the partition's time range; it
    /// is raised to the highest stored watermark if it lies below it. The
    /// returned bounds are what the directory records for the sealed
    /// partition before it allocates the next active one.
    pub fn seal(&self, end_ts: Timestamp) -> Result<SealedBounds> {
        let mut handle = self.writer.lock().unwrap_or_else(|err| err.into_inner());

        let (last_lsn, max_watermark) = {
            let view = self.read_view();
            if view.sealed {
                return Err(FindKeyError::Sealed(self.meta.partition_id));
            }
            if view.state != StoreState::Open {
                return Err(FindKeyError::StoreUnavailable {
                    partition: self.meta.partition_id,
                    state: view.state,
                });
            }
            (
                self.last_lsn_of(&view.entries),
                view.entries.last().map(|entry| entry.watermark),
            )
        };

        let end_ts = end_ts
            .max(max_watermark.unwrap_or(self.meta.start_ts))
            .max(self.meta.start_ts);
        let frame = encode_entry(EntryType::Seal, last_lsn, end_ts, &[]);

        let sealed = self.write_frame(&mut handle, &frame).and_then(|_| {
            handle
                .file
                .as_ref()
                .map_or(Ok(()), |file| file.sync_all())
                .map_err(|e| FindKeyError::storage(&self.path, e))
        });
        if let Err(err) = sealed {
            handle.file = None;
            self.write_view().state = StoreState::Failed;
            error!("Seal of partition {} failed: {}", self.path.display(), err);
            return Err(err);
        }
        handle.size += frame.len() as u64;
        handle.file = None;

        let mut view = self.write_view();
        view.sealed = true;
        view.end_ts = Some(end_ts);

        debug!(
            "Sealed partition {} of log {} at end_ts {} ({} records)",
            self.meta.partition_id,
            self.meta.log_id,
            end_ts,
            view.entries.len()
        );

        Ok(SealedBounds {
            partition_id: self.meta.partition_id,
            start_ts: self.meta.start_ts,
            end_ts,
            first_lsn: view.entries.first().map(|entry| entry.lsn),
            last_lsn: view.entries.last().map(|entry| entry.lsn),
            max_timestamp: view.entries.last().map(|entry| entry.watermark),
            record_count: view.entries.len(),
        })
    }

    /// Captures the currently visible bounds of the partition.
    pub fn snapshot(&self) -> Result<PartitionSnapshot> {
        let view = self.servable_view()?;
        Ok(PartitionSnapshot {
            partition_id: self.meta.partition_id,
            len: view.entries.len(),
            first_lsn: view.entries.first().map(|entry| entry.lsn),
            last_lsn: self.last_lsn_of(&view.entries),
            max_timestamp: view
                .entries
                .last()
                .map_or(self.meta.start_ts, |entry| entry.watermark),
            sealed: view.sealed,
        })
    }

    /// Finds the first record in `snapshot` whose watermark is at or after
    /// `target`. Among equal timestamps this is the smallest LSN.
    pub fn lower_bound(
        &self,
        snapshot: &PartitionSnapshot,
        target: Timestamp,
    ) -> Result<Option<IndexEntry>> {
        let view = self.servable_view()?;
        let visible = &view.entries[..snapshot.len.min(view.entries.len())];
        let idx = visible.partition_point(|entry| entry.watermark < target);
        Ok(visible.get(idx).copied())
    }

    /// Finds the first record in `snapshot` whose LSN is at or after `lsn`.
    pub fn first_at_or_after_lsn(
        &self,
        snapshot: &PartitionSnapshot,
        lsn: Lsn,
    ) -> Result<Option<IndexEntry>> {
        let view = self.servable_view()?;
        let visible = &view.entries[..snapshot.len.min(view.entries.len())];
        let idx = visible.partition_point(|entry| entry.lsn < lsn);
        Ok(visible.get(idx).copied())
    }

    /// Reads a stored record back from disk.
    pub fn read(&self, lsn: Lsn) -> Result<Option<Record>> {
        let entry = {
            let view = self.servable_view()?;
            match view.entries.binary_search_by_key(&lsn, |entry| entry.lsn) {
                Ok(idx) => view.entries[idx],
                Err(_) => return Ok(None),
            }
        };

        let mut file = File::open(&self.path).map_err(|e| FindKeyError::storage(&self.path, e))?;
        file.seek(SeekFrom::Start(entry.offset))
            .map_err(|e| FindKeyError::storage(&self.path, e))?;
        let mut reader = BufReader::new(file);
        let (entry_type, payload) = read_payload(&mut reader, entry.offset)?;
        if entry_type != EntryType::Record {
            return Err(FindKeyError::CorruptEntry {
                offset: entry.offset,
                reason: "index points at a non-record entry".to_string(),
            });
        }

        Ok(Some(Record {
            lsn: entry.lsn,
            timestamp: entry.timestamp,
            payload,
        }))
    }

    /// Returns the partition's persisted identity.
    pub fn meta(&self) -> &PartitionMeta {
        &self.meta
    }

    /// Returns the partition identifier.
    pub fn partition_id(&self) -> PartitionId {
        self.meta.partition_id
    }

    /// Returns the partition file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current state of the file handle.
    pub fn state(&self) -> StoreState {
        self.read_view().state
    }

    /// Returns true once the partition has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.read_view().sealed
    }

    /// Returns true if part of the file could not be read back.
    pub fn is_damaged(&self) -> bool {
        self.read_view().damaged
    }

    /// Reads the partition's record and seal bounds under one lock.
    pub fn bounds(&self) -> StoreBounds {
        let view = self.read_view();
        StoreBounds {
            first_lsn: view.entries.first().map(|entry| entry.lsn),
            last_lsn: view.entries.last().map(|entry| entry.lsn),
            max_timestamp: view.entries.last().map(|entry| entry.watermark),
            end_ts: view.end_ts,
            sealed: view.sealed,
            damaged: view.damaged,
        }
    }

    /// Returns the exclusive end timestamp of a sealed partition.
    pub fn end_ts(&self) -> Option<Timestamp> {
        self.read_view().end_ts
    }

    /// Returns the number of records in the index.
    pub fn record_count(&self) -> usize {
        self.read_view().entries.len()
    }

    /// Returns the number of bytes written to the file.
    pub fn size(&self) -> u64 {
        self.writer
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .size
    }

    /// Returns the LSN of the last record, or `base_lsn - 1` when empty.
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn_of(&self.read_view().entries)
    }

    /// Returns the first and last record LSNs, if any record is stored.
    pub fn lsn_bounds(&self) -> Option<(Lsn, Lsn)> {
        let view = self.read_view();
        match (view.entries.first(), view.entries.last()) {
            (Some(first), Some(last)) => Some((first.lsn, last.lsn)),
            _ => None,
        }
    }

    /// Returns the highest watermark, or the partition start when empty.
    pub fn max_timestamp(&self) -> Timestamp {
        self.read_view()
            .entries
            .last()
            .map_or(self.meta.start_ts, |entry| entry.watermark)
    }

    fn last_lsn_of(&self, entries: &[IndexEntry]) -> Lsn {
        entries
            .last()
            .map_or(self.meta.base_lsn.saturating_sub(1), |entry| entry.lsn)
    }

    fn servable_view(&self) -> Result<std::sync::RwLockReadGuard<'_, ReadView>> {
        let view = self.read_view();
        if view.state != StoreState::Open {
            return Err(FindKeyError::StoreUnavailable {
                partition: self.meta.partition_id,
                state: view.state,
            });
        }
        Ok(view)
    }

    fn read_view(&self) -> std::sync::RwLockReadGuard<'_, ReadView> {
        self.view.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write_view(&self) -> std::sync::RwLockWriteGuard<'_, ReadView> {
        self.view.write().unwrap_or_else(|err| err.into_inner())
    }
}

impl Drop for LocalPartitionStore {
    fn drop(&mut self) {
        let handle = self.writer.get_mut().unwrap_or_else(|err| err.into_inner());
        if let Some(file) = handle.file.take() {
            if let Err(e) = file.sync_all() {
                warn!("Failed to sync partition on drop: {:?}", e);
            }
        }
    }
}

fn encode_entry(entry_type: EntryType, lsn: Lsn, timestamp: Timestamp, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(ENTRY_BODY_FIXED + payload.len());
    body.push(entry_type as u8);
    body.extend_from_slice(&lsn.to_le_bytes());
    body.extend_from_slice(&timestamp.to_le_bytes());
    body.extend_from_slice(payload);

    let crc = crc32fast::hash(&body);
    let mut frame = Vec::with_capacity(ENTRY_FRAME + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Reads and verifies one entry frame, returning its body bytes.
///
/// Returns `Ok(None)` when the file ends before a complete frame: cleanly at
/// a frame boundary, or partway through a frame cut short by a crash. The
/// caller tells the two apart by comparing its offset with the file length.
fn read_frame<R: Read>(reader: &mut R, offset: u64) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if !(ENTRY_BODY_FIXED..=ENTRY_BODY_FIXED + MAX_PAYLOAD_SIZE).contains(&len) {
        return Err(FindKeyError::CorruptEntry {
            offset,
            reason: format!("invalid entry length {}", len),
        });
    }

    let mut crc_buf = [0u8; 4];
    let mut body = vec![0u8; len];
    let complete = reader
        .read_exact(&mut crc_buf)
        .and_then(|_| reader.read_exact(&mut body));
    match complete {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let expected = u32::from_le_bytes(crc_buf);
    let actual = crc32fast::hash(&body);
    if expected != actual {
        return Err(FindKeyError::ChecksumMismatch { expected, actual });
    }
    Ok(Some(body))
}

fn decode_fixed(body: &[u8], offset: u64) -> Result<(EntryType, Lsn, Timestamp)> {
    let entry_type = match body[0] {
        x if x == EntryType::Record as u8 => EntryType::Record,
        x if x == EntryType::Seal as u8 => EntryType::Seal,
        other => {
            return Err(FindKeyError::CorruptEntry {
                offset,
                reason: format!("unknown entry type {}", other),
            })
        }
    };
    let mut lsn = [0u8; 8];
    lsn.copy_from_slice(&body[1..9]);
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&body[9..17]);
    Ok((
        entry_type,
        u64::from_le_bytes(lsn),
        i64::from_le_bytes(timestamp),
    ))
}

fn read_entry<R: Read>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<(EntryType, Lsn, Timestamp, u64)>> {
    let body = match read_frame(reader, offset)? {
        Some(body) => body,
        None => return Ok(None),
    };
    let (entry_type, lsn, timestamp) = decode_fixed(&body, offset)?;
    Ok(Some((
        entry_type,
        lsn,
        timestamp,
        (ENTRY_FRAME + body.len()) as u64,
    )))
}

fn read_payload<R: Read>(reader: &mut R, offset: u64) -> Result<(EntryType, Vec<u8>)> {
    let mut body = read_frame(reader, offset)?.ok_or(FindKeyError::CorruptEntry {
        offset,
        reason: "unexpected end of file".to_string(),
    })?;
    let (entry_type, _, _) = decode_fixed(&body, offset)?;
    Ok((entry_type, body.split_off(ENTRY_BODY_FIXED)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> StoreConfig {
        StoreConfig::new(dir).with_sync_mode(SyncMode::None)
    }

    fn meta(start_ts: Timestamp, base_lsn: Lsn) -> PartitionMeta {
        PartitionMeta {
            log_id: LogId(1),
            partition_id: 0,
            start_ts,
            base_lsn,
        }
    }

    fn create_test_store() -> (TempDir, LocalPartitionStore) {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        let store = LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_open_creates_file_with_header() {
        let (_temp_dir, store) = create_test_store();
        assert_eq!(store.state(), StoreState::Open);
        assert_eq!(store.size(), PartitionMeta::SIZE as u64);
        assert_eq!(store.last_lsn(), 0);
        assert_eq!(
            fs::metadata(store.path()).unwrap().len(),
            PartitionMeta::SIZE as u64
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_open_sets_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, store) = create_test_store();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }

    #[test]
    fn test_append_assigns_sequential_lsns() {
        let (_temp_dir, store) = create_test_store();
        assert_eq!(store.append(Record::new(10, b"a".to_vec())).unwrap(), 1);
        assert_eq!(store.append(Record::new(20, b"b".to_vec())).unwrap(), 2);
        assert_eq!(store.record_count(), 2);
        assert_eq!(store.lsn_bounds(), Some((1, 2)));
    }

    #[test]
    fn test_append_accepts_gaps_rejects_regression() {
        let (_temp_dir, store) = create_test_store();
        assert_eq!(store.append(Record::with_lsn(5, 10, b"a".to_vec())).unwrap(), 5);
        assert_eq!(store.append(Record::with_lsn(9, 11, b"b".to_vec())).unwrap(), 9);

        let err = store
            .append(Record::with_lsn(9, 12, b"c".to_vec()))
            .unwrap_err();
        assert!(matches!(err, FindKeyError::LsnOutOfOrder { got: 9, last: 9 }));
    }

    #[test]
    fn test_read_returns_payload() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"first".to_vec())).unwrap();
        let lsn = store.append(Record::new(20, b"second".to_vec())).unwrap();

        let record = store.read(lsn).unwrap().unwrap();
        assert_eq!(record.payload, b"second".to_vec());
        assert_eq!(record.timestamp, 20);
        assert!(store.read(99).unwrap().is_none());
    }

    #[test]
    fn test_watermark_tolerates_disorder() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(100, b"a".to_vec())).unwrap();
        store.append(Record::new(90, b"b".to_vec())).unwrap();
        store.append(Record::new(120, b"c".to_vec())).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.max_timestamp, 120);

        let hit = store.lower_bound(&snapshot, 95).unwrap().unwrap();
        assert_eq!(hit.lsn, 1);
        let hit = store.lower_bound(&snapshot, 101).unwrap().unwrap();
        assert_eq!(hit.lsn, 3);
    }

    #[test]
    fn test_lower_bound_ties_pick_smallest_lsn() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"a".to_vec())).unwrap();
        store.append(Record::new(20, b"b".to_vec())).unwrap();
        store.append(Record::new(20, b"c".to_vec())).unwrap();
        store.append(Record::new(30, b"d".to_vec())).unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(store.lower_bound(&snapshot, 20).unwrap().unwrap().lsn, 2);
        assert_eq!(store.lower_bound(&snapshot, 15).unwrap().unwrap().lsn, 2);
        assert!(store.lower_bound(&snapshot, 31).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_hides_later_appends() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"a".to_vec())).unwrap();
        let snapshot = store.snapshot().unwrap();

        store.append(Record::new(50, b"b".to_vec())).unwrap();

        assert!(store.lower_bound(&snapshot, 20).unwrap().is_none());
        let fresh = store.snapshot().unwrap();
        assert_eq!(store.lower_bound(&fresh, 20).unwrap().unwrap().lsn, 2);
    }

    #[test]
    fn test_seal_rejects_appends_and_is_irreversible() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"a".to_vec())).unwrap();

        let bounds = store.seal(100).unwrap();
        assert_eq!(bounds.end_ts, 100);
        assert_eq!(bounds.first_lsn, Some(1));
        assert_eq!(bounds.last_lsn, Some(1));
        assert!(store.is_sealed());

        assert!(matches!(
            store.append(Record::new(20, b"b".to_vec())),
            Err(FindKeyError::Sealed(0))
        ));
        assert!(matches!(store.seal(200), Err(FindKeyError::Sealed(0))));

        // Sealed partitions stay searchable.
        let snapshot = store.snapshot().unwrap();
        assert_eq!(store.lower_bound(&snapshot, 5).unwrap().unwrap().lsn, 1);
    }

    #[test]
    fn test_seal_raises_end_to_watermark() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(150, b"a".to_vec())).unwrap();
        assert_eq!(store.seal(100).unwrap().end_ts, 150);
    }

    #[test]
    fn test_reopen_is_noop_while_open() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"a".to_vec())).unwrap();
        store.reopen().unwrap();
        store.reopen().unwrap();
        assert_eq!(store.state(), StoreState::Open);
        assert_eq!(store.append(Record::new(20, b"b".to_vec())).unwrap(), 2);
    }

    #[test]
    fn test_reopen_after_close_recovers() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"a".to_vec())).unwrap();
        store.close().unwrap();
        assert_eq!(store.state(), StoreState::Closed);
        assert!(store.snapshot().is_err());

        store.reopen().unwrap();
        assert_eq!(store.append(Record::new(20, b"b".to_vec())).unwrap(), 2);
    }

    #[test]
    fn test_reopen_failure_leaves_failed_state() {
        let (_temp_dir, store) = create_test_store();
        store.append(Record::new(10, b"a".to_vec())).unwrap();
        store.close().unwrap();
        fs::remove_file(store.path()).unwrap();

        assert!(store.reopen().is_err());
        assert_eq!(store.state(), StoreState::Failed);
        assert!(matches!(
            store.snapshot(),
            Err(FindKeyError::StoreUnavailable {
                state: StoreState::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_load_recovers_index_and_seal() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        {
            let store = LocalPartitionStore::open(&path, meta(100, 10), &config).unwrap();
            store.append(Record::new(110, b"a".to_vec())).unwrap();
            store.append(Record::new(105, b"b".to_vec())).unwrap();
            store.seal(200).unwrap();
        }

        let store = LocalPartitionStore::load(&path, &config).unwrap();
        assert_eq!(store.meta().start_ts, 100);
        assert!(store.is_sealed());
        assert_eq!(store.end_ts(), Some(200));
        assert_eq!(store.lsn_bounds(), Some((10, 11)));
        assert_eq!(store.max_timestamp(), 110);
    }

    #[test]
    fn test_load_truncates_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        let clean_len = {
            let store = LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap();
            store.append(Record::new(1, b"a".to_vec())).unwrap();
            store.append(Record::new(2, b"b".to_vec())).unwrap();
            store.size()
        };

        // Simulate a crash midway through a third append.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&30u32.to_le_bytes()).unwrap();
        file.write_all(&[0xDE, 0xAD]).unwrap();
        drop(file);

        let store = LocalPartitionStore::load(&path, &config).unwrap();
        assert_eq!(store.record_count(), 2);
        assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);
        assert_eq!(store.append(Record::new(3, b"c".to_vec())).unwrap(), 3);
    }

    #[test]
    fn test_load_complete_never_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        let second = {
            let store = LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap();
            for ts in 0..5 {
                store.append(Record::new(ts * 10, b"abc".to_vec())).unwrap();
            }
            store.seal(100).unwrap();
            let snapshot = store.snapshot().unwrap();
            store.first_at_or_after_lsn(&snapshot, 2).unwrap().unwrap().offset
        };

        // A length field pointing past the end of the file.
        let mut bytes = fs::read(&path).unwrap();
        let len = (ENTRY_BODY_FIXED as u32 + 4096).to_le_bytes();
        bytes[second as usize..second as usize + 4].copy_from_slice(&len);
        fs::write(&path, &bytes).unwrap();

        let store = LocalPartitionStore::load_complete(&path, &config).unwrap();
        assert!(store.is_damaged());
        assert!(store.is_sealed());
        assert_eq!(store.record_count(), 1);
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_corrupt_sealed_partition_is_left_intact() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        let second = {
            let store = LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap();
            for ts in 0..5 {
                store.append(Record::new(ts * 10, b"abc".to_vec())).unwrap();
            }
            store.seal(100).unwrap();
            let snapshot = store.snapshot().unwrap();
            store.first_at_or_after_lsn(&snapshot, 2).unwrap().unwrap()
        };
        let len_before = fs::metadata(&path).unwrap().len();

        // Flip one payload byte of the second record.
        let mut bytes = fs::read(&path).unwrap();
        let payload_at = second.offset as usize + ENTRY_FRAME + ENTRY_BODY_FIXED;
        bytes[payload_at] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let store = LocalPartitionStore::load(&path, &config).unwrap();
        assert_eq!(store.state(), StoreState::Open);
        assert!(store.is_damaged());
        assert!(store.is_sealed());
        assert_eq!(store.lsn_bounds(), Some((1, 1)));
        assert!(matches!(
            store.append(Record::new(60, b"x".to_vec())),
            Err(FindKeyError::Sealed(_))
        ));
        drop(store);

        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_corrupt_unsealed_partition_is_not_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        {
            let store = LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap();
            for ts in 0..3 {
                store.append(Record::new(ts, b"abc".to_vec())).unwrap();
            }
        }
        let mut bytes = fs::read(&path).unwrap();
        // CRC field of the first record.
        bytes[PartitionMeta::SIZE + 4] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let store = LocalPartitionStore::load(&path, &config).unwrap();
        assert!(store.is_damaged());
        assert_eq!(store.record_count(), 0);
        assert_eq!(fs::read(&path).unwrap(), bytes);

        let bounds = store.bounds();
        assert!(bounds.sealed);
        assert!(bounds.damaged);
        assert_eq!(bounds.last_lsn, None);
    }

    #[test]
    fn test_open_recreates_headerless_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        fs::write(&path, b"ALP").unwrap();

        let store = LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap();
        assert_eq!(store.append(Record::new(5, b"a".to_vec())).unwrap(), 1);
        drop(store);

        let store = LocalPartitionStore::load(&path, &config).unwrap();
        assert_eq!(store.lsn_bounds(), Some((1, 1)));
    }

    #[test]
    fn test_unreadable_store_stays_failed() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        fs::write(&path, [0xABu8; 64]).unwrap();

        let store = LocalPartitionStore::unreadable(&path, meta(0, LSN_INVALID), &config);
        assert_eq!(store.state(), StoreState::Failed);
        assert!(store.is_sealed());
        assert!(store.snapshot().is_err());
        assert!(store.reopen().is_err());
        assert_eq!(store.state(), StoreState::Failed);
    }

    #[test]
    fn test_open_rejects_foreign_header() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        drop(LocalPartitionStore::open(&path, meta(0, 1), &config).unwrap());

        let other = PartitionMeta {
            partition_id: 7,
            ..meta(0, 1)
        };
        assert!(LocalPartitionStore::open(&path, other, &config).is_err());
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let path = temp_dir.path().join("p.alp");
        fs::write(&path, [0u8; PartitionMeta::SIZE]).unwrap();

        assert!(matches!(
            LocalPartitionStore::load(&path, &config),
            Err(FindKeyError::InvalidMagic(_))
        ));
    }
}
