//! Trim point tracking for a log.
//!
//! The trim point is the highest LSN that readers may no longer rely on.
//! It only moves forward and is persisted as a small checksummed file in the
//! log's directory so that it survives restarts.

use crate::error::{FindKeyError, Result};
use crate::types::{Lsn, LSN_INVALID, LSN_MAX};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

/// File name of the persisted trim point inside a log directory.
pub const TRIM_FILE_NAME: &str = "TRIM";

const TRIM_FILE_SIZE: usize = 12; // lsn u64 + crc u32

/// Highest storable trim point. Trimming past it trims everything, and the
/// first retained LSN (`trim_point + 1`) stays representable.
pub const MAX_TRIM_POINT: Lsn = LSN_MAX - 1;

#[derive(Debug, Default)]
struct TrimState {
    trim_point: Lsn,
}

/// Tracks the trim point of one log.
///
/// # Examples
/// ```rust,ignore
/// use alopex_findkey::lifecycle::TrimTracker;
///
/// let tracker = TrimTracker::new();
/// tracker.advance(41);
/// assert!(tracker.is_trimmed(41));
/// ```
#[derive(Debug, Default)]
pub struct TrimTracker {
    inner: RwLock<TrimState>,
    path: Option<PathBuf>,
}

impl TrimTracker {
    /// Creates an in-memory tracker with nothing trimmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the tracker persisted in `log_dir`, or starts untrimmed if none.
    ///
    /// A damaged trim file is ignored with a warning; the trim point then
    /// restarts at `LSN_INVALID`.
    pub fn load(log_dir: impl AsRef<Path>) -> Result<Self> {
        let path = log_dir.as_ref().join(TRIM_FILE_NAME);
        let trim_point = match fs::read(&path) {
            Ok(bytes) => decode_trim_file(&bytes)
                .map(|lsn| lsn.min(MAX_TRIM_POINT))
                .unwrap_or_else(|| {
                    warn!("Ignoring damaged trim file {}", path.display());
                    LSN_INVALID
                }),
            Err(err) if err.kind() == ErrorKind::NotFound => LSN_INVALID,
            Err(err) => return Err(FindKeyError::storage(&path, err)),
        };

        Ok(Self {
            inner: RwLock::new(TrimState { trim_point }),
            path: Some(path),
        })
    }

    /// Returns the current trim point (`LSN_INVALID` if nothing is trimmed).
    pub fn trim_point(&self) -> Lsn {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .trim_point
    }

    /// Returns true if `lsn` lies at or below the trim point.
    pub fn is_trimmed(&self, lsn: Lsn) -> bool {
        lsn <= self.trim_point()
    }

    /// Moves the trim point forward to `lsn`, clamped to [`MAX_TRIM_POINT`].
    ///
    /// Returns `Ok(false)` without change when `lsn` does not advance it.
    pub fn advance(&self, lsn: Lsn) -> Result<bool> {
        let lsn = lsn.min(MAX_TRIM_POINT);
        let mut state = self.inner.write().unwrap_or_else(|err| err.into_inner());
        if lsn <= state.trim_point {
            return Ok(false);
        }

        if let Some(path) = &self.path {
            persist_trim_file(path, lsn)?;
        }
        debug!("Trim point advanced {} -> {}", state.trim_point, lsn);
        state.trim_point = lsn;
        Ok(true)
    }
}

fn decode_trim_file(bytes: &[u8]) -> Option<Lsn> {
    if bytes.len() != TRIM_FILE_SIZE {
        return None;
    }
    let mut lsn = [0u8; 8];
    lsn.copy_from_slice(&bytes[..8]);
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&bytes[8..]);
    if crc32fast::hash(&lsn) != u32::from_le_bytes(crc) {
        return None;
    }
    Some(u64::from_le_bytes(lsn))
}

fn persist_trim_file(path: &Path, lsn: Lsn) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let lsn_bytes = lsn.to_le_bytes();
    let crc = crc32fast::hash(&lsn_bytes);

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&lsn_bytes)?;
        file.write_all(&crc.to_le_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| FindKeyError::storage(path, e))
}
