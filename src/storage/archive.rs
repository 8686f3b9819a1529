//! Bounded archive of uploaded editions.
//!
//! `archive.json` is a JSON array of single-key objects, newest first, never
//! longer than [`ARCHIVE_CAPACITY`]. Reads and writes are whole-file; two
//! processes writing at once would race, which the run lock prevents.

use crate::error::ArchiveError;
use crate::models::ArchiveEntry;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Maximum number of editions kept.
pub const ARCHIVE_CAPACITY: usize = 7;

/// Insert `entry` at the front and drop the tail past `capacity`.
///
/// Returns the first evicted entry, if any. An oversized archive written by
/// hand is cut back to `capacity` in one go.
pub fn push_front_bounded(
    entries: &mut Vec<ArchiveEntry>,
    entry: ArchiveEntry,
    capacity: usize,
) -> Option<ArchiveEntry> {
    entries.insert(0, entry);
    let cut = capacity.min(entries.len());
    entries.drain(cut..).next()
}

/// Read the whole archive. A missing file reads as an empty archive.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load(path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Archive file missing; treating as empty");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ArchiveError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&raw).map_err(|e| ArchiveError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

async fn store(path: &Path, entries: &[ArchiveEntry]) -> Result<(), ArchiveError> {
    let json = serde_json::to_string(entries).map_err(|e| ArchiveError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).await.map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Add a new edition at the front of the archive on disk.
///
/// # Returns
///
/// The edition evicted to keep the archive within capacity, if any.
///
/// # Errors
///
/// [`ArchiveError::Malformed`] leaves the file untouched; [`ArchiveError::Io`]
/// covers both the read and the write.
#[instrument(level = "info", skip_all, fields(path = %path.display(), date = %entry.date))]
pub async fn prepend(path: &Path, entry: ArchiveEntry) -> Result<Option<ArchiveEntry>, ArchiveError> {
    let mut entries = load(path).await?;
    let evicted = push_front_bounded(&mut entries, entry, ARCHIVE_CAPACITY);
    store(path, &entries).await?;
    info!(len = entries.len(), evicted = evicted.is_some(), "Archive updated");
    Ok(evicted)
}

/// The newest edition and the older ones, in archive order.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn latest_and_rest(path: &Path) -> Result<(ArchiveEntry, Vec<ArchiveEntry>), ArchiveError> {
    let mut entries = load(path).await?;
    if entries.is_empty() {
        return Err(ArchiveError::Empty(path.to_path_buf()));
    }
    let latest = entries.remove(0);
    Ok((latest, entries))
}
