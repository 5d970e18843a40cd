//! Snapshot layer — snapshot blobs on disk.
//!
//! Each file wraps the encoded blob with its SHA-256 so corruption is caught
//! before a restore is attempted. Files are named by journal length, so
//! the latest snapshot is the one covering the most interactions.
//! No timestamps in snapshot content.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::snapshot_codec::{bytes_hash, decode_blob, encode_blob, SnapshotBlob, SnapshotError};

/// Snapshot on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredSnapshot {
    /// Number of journal entries covered.
    pub journal_len: u64,
    /// Encoded blob (UTF-8 JSON).
    pub blob: String,
    /// SHA-256 of `blob`.
    pub hash: String,
    /// Wire version at snapshot time.
    pub wire_version: u32,
}

impl StoredSnapshot {
    /// Decode the wrapped blob after checking its hash.
    pub fn decode(&self) -> Result<SnapshotBlob, SnapshotError> {
        if !verify_snapshot_hash(self) {
            return Err(SnapshotError::Decode(format!(
                "snapshot at journal length {} fails its hash check",
                self.journal_len
            )));
        }
        decode_blob(self.blob.as_bytes())
    }
}

fn snapshot_path(dir: &Path, journal_len: u64) -> PathBuf {
    dir.join(format!("snapshot_{:06}.json", journal_len))
}

/// Save a blob as `snapshot_NNNNNN.json`, NNNNNN being its journal length.
pub fn save_snapshot(dir: &Path, blob: &SnapshotBlob) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;

    let bytes = encode_blob(blob)?;
    let hash = bytes_hash(&bytes);
    let blob_text =
        String::from_utf8(bytes).map_err(|e| SnapshotError::Encode(e.to_string()))?;

    let snap = StoredSnapshot {
        journal_len: blob.journal.len() as u64,
        blob: blob_text,
        hash,
        wire_version: blob.version,
    };

    let path = snapshot_path(dir, snap.journal_len);
    let content =
        serde_json::to_string(&snap).map_err(|e| SnapshotError::Encode(e.to_string()))?;

    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    Ok(path)
}

/// Load the snapshot covering exactly `journal_len` entries, if any.
pub fn load_snapshot(dir: &Path, journal_len: u64) -> io::Result<Option<StoredSnapshot>> {
    let path = snapshot_path(dir, journal_len);

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    let snap: StoredSnapshot = serde_json::from_str(&content).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("Bad snapshot: {}", e))
    })?;

    Ok(Some(snap))
}

/// Load the snapshot with the longest journal in a directory.
pub fn load_latest_snapshot(dir: &Path) -> io::Result<Option<StoredSnapshot>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut best: Option<u64> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let len = name
            .strip_prefix("snapshot_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(len) = len {
            best = Some(best.map_or(len, |b| b.max(len)));
        }
    }

    match best {
        Some(len) => load_snapshot(dir, len),
        None => Ok(None),
    }
}

/// True if the stored hash matches the wrapped blob.
pub fn verify_snapshot_hash(snap: &StoredSnapshot) -> bool {
    bytes_hash(snap.blob.as_bytes()) == snap.hash
}
