//! Snapshot Codec — persisted blob encoder/decoder.
//!
//! Pure codec layer. A snapshot never contains the sandbox's object graph,
//! only the journal that produced it plus named wire references into it.
//!
//! - `encode_blob`:  SnapshotBlob → UTF-8 JSON bytes
//! - `decode_blob`:  JSON bytes → SnapshotBlob (strict, version-checked,
//!                   journal well-formedness checked)
//! - `export_blob_to_file` / `import_blob_from_file`: file I/O
//! - `blob_hash`:    SHA-256 of the encoded bytes (lowercase hex)

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use capsule_membrane::{CapabilityValue, MembraneError, WIRE_VERSION};

use crate::journal::{validate_entries, JournalEntry};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All possible snapshot failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// JSON serialization failed.
    #[error("snapshot encode failed: {0}")]
    Encode(String),
    /// JSON deserialization failed (malformed, missing or unknown fields).
    #[error("snapshot decode failed: {0}")]
    Decode(String),
    /// Blob written by an incompatible wire format.
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    /// File I/O error.
    #[error("snapshot io failed: {0}")]
    Io(#[from] io::Error),
    /// Capturing or restoring the sandbox failed.
    #[error(transparent)]
    Membrane(#[from] MembraneError),
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Everything needed to rebuild a sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotBlob {
    pub version: u32,
    pub journal: Vec<JournalEntry>,
    /// Named exports, serialized from the host side.
    pub captures: BTreeMap<String, CapabilityValue>,
}

impl SnapshotBlob {
    pub fn new(journal: Vec<JournalEntry>, captures: BTreeMap<String, CapabilityValue>) -> Self {
        Self {
            version: WIRE_VERSION,
            journal,
            captures,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder / decoder
// ---------------------------------------------------------------------------

/// Encode a blob to compact JSON. Capture order is sorted by name, so
/// identical blobs encode to identical bytes.
pub fn encode_blob(blob: &SnapshotBlob) -> Result<Vec<u8>, SnapshotError> {
    serde_json::to_vec(blob).map_err(|e| SnapshotError::Encode(e.to_string()))
}

/// Decode and check a blob. Rejects unknown fields, foreign versions, and
/// journals that are not well formed.
pub fn decode_blob(bytes: &[u8]) -> Result<SnapshotBlob, SnapshotError> {
    let blob: SnapshotBlob =
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    if blob.version != WIRE_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: blob.version,
            expected: WIRE_VERSION,
        });
    }
    validate_entries(&blob.journal)?;
    Ok(blob)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Write an encoded blob to a file, creating parent directories.
pub fn export_blob_to_file(blob: &SnapshotBlob, path: &Path) -> Result<(), SnapshotError> {
    let bytes = encode_blob(blob)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, bytes)?;
    Ok(())
}

pub fn import_blob_from_file(path: &Path) -> Result<SnapshotBlob, SnapshotError> {
    let bytes = fs::read(path)?;
    decode_blob(&bytes)
}

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// SHA-256 over the encoded bytes. Lowercase hex string.
pub fn bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn blob_hash(blob: &SnapshotBlob) -> Result<String, SnapshotError> {
    Ok(bytes_hash(&encode_blob(blob)?))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
