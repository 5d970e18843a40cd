//! Append-only journal store — binary protobuf log.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][ProtoJournalEntry][4-byte LE length][ProtoJournalEntry]...
//!
//! Rules:
//!   - Strict append only: no mutation, no deletion, no reordering
//!   - fsync after every write
//!   - Index strictly increasing from 0 (validated on append)
//!   - Frames of length 0 or above 16 MiB are corrupt; larger entries are
//!     refused on append

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;

use crate::journal::JournalEntry;
use crate::proto_bridge::{entry_to_proto, proto_to_entry};
use crate::proto_types::ProtoJournalEntry;

const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Durable mirror of a sandbox journal.
pub struct JournalStore {
    path: PathBuf,
    next_index: u64,
}

impl JournalStore {
    /// Open or create a journal log at the given path.
    /// Reads existing frames to determine the next index.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let next_index = if path.exists() {
            let frames = Self::read_all_from_file(path)?;
            frames.last().map(|f| f.index + 1).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            next_index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index the next appended entry must carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Append one entry. Writes a length-prefixed frame and fsyncs.
    pub fn append_entry(&mut self, entry: &JournalEntry) -> io::Result<()> {
        if entry.index != self.next_index {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Index violation in journal store: expected {}, got {}",
                    self.next_index, entry.index
                ),
            ));
        }

        let buf = entry_to_proto(entry).encode_to_vec();
        if buf.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Journal entry {} encodes to {} bytes, frame limit is {}",
                    entry.index,
                    buf.len(),
                    MAX_FRAME_LEN
                ),
            ));
        }
        let len = buf.len() as u32;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&buf)?;
            writer.flush()?;
        }
        file.sync_all()?;

        self.next_index += 1;
        Ok(())
    }

    /// Append whatever suffix of `entries` the store does not hold yet.
    /// Returns the number of entries written.
    pub fn sync_from(&mut self, entries: &[JournalEntry]) -> io::Result<usize> {
        let start = self.next_index as usize;
        if start > entries.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "journal store holds {} entries, source journal only {}",
                    start,
                    entries.len()
                ),
            ));
        }
        for entry in &entries[start..] {
            self.append_entry(entry)?;
        }
        Ok(entries.len() - start)
    }

    /// Load every entry in index order.
    pub fn load_all_entries(&self) -> io::Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::read_all_from_file(&self.path)?
            .iter()
            .map(proto_to_entry)
            .collect()
    }

    /// Read all frames from a file, validating frame integrity.
    fn read_all_from_file(path: &Path) -> io::Result<Vec<ProtoJournalEntry>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut frames = Vec::new();
        let mut len_buf = [0u8; 4];

        loop {
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid frame length: {}", len),
                ));
            }

            let mut frame = vec![0u8; len];
            reader.read_exact(&mut frame).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Truncated frame after {} entries: {}", frames.len(), e),
                )
            })?;

            let entry = ProtoJournalEntry::decode(frame.as_slice()).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Protobuf decode error: {}", e),
                )
            })?;

            if entry.index != frames.len() as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Frame {} carries index {}",
                        frames.len(),
                        entry.index
                    ),
                ));
            }
            frames.push(entry);
        }

        Ok(frames)
    }
}
