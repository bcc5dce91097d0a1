//! Snapshot cache for the index.
//!
//! The note store is the source of truth; a snapshot only saves the rebuild
//! on the next start. Any problem reading one is reported as an error for
//! which [`NoteSiftError::requires_rebuild`] is true.
//!
//! ## Snapshot File Format
//!
//! ```text
//! [Header: 32 bytes]
//!   - Magic: "NSFT" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Flags: u32 (4 bytes) - compression
//!   - Note count: u64 (8 bytes)
//!   - Reserved: 12 bytes
//!
//! [Payload: variable]
//!   - bincode(tokenizer fingerprint, saved-at, index state),
//!     LZ4-compressed when the flag is set
//!
//! [Footer: 8 bytes]
//!   - CRC32 of the payload: u32
//!   - Magic: "TFSN" (4 bytes)
//! ```

use crate::error::{NoteSiftError, Result};
use crate::index::{IndexState, NoteIndex};
use crate::tokenizer::Tokenizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic bytes at the start of snapshot files
pub const MAGIC_HEADER: &[u8; 4] = b"NSFT";
/// Magic bytes at the end of snapshot files (reversed)
pub const MAGIC_FOOTER: &[u8; 4] = b"TFSN";
/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 2;

const HEADER_LEN: usize = 32;
const FOOTER_LEN: usize = 8;

/// Flags for the snapshot format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotFlags(u32);

impl SnapshotFlags {
    /// No compression
    pub const NONE: Self = SnapshotFlags(0);
    /// LZ4 compression
    pub const COMPRESSED_LZ4: Self = SnapshotFlags(1);

    fn is_compressed(&self) -> bool {
        self.0 & 1 != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: [u8; 4],
    version: u32,
    flags: u32,
    note_count: u64,
    reserved: [u8; 12],
}

impl SnapshotHeader {
    fn new(note_count: u64, flags: SnapshotFlags) -> Self {
        SnapshotHeader {
            magic: *MAGIC_HEADER,
            version: SNAPSHOT_VERSION,
            flags: flags.0,
            note_count,
            reserved: [0; 12],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.magic != *MAGIC_HEADER {
            return Err(corrupted("invalid magic bytes in header"));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(NoteSiftError::SnapshotVersionMismatch {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StoredSnapshotRef<'a> {
    fingerprint: u32,
    saved_at: DateTime<Utc>,
    state: &'a IndexState,
}

#[derive(Deserialize)]
struct StoredSnapshot {
    fingerprint: u32,
    saved_at: DateTime<Utc>,
    state: IndexState,
}

/// Reads and writes index snapshots in one directory.
///
/// ## Example
///
/// ```rust,no_run
/// use notesift_core::{NoteIndex, SnapshotStore};
///
/// let store = SnapshotStore::new("./data");
/// let index = NoteIndex::default();
/// store.save(&index)?;
///
/// let state = store.load(index.tokenizer())?;
/// # Ok::<(), notesift_core::NoteSiftError>(())
/// ```
pub struct SnapshotStore {
    base_dir: PathBuf,
    use_compression: bool,
}

impl SnapshotStore {
    /// Create a store rooted at `base_dir`; the directory is created on save.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        SnapshotStore {
            base_dir: base_dir.as_ref().to_path_buf(),
            use_compression: true,
        }
    }

    /// Set whether to use compression when saving.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Get the path to the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.base_dir.join("notesift.snap")
    }

    fn backup_path(&self) -> PathBuf {
        self.base_dir.join("notesift.snap.bak")
    }

    fn temp_path(&self) -> PathBuf {
        self.base_dir.join("notesift.snap.tmp")
    }

    /// Check if a snapshot file exists.
    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    /// Save the live state of `index`.
    ///
    /// Writes to a temp file and renames it into place; the previous
    /// snapshot is kept as `.bak`.
    pub fn save(&self, index: &NoteIndex) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;

        let (note_count, payload) = {
            let state = index.read();
            let stored = StoredSnapshotRef {
                fingerprint: index.tokenizer().fingerprint(),
                saved_at: Utc::now(),
                state: &*state,
            };
            (state.note_count() as u64, bincode::serialize(&stored)?)
        };

        let (flags, data) = if self.use_compression {
            (SnapshotFlags::COMPRESSED_LZ4, lz4_flex::compress_prepend_size(&payload))
        } else {
            (SnapshotFlags::NONE, payload)
        };

        info!(
            path = %self.snapshot_path().display(),
            notes = note_count,
            bytes = data.len(),
            "Saving index snapshot"
        );

        let temp_path = self.temp_path();
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);

            let header = SnapshotHeader::new(note_count, flags);
            writer.write_all(&bincode::serialize(&header)?)?;
            writer.write_all(&data)?;

            let checksum = crc32fast::hash(&data);
            writer.write_all(&checksum.to_le_bytes())?;
            writer.write_all(MAGIC_FOOTER)?;

            writer.flush()?;
        }

        let snapshot_path = self.snapshot_path();
        let backup_path = self.backup_path();
        if snapshot_path.exists() {
            let _ = fs::remove_file(&backup_path);
            let _ = fs::rename(&snapshot_path, &backup_path);
        }
        fs::rename(&temp_path, &snapshot_path)?;

        debug!(compressed = flags.is_compressed(), "Snapshot saved");
        Ok(())
    }

    /// Load a snapshot built with the same tokenizer settings.
    ///
    /// A snapshot from different settings is `SnapshotStale`.
    pub fn load(&self, tokenizer: &Tokenizer) -> Result<IndexState> {
        let snapshot_path = self.snapshot_path();
        if !snapshot_path.exists() {
            return Err(NoteSiftError::SnapshotNotFound {
                path: snapshot_path,
            });
        }

        info!(path = %snapshot_path.display(), "Loading index snapshot");

        let file = File::open(&snapshot_path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_LEN + FOOTER_LEN {
            return Err(corrupted(format!("file is only {} bytes", file_len)));
        }
        let mut reader = BufReader::new(file);

        let mut header_bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut header_bytes)?;
        let header: SnapshotHeader = bincode::deserialize(&header_bytes)
            .map_err(|e| corrupted(format!("unreadable header: {}", e)))?;
        header.validate()?;

        let mut data = vec![0u8; file_len - HEADER_LEN - FOOTER_LEN];
        reader.read_exact(&mut data)?;

        let mut footer = [0u8; FOOTER_LEN];
        reader.read_exact(&mut footer)?;

        let stored_checksum = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        if &footer[4..8] != MAGIC_FOOTER {
            return Err(corrupted("invalid footer magic bytes"));
        }

        let computed_checksum = crc32fast::hash(&data);
        if stored_checksum != computed_checksum {
            return Err(corrupted(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                stored_checksum, computed_checksum
            )));
        }

        let payload = if SnapshotFlags(header.flags).is_compressed() {
            lz4_flex::decompress_size_prepended(&data)
                .map_err(|e| corrupted(format!("decompression failed: {}", e)))?
        } else {
            data
        };

        let stored: StoredSnapshot = bincode::deserialize(&payload)
            .map_err(|e| corrupted(format!("deserialization failed: {}", e)))?;

        let expected = tokenizer.fingerprint();
        if stored.fingerprint != expected {
            return Err(NoteSiftError::SnapshotStale {
                reason: format!(
                    "built with tokenizer {:08x}, current settings are {:08x}",
                    stored.fingerprint, expected
                ),
            });
        }
        if stored.state.note_count() as u64 != header.note_count {
            return Err(corrupted(format!(
                "header lists {} notes, payload has {}",
                header.note_count,
                stored.state.note_count()
            )));
        }

        info!(
            notes = stored.state.note_count(),
            saved_at = %stored.saved_at,
            "Snapshot loaded"
        );
        Ok(stored.state)
    }

    /// Delete the snapshot and its backup.
    ///
    /// Returns true if a snapshot was removed.
    pub fn clear(&self) -> Result<bool> {
        let existed = self.exists();
        for path in [self.snapshot_path(), self.backup_path(), self.temp_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        if existed {
            info!(path = %self.snapshot_path().display(), "Snapshot removed");
        }
        Ok(existed)
    }
}

fn corrupted(reason: impl Into<String>) -> NoteSiftError {
    NoteSiftError::SnapshotCorrupted {
        reason: reason.into(),
    }
}
