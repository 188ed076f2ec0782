//! Snapshot storage for the vector index.
//!
//! Layout of a snapshot directory:
//!
//! ```text
//! <dir>/CURRENT            name of the live generation
//! <dir>/snap-XXXXXX/       one immutable generation
//!     vectors.bin
//!     chunks.json
//! ```
//!
//! File format: vectors.bin
//!
//! Header (17 bytes):
//! - version: u8 (1)
//! - dimensions: u32 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - length: u32 (little-endian), must equal dimensions
//! - embedding: [f32; length] (little-endian)
//!
//! chunks.json is a JSON array holding the chunk texts in index order.
//!
//! A save writes a complete new generation and only then swaps `CURRENT`, so
//! the previous snapshot stays loadable until the swap succeeds.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::retrieval::error::{RetrievalError, RetrievalResult};
use crate::retrieval::index::VectorIndex;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + dimensions(4) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 17;

const CURRENT_FILE: &str = "CURRENT";
const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";
const GENERATION_PREFIX: &str = "snap-";

/// Times a load follows CURRENT to a newer generation before giving up.
const LOAD_ATTEMPTS: usize = 3;

/// Storage manager for index snapshots.
pub struct SnapshotStorage {
    dir: PathBuf,
}

impl SnapshotStorage {
    /// Create a new storage manager rooted at `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Get the snapshot directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Check if a snapshot has been committed.
    pub fn exists(&self) -> bool {
        self.dir.join(CURRENT_FILE).is_file()
    }

    /// Load the vector index from storage.
    ///
    /// Any inconsistency between the two files is reported as
    /// [`RetrievalError::CorruptSnapshot`]. A generation replaced by a
    /// concurrent [`save`](Self::save) while it is being read is followed to
    /// the new one.
    pub fn load(&self) -> RetrievalResult<VectorIndex> {
        self.load_from(self.current_name()?)
    }

    /// Load starting at generation `name`, re-reading CURRENT if it moved on.
    fn load_from(&self, mut name: String) -> RetrievalResult<VectorIndex> {
        for _ in 0..LOAD_ATTEMPTS {
            match self.load_generation(&name) {
                Ok(index) => return Ok(index),
                Err(e) => {
                    let current = self.current_name()?;
                    if current == name {
                        return Err(e);
                    }
                    log::debug!("Snapshot {} was replaced by {} during load", name, current);
                    name = current;
                }
            }
        }
        self.load_generation(&name)
    }

    fn load_generation(&self, name: &str) -> RetrievalResult<VectorIndex> {
        let generation = self.dir.join(name);
        if !generation.is_dir() {
            return Err(RetrievalError::corrupt(format!(
                "generation {name} is missing"
            )));
        }

        let (dimensions, vectors, entry_count) = read_vectors(&generation.join(VECTORS_FILE))?;
        let chunks = read_chunks(&generation.join(CHUNKS_FILE))?;

        if chunks.len() as u64 != entry_count {
            return Err(RetrievalError::corrupt(format!(
                "{entry_count} vectors but {} chunks",
                chunks.len()
            )));
        }

        VectorIndex::from_parts(dimensions, vectors, chunks)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp dir -> fsync -> keep -> swap CURRENT
    pub fn save(&self, index: &VectorIndex) -> RetrievalResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        // Dropped (and removed) on every early return below
        let staging = tempfile::Builder::new()
            .prefix(GENERATION_PREFIX)
            .tempdir_in(&self.dir)?;

        write_vectors(&staging.path().join(VECTORS_FILE), index)?;
        write_chunks(&staging.path().join(CHUNKS_FILE), index.chunks())?;

        let generation = staging.keep();
        let name = generation
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                RetrievalError::Io(std::io::Error::other(format!(
                    "staged snapshot {} has no usable name",
                    generation.display()
                )))
            })?;

        if let Err(e) = self.swap_current(&name) {
            let _ = std::fs::remove_dir_all(&generation);
            return Err(e);
        }

        self.remove_stale_generations(&name);
        log::debug!("Saved snapshot generation {} ({} entries)", name, index.len());

        Ok(())
    }

    /// Delete the snapshot directory if it exists.
    pub fn delete(&self) -> RetrievalResult<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Read and validate the generation name stored in CURRENT.
    fn current_name(&self) -> RetrievalResult<String> {
        let name = std::fs::read_to_string(self.dir.join(CURRENT_FILE))?;
        let name = name.trim();

        if !name.starts_with(GENERATION_PREFIX) || name.contains(['/', '\\']) {
            return Err(RetrievalError::corrupt(format!(
                "CURRENT names an invalid generation: {name:?}"
            )));
        }

        Ok(name.to_string())
    }

    /// Atomically point CURRENT at `name`.
    fn swap_current(&self, name: &str) -> RetrievalResult<()> {
        let mut pointer = tempfile::NamedTempFile::new_in(&self.dir)?;
        pointer.write_all(name.as_bytes())?;
        pointer.as_file().sync_all()?;
        pointer
            .persist(self.dir.join(CURRENT_FILE))
            .map_err(|e| RetrievalError::Io(e.error))?;

        sync_dir(&self.dir);
        Ok(())
    }

    /// Remove generations other than `keep`. Failures only leave garbage behind.
    fn remove_stale_generations(&self, keep: &str) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not list snapshot directory: {}", e);
                return;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == keep || !name.starts_with(GENERATION_PREFIX) {
                continue;
            }
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                log::warn!("Failed to remove stale snapshot {}: {}", name, e);
            }
        }
    }
}

impl VectorIndex {
    /// Persist this index as a snapshot under `dir`.
    pub fn save(&self, dir: &Path) -> RetrievalResult<()> {
        SnapshotStorage::new(dir.to_path_buf()).save(self)
    }

    /// Construct an index from the snapshot under `dir`.
    pub fn load(dir: &Path) -> RetrievalResult<Self> {
        SnapshotStorage::new(dir.to_path_buf()).load()
    }

    /// Replace this index entirely with the snapshot under `dir`.
    ///
    /// Dimensions are taken from the snapshot. On error `self` is untouched.
    pub fn restore(&mut self, dir: &Path) -> RetrievalResult<()> {
        *self = Self::load(dir)?;
        Ok(())
    }
}

/// Write vectors.bin for `index` and fsync it.
fn write_vectors(path: &Path, index: &VectorIndex) -> RetrievalResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let dimensions = u32::try_from(index.dimensions())
        .map_err(|_| RetrievalError::configuration("embedding dimension exceeds u32"))?;

    let header = Header {
        version: FORMAT_VERSION,
        dimensions,
        entry_count: index.len() as u64,
    };
    writer.write_all(&header.encode())?;

    for (vector, _) in index.iter() {
        writer.write_all(&dimensions.to_le_bytes())?;
        for &value in vector {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    // Flush and sync
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(())
}

/// Write chunks.json and fsync it.
fn write_chunks(path: &Path, chunks: &[String]) -> RetrievalResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer(&mut writer, chunks).map_err(std::io::Error::from)?;

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(())
}

/// Read vectors.bin, returning (dimensions, row-major floats, entry_count).
fn read_vectors(path: &Path) -> RetrievalResult<(usize, Vec<f32>, u64)> {
    let file = open_snapshot_file(path)?;
    let mut reader = BufReader::new(file);

    let mut header_bytes = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|e| truncated("header", e))?;
    let header = Header::decode(&header_bytes)?;

    let dimensions = header.dimensions as usize;
    if dimensions == 0 {
        return Err(RetrievalError::corrupt("snapshot declares zero dimensions"));
    }

    let mut vectors = Vec::new();
    for entry in 0..header.entry_count {
        let mut len_bytes = [0u8; 4];
        reader
            .read_exact(&mut len_bytes)
            .map_err(|e| truncated("vector length", e))?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len != dimensions {
            return Err(RetrievalError::corrupt(format!(
                "vector {entry} has {len} dimensions, snapshot declares {dimensions}"
            )));
        }

        let mut float_bytes = [0u8; 4];
        for _ in 0..len {
            reader
                .read_exact(&mut float_bytes)
                .map_err(|e| truncated("vector data", e))?;
            vectors.push(f32::from_le_bytes(float_bytes));
        }
    }

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(RetrievalError::corrupt(format!(
            "trailing data after {} vectors",
            header.entry_count
        )));
    }

    Ok((dimensions, vectors, header.entry_count))
}

/// Read chunks.json.
fn read_chunks(path: &Path) -> RetrievalResult<Vec<String>> {
    let file = open_snapshot_file(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| RetrievalError::corrupt(format!("invalid chunk list: {e}")))
}

/// Open a file of a committed generation; a missing file means a broken snapshot.
fn open_snapshot_file(path: &Path) -> RetrievalResult<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RetrievalError::corrupt(format!("{} is missing", path.display()))
        } else {
            RetrievalError::Io(e)
        }
    })
}

fn truncated(what: &str, err: std::io::Error) -> RetrievalError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        RetrievalError::corrupt(format!("unexpected end of file reading {what}"))
    } else {
        RetrievalError::Io(err)
    }
}

/// Persist the rename of CURRENT on platforms where directories can be synced.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        log::warn!("Failed to sync snapshot directory: {}", e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// File header structure.
#[derive(Debug, PartialEq)]
struct Header {
    version: u8,
    dimensions: u32,
    entry_count: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..5].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[5..13].copy_from_slice(&self.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[0..13]);
        bytes[13..17].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn decode(bytes: &[u8; HEADER_SIZE]) -> RetrievalResult<Self> {
        let stored_checksum = u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]);
        if crc32fast::hash(&bytes[0..13]) != stored_checksum {
            return Err(RetrievalError::corrupt("header checksum mismatch"));
        }

        let version = bytes[0];
        if version != FORMAT_VERSION {
            return Err(RetrievalError::corrupt(format!(
                "unsupported format version {version}, expected {FORMAT_VERSION}"
            )));
        }

        let dimensions = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[5..13]);

        Ok(Self {
            version,
            dimensions,
            entry_count: u64::from_le_bytes(count),
        })
    }
}
