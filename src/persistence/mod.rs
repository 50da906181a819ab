//! Snapshots of the corpus and its embeddings.
//!
//! A snapshot lets the service restart without the catalog round-trip or
//! re-embedding every record. The similarity index itself is never stored;
//! it is rebuilt from the embeddings on load.

use crate::catalog::ToolRecord;
use crate::error::{AppError, Result};
use ndarray::Array2;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Snapshot format version. Increment when format changes.
const SNAPSHOT_VERSION: u32 = 2;

/// Magic bytes to identify snapshot files.
const SNAPSHOT_MAGIC: &[u8; 8] = b"AIXPLORE";

/// A corpus with one embedding row per record.
pub struct Snapshot {
    pub corpus: Vec<ToolRecord>,
    pub embeddings: Array2<f32>,
}

impl Snapshot {
    pub fn new(corpus: Vec<ToolRecord>, embeddings: Array2<f32>) -> Self {
        Self { corpus, embeddings }
    }

    /// Save snapshot to a binary file.
    ///
    /// The file is written next to `path` under a temporary name and renamed
    /// into place, so readers and a crash mid-write only ever see the old or
    /// the new snapshot.
    ///
    /// File format:
    /// - 8 bytes: magic "AIXPLORE"
    /// - 4 bytes: version (u32 LE)
    /// - 32 bytes: SHA256 over the corpus JSON followed by the embedding bytes
    /// - 8 bytes: corpus JSON length (u64 LE)
    /// - N bytes: corpus as a JSON array of records
    /// - 8 bytes: row count (u64 LE)
    /// - 8 bytes: embedding dimension (u64 LE)
    /// - M bytes: embeddings (f32 LE, row-major)
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.corpus.len() != self.embeddings.nrows() {
            return Err(AppError::IndexBuildError(format!(
                "Refusing to save {} records with {} embedding rows",
                self.corpus.len(),
                self.embeddings.nrows()
            )));
        }

        let corpus_json = serde_json::to_vec(&self.corpus)
            .map_err(|e| AppError::IoError(format!("Failed to serialize corpus: {}", e)))?;

        // iter() walks in logical row-major order regardless of memory layout
        let embedding_bytes: Vec<u8> = self
            .embeddings
            .iter()
            .flat_map(|val| val.to_le_bytes())
            .collect();

        let hash = content_hash(&corpus_json, &embedding_bytes);

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::IoError(format!("Failed to create snapshot directory: {}", e))
                })?;
                parent
            }
            None => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| AppError::IoError(format!("Failed to create snapshot file: {}", e)))?;

        let (num_rows, dimension) = self.embeddings.dim();

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            let mut write_all = |bytes: &[u8]| {
                writer
                    .write_all(bytes)
                    .map_err(|e| AppError::IoError(format!("Failed to write snapshot: {}", e)))
            };

            write_all(SNAPSHOT_MAGIC)?;
            write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
            write_all(&hash)?;
            write_all(&(corpus_json.len() as u64).to_le_bytes())?;
            write_all(&corpus_json)?;
            write_all(&(num_rows as u64).to_le_bytes())?;
            write_all(&(dimension as u64).to_le_bytes())?;
            write_all(&embedding_bytes)?;

            writer
                .flush()
                .map_err(|e| AppError::IoError(format!("Failed to flush snapshot file: {}", e)))?;
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| AppError::IoError(format!("Failed to sync snapshot file: {}", e)))?;
        temp.persist(path).map_err(|e| {
            AppError::IoError(format!("Failed to move snapshot into place: {}", e.error))
        })?;

        tracing::info!(
            path = %path.display(),
            num_tools = num_rows,
            embedding_dim = dimension,
            "Snapshot saved"
        );

        Ok(())
    }

    /// Load a snapshot.
    ///
    /// Any unreadable, truncated or inconsistent file is a
    /// `SnapshotCorruptError`; the caller is expected to rebuild from the
    /// catalog instead.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::SnapshotCorruptError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let snapshot = Self::decode(&bytes)?;

        tracing::info!(
            path = %path.display(),
            num_tools = snapshot.corpus.len(),
            embedding_dim = snapshot.embeddings.ncols(),
            "Snapshot loaded"
        );

        Ok(snapshot)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(8)? != SNAPSHOT_MAGIC {
            return Err(corrupt("invalid magic"));
        }

        let version = reader.read_u32()?;
        if version != SNAPSHOT_VERSION {
            return Err(corrupt(format!(
                "version {} (expected {})",
                version, SNAPSHOT_VERSION
            )));
        }

        let stored_hash = reader.take(32)?;
        let json_len = reader.read_len()?;
        let corpus_json = reader.take(json_len)?;

        let num_rows = reader.read_len()?;
        let dimension = reader.read_len()?;

        let total_floats = num_rows
            .checked_mul(dimension)
            .ok_or_else(|| corrupt("embedding shape overflows"))?;
        let byte_len = total_floats
            .checked_mul(4)
            .ok_or_else(|| corrupt("embedding shape overflows"))?;
        let embedding_bytes = reader.take(byte_len)?;

        if !reader.is_empty() {
            return Err(corrupt("trailing bytes after embeddings"));
        }

        if stored_hash != content_hash(corpus_json, embedding_bytes).as_slice() {
            return Err(corrupt("content hash mismatch"));
        }

        let corpus: Vec<ToolRecord> = serde_json::from_slice(corpus_json)
            .map_err(|e| corrupt(format!("invalid corpus: {}", e)))?;

        if num_rows != corpus.len() {
            return Err(corrupt(format!(
                "{} embedding rows for {} records",
                num_rows,
                corpus.len()
            )));
        }

        let data: Vec<f32> = embedding_bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let embeddings = Array2::from_shape_vec((num_rows, dimension), data)
            .map_err(|e| corrupt(format!("failed to reshape embeddings: {}", e)))?;

        Ok(Self { corpus, embeddings })
    }
}

/// Load a snapshot if one exists at `path`.
///
/// Returns Ok(None) when there is no file; a present but unreadable file is
/// still an error so the caller can log it before rebuilding.
pub fn try_load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Snapshot file does not exist");
        return Ok(None);
    }
    Snapshot::load(path).map(Some)
}

fn content_hash(corpus_json: &[u8], embedding_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(corpus_json);
    hasher.update(embedding_bytes);
    hasher.finalize().into()
}

fn corrupt(msg: impl Into<String>) -> AppError {
    AppError::SnapshotCorruptError(msg.into())
}

/// Bounds-checked cursor over the snapshot bytes.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.bytes;
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| corrupt("unexpected end of file"))?;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_len(&mut self) -> Result<usize> {
        let b = self.take(8)?;
        let value = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        usize::try_from(value).map_err(|_| corrupt("length exceeds address space"))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
