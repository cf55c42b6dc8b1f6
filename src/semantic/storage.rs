//! On-disk vector files, one per user: `<vectors_dir>/<user-id>.bin`.
//!
//! ```text
//! magic      b"RCLV"
//! version    u8
//! model_id   [u8; 32]   sha256 of the model name
//! dimensions u16 le
//! count      u32 le
//! count x {
//!     id_len u16 le
//!     id     [u8; id_len]        utf-8
//!     vector [f32 le; dimensions]
//! }
//! crc32      u32 le       over every byte before it
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::ids::{BookmarkId, UserId};
use crate::semantic::index::{EmbeddingIndex, IndexError, IndexLookup, VectorIndex};

const MAGIC: &[u8; 4] = b"RCLV";
const VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("vector file io: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed vector file: {0}")]
    Malformed(String),

    #[error("unsupported vector file version {0}")]
    UnsupportedVersion(u8),

    #[error("vector file was built with another model")]
    ModelMismatch,

    #[error("vector file checksum mismatch")]
    Corrupted,
}

/// Reads and writes one vector file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the file, refusing vectors produced by a model other than `model_id`.
    pub fn load(&self, model_id: &[u8; 32]) -> Result<VectorIndex, VectorStorageError> {
        let bytes = fs::read(&self.path)?;
        decode(&bytes, model_id)
    }

    /// Writes through a temp file and renames it over the target.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let bytes = encode(index, model_id)?;
        let tmp = self.path.with_extension("bin.tmp");

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn encode(index: &VectorIndex, model_id: &[u8; 32]) -> Result<Vec<u8>, VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions())
        .map_err(|_| VectorStorageError::Malformed("too many dimensions".to_string()))?;
    let count = u32::try_from(index.len())
        .map_err(|_| VectorStorageError::Malformed("too many vectors".to_string()))?;

    let mut out = Vec::with_capacity(48 + index.len() * (index.dimensions() * 4 + 24));
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(model_id);
    out.extend_from_slice(&dimensions.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    let mut entries: Vec<_> = index.entries().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (id, vector) in entries {
        let id_len = u16::try_from(id.len())
            .map_err(|_| VectorStorageError::Malformed(format!("bookmark id too long: {id}")))?;
        out.extend_from_slice(&id_len.to_le_bytes());
        out.extend_from_slice(id.as_bytes());
        for x in vector {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }

    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

fn decode(bytes: &[u8], model_id: &[u8; 32]) -> Result<VectorIndex, VectorStorageError> {
    let Some(split) = bytes.len().checked_sub(4) else {
        return Err(VectorStorageError::Malformed("truncated".to_string()));
    };
    let (body, trailer) = bytes.split_at(split);
    if crc32fast::hash(body).to_le_bytes() != trailer {
        return Err(VectorStorageError::Corrupted);
    }

    let mut r = Reader(body);
    if r.take(4)? != MAGIC {
        return Err(VectorStorageError::Malformed("not a vector file".to_string()));
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(VectorStorageError::UnsupportedVersion(version));
    }
    if r.take(32)? != model_id {
        return Err(VectorStorageError::ModelMismatch);
    }
    let dimensions = r.u16()? as usize;
    let count = r.u32()? as usize;

    let mut index = VectorIndex::with_capacity(dimensions, count);
    for _ in 0..count {
        let id_len = r.u16()? as usize;
        let id = std::str::from_utf8(r.take(id_len)?)
            .map_err(|e| VectorStorageError::Malformed(format!("bookmark id: {e}")))?;
        let vector = r
            .take(dimensions * 4)?
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if let Err(e) = index.insert(BookmarkId::from(id), vector) {
            log::debug!("skipping stored vector for {id}: {e}");
        }
    }

    if !r.0.is_empty() {
        return Err(VectorStorageError::Malformed("trailing bytes".to_string()));
    }
    Ok(index)
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], VectorStorageError> {
        if self.0.len() < n {
            return Err(VectorStorageError::Malformed("truncated".to_string()));
        }
        let (head, rest) = self.0.split_at(n);
        self.0 = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, VectorStorageError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, VectorStorageError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, VectorStorageError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Directory of per-user vector files, loaded on first lookup and cached.
///
/// A missing file, an empty file, or a file written by a different model all
/// mean the index is not built for that user. Dimensions come from the file;
/// a query of another width fails the lookup.
pub struct FileIndexStore {
    dir: PathBuf,
    model_id: [u8; 32],
    cache: Mutex<HashMap<UserId, Option<Arc<VectorIndex>>>>,
}

impl FileIndexStore {
    pub fn new(dir: PathBuf, model_id: [u8; 32]) -> Self {
        Self {
            dir,
            model_id,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(dir: &Path, owner: &UserId) -> PathBuf {
        dir.join(format!("{owner}.bin"))
    }

    fn read(&self, owner: &UserId) -> Result<Option<Arc<VectorIndex>>, VectorStorageError> {
        let storage = VectorStorage::new(Self::path_for(&self.dir, owner));
        if !storage.exists() {
            return Ok(None);
        }

        match storage.load(&self.model_id) {
            Ok(index) if index.is_empty() => Ok(None),
            Ok(index) => {
                log::info!("loaded {} vectors for {owner}", index.len());
                Ok(Some(Arc::new(index)))
            }
            Err(e @ (VectorStorageError::ModelMismatch | VectorStorageError::UnsupportedVersion(_))) => {
                log::warn!("ignoring vectors for {owner}: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn index_for(&self, owner: &UserId) -> Result<Option<Arc<VectorIndex>>, IndexError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| IndexError::Poisoned(e.to_string()))?;

        if let Some(index) = cache.get(owner) {
            return Ok(index.clone());
        }
        let index = self.read(owner)?;
        cache.insert(owner.clone(), index.clone());
        Ok(index)
    }
}

impl EmbeddingIndex for FileIndexStore {
    fn is_built(&self, owner: &UserId) -> Result<bool, IndexError> {
        Ok(self.index_for(owner)?.is_some())
    }

    fn nearest(
        &self,
        owner: &UserId,
        query: &[f32],
        candidates: &HashSet<BookmarkId>,
        threshold: f32,
        limit: usize,
    ) -> Result<IndexLookup, IndexError> {
        let Some(index) = self.index_for(owner)? else {
            return Ok(IndexLookup::NotBuilt);
        };
        Ok(IndexLookup::Hits(index.search(query, candidates, threshold, limit)?))
    }
}
