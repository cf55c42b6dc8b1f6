//! Nearest-neighbor lookup over bookmark embeddings.

use std::collections::{HashMap, HashSet};

use crate::ids::{BookmarkId, UserId};
use crate::semantic::storage::VectorStorageError;

/// Outcome of a nearest-neighbor lookup for one user.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexLookup {
    /// No embeddings exist for this user yet.
    NotBuilt,
    Hits(Vec<SearchResult>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: BookmarkId,
    /// Cosine similarity with the query.
    pub score: f32,
}

/// Pre-computed bookmark embeddings, partitioned by owner.
pub trait EmbeddingIndex: Send + Sync {
    /// Whether `owner` has any embeddings. Checked before the query is encoded.
    fn is_built(&self, owner: &UserId) -> Result<bool, IndexError>;

    /// Closest entries to `query` among `candidates`, at or above `threshold`.
    fn nearest(
        &self,
        owner: &UserId,
        query: &[f32],
        candidates: &HashSet<BookmarkId>,
        threshold: f32,
        limit: usize,
    ) -> Result<IndexLookup, IndexError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("zero-length vector")]
    ZeroNorm,

    #[error(transparent)]
    Storage(#[from] VectorStorageError),

    #[error("index cache unavailable: {0}")]
    Poisoned(String),
}

/// One user's embeddings.
///
/// Vectors are kept unit-length, so similarity is a plain dot product.
/// [`VectorIndex::raw`] gives back the stored (normalized) vector.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: HashMap<BookmarkId, Vec<f32>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::with_capacity(capacity),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn insert(&mut self, id: BookmarkId, vector: Vec<f32>) -> Result<(), IndexError> {
        let unit = self.unit(vector)?;
        self.vectors.insert(id, unit);
        Ok(())
    }

    pub fn raw(&self, id: &BookmarkId) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&BookmarkId, &[f32])> {
        self.vectors.iter().map(|(id, v)| (id, v.as_slice()))
    }

    /// Ranks `candidates` by similarity to `query`, best first, equal scores
    /// by id.
    pub fn search(
        &self,
        query: &[f32],
        candidates: &HashSet<BookmarkId>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        let query = self.unit(query.to_vec())?;

        let mut hits: Vec<SearchResult> = candidates
            .iter()
            .filter_map(|id| self.vectors.get_key_value(id))
            .map(|(id, v)| SearchResult {
                id: id.clone(),
                score: dot(&query, v),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    fn unit(&self, mut vector: Vec<f32>) -> Result<Vec<f32>, IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        let norm = dot(&vector, &vector).sqrt();
        if norm < f32::EPSILON {
            return Err(IndexError::ZeroNorm);
        }
        vector.iter_mut().for_each(|x| *x /= norm);
        Ok(vector)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
