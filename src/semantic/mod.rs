//! Semantic search infrastructure for bookmark embeddings.
//!
//! Query encoding uses fastembed-rs; bookmark vectors are pre-computed per
//! user and searched in memory.
//!
//! # Architecture
//!
//! - `embeddings`: query encoders wrapping fastembed
//! - `index`: in-memory vector index with cosine similarity search
//! - `storage`: binary per-user vector files and the file-backed index

pub mod embeddings;
mod index;
mod storage;

pub use embeddings::{EmbeddingError, EmbeddingModel, LazyEncoder, TextEncoder};
pub use index::{EmbeddingIndex, IndexError, IndexLookup, SearchResult, VectorIndex};
pub use storage::{FileIndexStore, VectorStorage, VectorStorageError};
