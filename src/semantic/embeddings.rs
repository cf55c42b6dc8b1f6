//! Query encoders.
//!
//! The fastembed model is loaded on first use by [`LazyEncoder`], so the
//! daemon starts fast and a broken model only degrades semantic search.

use fastembed::{InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::SemanticSearchConfig;

/// Turns query text into an embedding vector.
pub trait TextEncoder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Identifies the model so stored vectors can be matched against it.
    fn model_id(&self) -> [u8; 32];
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("failed to load embedding model: {0}")]
    InitFailed(String),

    #[error("failed to embed query: {0}")]
    EmbeddingFailed(String),

    #[error("unknown embedding model {0:?}")]
    InvalidModel(String),
}

/// Accepted model names, matched case-insensitively. A `-q` suffix selects
/// the quantized variant.
const MODELS: &[(&str, fastembed::EmbeddingModel)] = &[
    ("all-minilm-l6-v2", fastembed::EmbeddingModel::AllMiniLML6V2),
    ("all-minilm-l6-v2-q", fastembed::EmbeddingModel::AllMiniLML6V2Q),
    ("bge-small-en-v1.5", fastembed::EmbeddingModel::BGESmallENV15),
    ("bge-small-en-v1.5-q", fastembed::EmbeddingModel::BGESmallENV15Q),
    ("bge-base-en-v1.5", fastembed::EmbeddingModel::BGEBaseENV15),
    ("bge-base-en-v1.5-q", fastembed::EmbeddingModel::BGEBaseENV15Q),
    ("bge-large-en-v1.5", fastembed::EmbeddingModel::BGELargeENV15),
    ("bge-large-en-v1.5-q", fastembed::EmbeddingModel::BGELargeENV15Q),
];

fn lookup_model(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    let wanted = name.trim().to_lowercase();
    MODELS
        .iter()
        .find(|(known, _)| *known == wanted)
        .map(|(_, model)| model.clone())
        .ok_or_else(|| EmbeddingError::InvalidModel(name.to_string()))
}

/// fastembed text model. `embed` needs `&mut`, hence the mutex.
pub struct EmbeddingModel {
    name: String,
    inner: Mutex<TextEmbedding>,
}

impl EmbeddingModel {
    /// Loads `name`, downloading it into `<cache_dir>/models` if needed.
    pub fn new(name: &str, cache_dir: &Path) -> Result<Self, EmbeddingError> {
        let model = lookup_model(name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir)
            .map_err(|e| EmbeddingError::InitFailed(format!("{}: {e}", models_dir.display())))?;

        let options = InitOptions::new(model)
            .with_cache_dir(models_dir)
            .with_show_download_progress(false);
        let inner =
            TextEmbedding::try_new(options).map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            inner: Mutex::new(inner),
        })
    }

    /// SHA-256 of the model name, stamped into vector files.
    pub fn model_id_for(name: &str) -> [u8; 32] {
        Sha256::digest(name.as_bytes()).into()
    }
}

impl TextEncoder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        inner
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("model returned nothing".to_string()))
    }

    fn model_id(&self) -> [u8; 32] {
        Self::model_id_for(&self.name)
    }
}

/// Encoder that loads its model on the first query.
///
/// A failed load is not cached; the next query tries again.
pub struct LazyEncoder {
    config: SemanticSearchConfig,
    cache_dir: PathBuf,
    model: Mutex<Option<EmbeddingModel>>,
}

impl LazyEncoder {
    pub fn new(config: SemanticSearchConfig, cache_dir: PathBuf) -> Self {
        Self {
            config,
            cache_dir,
            model: Mutex::new(None),
        }
    }
}

impl TextEncoder for LazyEncoder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut slot = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        let model = match slot.take() {
            Some(model) => model,
            None => {
                log::info!("loading embedding model {}", self.config.model);
                EmbeddingModel::new(&self.config.model, &self.cache_dir)?
            }
        };
        let result = model.embed(text);
        *slot = Some(model);
        result
    }

    fn model_id(&self) -> [u8; 32] {
        EmbeddingModel::model_id_for(&self.config.model)
    }
}
