use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::fallback::decide;
use super::keyword::KeywordMatcher;
use super::merge::{merge, MergeInput};
use super::semantic::{SemanticOutcome, SemanticRetriever, Unavailable};
use super::{Candidate, SearchError, SearchMode, SearchRequest, SearchResponse};
use crate::bookmarks::BookmarkStore;
use crate::config::Config;
use crate::ids::new_request_id;
use crate::semantic::{EmbeddingIndex, EmbeddingModel, FileIndexStore, LazyEncoder, TextEncoder};

/// Runs one search request end to end.
///
/// Keyword and semantic retrieval run concurrently; the semantic side is
/// bounded by its own timeout, so total latency is roughly
/// `max(keyword, min(semantic, timeout))`.
#[derive(Clone)]
pub struct SearchService {
    keyword: KeywordMatcher,
    semantic: SemanticRetriever,
    keyword_weight: f32,
}

impl SearchService {
    pub fn new(keyword: KeywordMatcher, semantic: SemanticRetriever, keyword_weight: f32) -> Self {
        Self {
            keyword,
            semantic,
            keyword_weight,
        }
    }

    /// Wires the CSV store, the lazily loaded encoder and per-user vector
    /// files from configuration.
    pub fn from_config(config: &Config, store: Arc<dyn BookmarkStore>) -> Self {
        let sem = &config.semantic_search;
        let index: Arc<dyn EmbeddingIndex> = Arc::new(FileIndexStore::new(
            config.vectors_dir(),
            EmbeddingModel::model_id_for(&sem.model),
        ));

        let semantic = if sem.enabled {
            let encoder: Arc<dyn TextEncoder> =
                Arc::new(LazyEncoder::new(sem.clone(), config.base_path().clone()));
            SemanticRetriever::new(
                store.clone(),
                Some(encoder),
                index,
                sem.default_threshold,
                Duration::from_millis(config.search.semantic_timeout_ms),
            )
        } else {
            log::info!("semantic search disabled, serving keyword results only");
            SemanticRetriever::disabled(store.clone(), index)
        };

        Self::new(
            KeywordMatcher::new(store),
            semantic,
            config.search.hybrid_keyword_weight,
        )
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let span = tracing::info_span!(
            "search",
            request_id = %new_request_id(),
            user = %request.user,
            mode = %request.mode,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        if request.text.is_empty() {
            tracing::debug!("empty query");
            return Ok(SearchResponse {
                items: vec![],
                mode_used: request.mode,
                fallback_reason: None,
            });
        }

        let (keyword, semantic) = if request.mode.wants_semantic() {
            tokio::join!(self.keyword_task(&request), self.semantic.retrieve(&request))
        } else {
            let keyword = self.keyword_task(&request).await;
            (keyword, SemanticOutcome::Unavailable(Unavailable::Disabled))
        };

        let decision = decide(request.mode, semantic.is_available());
        if let SemanticOutcome::Unavailable(cause) = &semantic {
            if request.mode.wants_semantic() {
                tracing::warn!(cause = cause.as_str(), "semantic unavailable, using keyword");
            }
        }

        let keyword = match keyword {
            Ok(candidates) => candidates,
            // semantic mode does not need keyword results
            Err(e) if decision.mode_used == SearchMode::Semantic => {
                tracing::warn!("keyword matcher failed: {e}");
                vec![]
            }
            Err(e) => return Err(e),
        };

        let items = merge(MergeInput {
            mode_used: decision.mode_used,
            keyword,
            semantic: semantic.into_candidates(),
            keyword_weight: self.keyword_weight,
            limit: request.limit,
            scope: request.scope,
        });

        tracing::info!(
            results = items.len(),
            mode_used = %decision.mode_used,
            "search finished"
        );

        Ok(SearchResponse {
            items,
            mode_used: decision.mode_used,
            fallback_reason: decision.fallback_reason,
        })
    }

    async fn keyword_task(&self, request: &SearchRequest) -> Result<Vec<Candidate>, SearchError> {
        let matcher = self.keyword.clone();
        let request = request.clone();
        let candidates = tokio::task::spawn_blocking(move || matcher.find(&request)).await??;
        Ok(candidates)
    }
}
