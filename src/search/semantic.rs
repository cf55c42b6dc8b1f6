//! Embedding-based retrieval with a bounded time budget.
//!
//! Absence is an ordinary outcome: a deployment without an encoder, a user
//! without vectors, a timeout or a failing model all produce
//! `SemanticOutcome::Unavailable` and the request continues on keywords.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{Candidate, MatchReasons, MatchSignal, SearchRequest};
use crate::bookmarks::{Bookmark, BookmarkStore};
use crate::ids::BookmarkId;
use crate::semantic::{EmbeddingIndex, IndexLookup, TextEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// No encoder configured for this deployment.
    Disabled,
    /// The user has no embeddings yet.
    NotBuilt,
    Timeout,
    Failed,
}

impl Unavailable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unavailable::Disabled => "disabled",
            Unavailable::NotBuilt => "not-built",
            Unavailable::Timeout => "timeout",
            Unavailable::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SemanticOutcome {
    Available(Vec<Candidate>),
    Unavailable(Unavailable),
}

impl SemanticOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, SemanticOutcome::Available(_))
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        match self {
            SemanticOutcome::Available(candidates) => candidates,
            SemanticOutcome::Unavailable(_) => vec![],
        }
    }
}

#[derive(Clone)]
pub struct SemanticRetriever {
    store: Arc<dyn BookmarkStore>,
    encoder: Option<Arc<dyn TextEncoder>>,
    index: Arc<dyn EmbeddingIndex>,
    threshold: f32,
    timeout: Duration,
}

impl SemanticRetriever {
    pub fn new(
        store: Arc<dyn BookmarkStore>,
        encoder: Option<Arc<dyn TextEncoder>>,
        index: Arc<dyn EmbeddingIndex>,
        threshold: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            encoder,
            index,
            threshold,
            timeout,
        }
    }

    /// Retriever for deployments without semantic search.
    pub fn disabled(store: Arc<dyn BookmarkStore>, index: Arc<dyn EmbeddingIndex>) -> Self {
        Self::new(store, None, index, 0.0, Duration::from_millis(1))
    }

    /// Runs the lookup on the blocking pool and gives up after the timeout.
    ///
    /// A timed out lookup keeps running to completion in the background; its
    /// result is dropped.
    pub async fn retrieve(&self, request: &SearchRequest) -> SemanticOutcome {
        let Some(encoder) = self.encoder.clone() else {
            return SemanticOutcome::Unavailable(Unavailable::Disabled);
        };

        let store = self.store.clone();
        let index = self.index.clone();
        let threshold = self.threshold;
        let request = request.clone();
        let work = tokio::task::spawn_blocking(move || {
            lookup(store.as_ref(), encoder.as_ref(), index.as_ref(), threshold, &request)
        });

        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                tracing::warn!("semantic lookup failed: {e:#}");
                SemanticOutcome::Unavailable(Unavailable::Failed)
            }
            Ok(Err(e)) => {
                tracing::warn!("semantic lookup task failed: {e}");
                SemanticOutcome::Unavailable(Unavailable::Failed)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "semantic lookup timed out"
                );
                SemanticOutcome::Unavailable(Unavailable::Timeout)
            }
        }
    }
}

fn lookup(
    store: &dyn BookmarkStore,
    encoder: &dyn TextEncoder,
    index: &dyn EmbeddingIndex,
    threshold: f32,
    request: &SearchRequest,
) -> anyhow::Result<SemanticOutcome> {
    if !index.is_built(&request.user)? {
        return Ok(SemanticOutcome::Unavailable(Unavailable::NotBuilt));
    }

    let bookmarks: HashMap<BookmarkId, Bookmark> = store
        .list_for_owner(&request.user, &request.filter)?
        .into_iter()
        .map(|b| (b.id.clone(), b))
        .collect();
    if bookmarks.is_empty() {
        return Ok(SemanticOutcome::Available(vec![]));
    }
    let allowed: HashSet<BookmarkId> = bookmarks.keys().cloned().collect();

    let query = encoder.embed(&request.text)?;
    let hits = match index.nearest(&request.user, &query, &allowed, threshold, request.limit)? {
        IndexLookup::NotBuilt => return Ok(SemanticOutcome::Unavailable(Unavailable::NotBuilt)),
        IndexLookup::Hits(hits) => hits,
    };

    let candidates = hits
        .into_iter()
        .filter_map(|hit| {
            bookmarks.get(&hit.id).map(|bookmark| Candidate {
                bookmark: bookmark.clone(),
                score: hit.score as f64,
                reasons: MatchReasons::from(vec![MatchSignal::Semantic]),
            })
        })
        .collect();

    Ok(SemanticOutcome::Available(candidates))
}
