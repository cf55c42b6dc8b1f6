use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::bookmarks::{Bookmark, BookmarkFilter, BookmarkType};
use crate::ids::{BookmarkId, UserId};

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl SearchMode {
    /// Parses `input`, falling back to `fallback` for absent or unknown values.
    ///
    /// The fallback is chosen by the call site: the HTTP route defaults to
    /// hybrid, stricter callers may default to keyword.
    pub fn parse_or(input: Option<&str>, fallback: SearchMode) -> SearchMode {
        match input.map(str::trim) {
            Some("keyword") => SearchMode::Keyword,
            Some("semantic") => SearchMode::Semantic,
            Some("hybrid") => SearchMode::Hybrid,
            _ => fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }

    /// Whether this mode consults the semantic retriever.
    pub fn wants_semantic(&self) -> bool {
        matches!(self, SearchMode::Semantic | SearchMode::Hybrid)
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response field set: `compact` for list rendering, `full` for detail views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Compact,
    Full,
}

impl SearchScope {
    pub fn parse_or(input: Option<&str>, fallback: SearchScope) -> SearchScope {
        match input.map(str::trim) {
            Some("compact") => SearchScope::Compact,
            Some("full") => SearchScope::Full,
            _ => fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Compact => "compact",
            SearchScope::Full => "full",
        }
    }
}

/// Why a bookmark matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSignal {
    Title,
    Description,
    Content,
    Url,
    Tag,
    Semantic,
}

impl MatchSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSignal::Title => "title",
            MatchSignal::Description => "description",
            MatchSignal::Content => "content",
            MatchSignal::Url => "url",
            MatchSignal::Tag => "tag",
            MatchSignal::Semantic => "semantic",
        }
    }
}

/// Match signals in discovery order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchReasons(Vec<MatchSignal>);

impl MatchReasons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `signal` unless it is already present; the first occurrence wins.
    pub fn push(&mut self, signal: MatchSignal) {
        if !self.0.contains(&signal) {
            self.0.push(signal);
        }
    }

    pub fn extend(&mut self, other: &MatchReasons) {
        for signal in &other.0 {
            self.push(*signal);
        }
    }

    pub fn as_slice(&self) -> &[MatchSignal] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<MatchSignal>> for MatchReasons {
    fn from(signals: Vec<MatchSignal>) -> Self {
        let mut reasons = MatchReasons::new();
        for signal in signals {
            reasons.push(signal);
        }
        reasons
    }
}

/// Closed set of degradation causes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackReason {
    #[serde(rename = "semantic-unavailable")]
    SemanticUnavailable,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::SemanticUnavailable => "semantic-unavailable",
        }
    }
}

impl Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized, request-scoped search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub user: UserId,
    /// Trimmed query text; empty means "no search".
    pub text: String,
    pub mode: SearchMode,
    pub scope: SearchScope,
    pub filter: BookmarkFilter,
    /// Already clamped to `[1, max_limit]`.
    pub limit: usize,
}

/// One matcher's opinion about one bookmark.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub bookmark: Bookmark,
    pub score: f64,
    pub reasons: MatchReasons,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub id: BookmarkId,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: BookmarkType,
    pub folder_name: Option<String>,
    pub folder_emoji: Option<String>,
    pub platform: Option<String>,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub match_reasons: MatchReasons,

    // full scope only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl SearchResultItem {
    /// Projects a ranked candidate into the response field set for `scope`.
    pub fn project(candidate: Candidate, scope: SearchScope) -> Self {
        let Candidate {
            bookmark,
            score,
            reasons,
        } = candidate;
        let (folder_id, folder_name, folder_emoji) = match bookmark.folder {
            Some(folder) => (Some(folder.id), Some(folder.name), folder.emoji),
            None => (None, None, None),
        };

        let mut item = SearchResultItem {
            id: bookmark.id,
            title: bookmark.title,
            description: bookmark.description,
            url: bookmark.url,
            kind: bookmark.kind,
            folder_name,
            folder_emoji,
            platform: bookmark.platform,
            created_at: bookmark.created_at,
            score,
            match_reasons: reasons,
            folder_id: None,
            cover_image: None,
            is_favorite: None,
            tags: None,
            content: None,
        };

        if scope == SearchScope::Full {
            item.folder_id = folder_id;
            item.cover_image = bookmark.cover_image;
            item.is_favorite = Some(bookmark.is_favorite);
            item.tags = Some(bookmark.tags);
            item.content = bookmark.content;
        }

        item
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<SearchResultItem>,
    /// The mode that actually ran.
    pub mode_used: SearchMode,
    /// Present only when `mode_used` differs from the requested mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("bookmark store failure: {0:?}")]
    Store(#[from] anyhow::Error),

    #[error("search task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
