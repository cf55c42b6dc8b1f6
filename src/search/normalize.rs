//! Turns raw, untrusted request parameters into a `SearchRequest`.
//!
//! Nothing here fails: unknown modes and scopes fall back to the caller's
//! defaults, limits are clamped, unusable filters are dropped.

use serde::Deserialize;

use super::{SearchMode, SearchRequest, SearchScope};
use crate::bookmarks::{BookmarkFilter, BookmarkType};
use crate::config::{SearchConfig, MAX_LIMIT};
use crate::ids::UserId;

/// Query string of `GET /search`, every field still a raw string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub mode: Option<String>,
    pub scope: Option<String>,
    #[serde(rename = "folderId")]
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<String>,
}

/// Call-site defaults applied to absent or invalid parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryDefaults {
    pub mode: SearchMode,
    pub scope: SearchScope,
    pub limit: usize,
    pub max_limit: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for QueryDefaults {
    fn from(config: &SearchConfig) -> Self {
        let max_limit = config.max_limit.clamp(1, MAX_LIMIT);
        Self {
            mode: config.default_mode,
            scope: config.default_scope,
            limit: config.default_limit.clamp(1, max_limit),
            max_limit,
        }
    }
}

pub fn normalize(params: &SearchParams, user: UserId, defaults: &QueryDefaults) -> SearchRequest {
    let text = params.q.as_deref().map(str::trim).unwrap_or_default().to_string();
    let mode = SearchMode::parse_or(params.mode.as_deref(), defaults.mode);
    let scope = SearchScope::parse_or(params.scope.as_deref(), defaults.scope);
    let limit = clamp_limit(params.limit.as_deref(), defaults.limit, defaults.max_limit);

    let folder_id = params
        .folder_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let kind = params
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .and_then(|kind| match kind.parse::<BookmarkType>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                tracing::debug!(kind, "ignoring unknown type filter");
                None
            }
        });

    SearchRequest {
        user,
        text,
        mode,
        scope,
        filter: BookmarkFilter { folder_id, kind },
        limit,
    }
}

/// Parses a limit and clamps it to `[1, max_limit]`.
///
/// Absent or non-integer input yields `default`.
pub fn clamp_limit(raw: Option<&str>, default: usize, max_limit: usize) -> usize {
    let max_limit = max_limit.clamp(1, MAX_LIMIT);
    match raw.map(str::trim).and_then(|raw| raw.parse::<i64>().ok()) {
        Some(limit) if limit < 1 => 1,
        Some(limit) => usize::try_from(limit).unwrap_or(max_limit).min(max_limit),
        None => default.clamp(1, max_limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(q: &str) -> SearchParams {
        SearchParams {
            q: Some(q.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(clamp_limit(Some("0"), 20, 50), 1);
        assert_eq!(clamp_limit(Some("-3"), 20, 50), 1);
        assert_eq!(clamp_limit(Some("1000"), 20, 50), 50);
        assert_eq!(clamp_limit(Some("12"), 20, 50), 12);
        assert_eq!(clamp_limit(Some("abc"), 20, 50), 20);
        assert_eq!(clamp_limit(Some("2.5"), 20, 50), 20);
        assert_eq!(clamp_limit(None, 20, 50), 20);
    }

    #[test]
    fn test_limit_never_exceeds_hard_ceiling() {
        assert_eq!(clamp_limit(Some("80"), 20, 200), MAX_LIMIT);
    }

    #[test]
    fn test_defaults_apply_for_unknown_values() {
        let mut raw = params("  rust  ");
        raw.mode = Some("vector".to_string());
        raw.scope = Some("everything".to_string());

        let request = normalize(&raw, "u1".into(), &QueryDefaults::default());

        assert_eq!(request.text, "rust");
        assert_eq!(request.mode, SearchMode::Hybrid);
        assert_eq!(request.scope, SearchScope::Compact);
        assert_eq!(request.limit, 20);
    }

    #[test]
    fn test_call_site_default_mode() {
        let defaults = QueryDefaults {
            mode: SearchMode::Keyword,
            ..QueryDefaults::default()
        };
        let request = normalize(&params("rust"), "u1".into(), &defaults);
        assert_eq!(request.mode, SearchMode::Keyword);
    }

    #[test]
    fn test_filters() {
        let mut raw = params("rust");
        raw.folder_id = Some("f1".to_string());
        raw.kind = Some("video".to_string());

        let request = normalize(&raw, "u1".into(), &QueryDefaults::default());
        assert_eq!(request.filter.folder_id.as_deref(), Some("f1"));
        assert_eq!(request.filter.kind, Some(BookmarkType::Video));
    }

    #[test]
    fn test_unknown_type_and_blank_folder_are_dropped() {
        let mut raw = params("rust");
        raw.folder_id = Some("   ".to_string());
        raw.kind = Some("podcast".to_string());

        let request = normalize(&raw, "u1".into(), &QueryDefaults::default());
        assert_eq!(request.filter, BookmarkFilter::default());
    }

    #[test]
    fn test_whitespace_query_is_empty() {
        let request = normalize(&params(" \t\n"), "u1".into(), &QueryDefaults::default());
        assert!(request.text.is_empty());

        let request = normalize(&SearchParams::default(), "u1".into(), &QueryDefaults::default());
        assert!(request.text.is_empty());
    }
}
