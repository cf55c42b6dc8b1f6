//! Merges matcher outputs into one ordered, deduplicated list.
//!
//! In hybrid mode each matcher's scores are first scaled into `[0, 1]`
//! against that matcher's best score, then combined as
//! `w * keyword + (1 - w) * semantic` where `w` is the configured hybrid
//! keyword weight. A bookmark found by only one matcher contributes zero for
//! the other. Single-matcher modes keep raw scores.

use std::collections::HashMap;

use super::{Candidate, SearchMode, SearchResultItem, SearchScope};
use crate::ids::BookmarkId;

/// Inputs for one merge, after the fallback decision.
pub struct MergeInput {
    pub mode_used: SearchMode,
    pub keyword: Vec<Candidate>,
    pub semantic: Vec<Candidate>,
    pub keyword_weight: f32,
    pub limit: usize,
    pub scope: SearchScope,
}

pub fn merge(input: MergeInput) -> Vec<SearchResultItem> {
    let MergeInput {
        mode_used,
        keyword,
        semantic,
        keyword_weight,
        limit,
        scope,
    } = input;

    let mut merged = match mode_used {
        SearchMode::Keyword => dedup(keyword),
        SearchMode::Semantic => dedup(semantic),
        SearchMode::Hybrid => combine(keyword, semantic, keyword_weight as f64),
    };

    merged.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.bookmark.created_at.cmp(&a.bookmark.created_at))
            .then_with(|| a.bookmark.id.cmp(&b.bookmark.id))
    });
    merged.truncate(limit);

    merged
        .into_iter()
        .map(|candidate| SearchResultItem::project(candidate, scope))
        .collect()
}

/// Scales scores by the best score so the top candidate gets 1.0.
///
/// Non-positive scores map to 0.0; an all-zero list maps to 1.0 so that a
/// matcher that did match something still counts.
fn normalize_to_max(candidates: &[Candidate]) -> Vec<f64> {
    let max = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            if max <= f64::EPSILON {
                1.0
            } else {
                (c.score / max).clamp(0.0, 1.0)
            }
        })
        .collect()
}

fn combine(keyword: Vec<Candidate>, semantic: Vec<Candidate>, keyword_weight: f64) -> Vec<Candidate> {
    let keyword_weight = keyword_weight.clamp(0.0, 1.0);
    let semantic_weight = 1.0 - keyword_weight;

    let keyword = dedup(keyword);
    let semantic = dedup(semantic);
    let keyword_norm = normalize_to_max(&keyword);
    let semantic_norm = normalize_to_max(&semantic);

    let mut order: Vec<BookmarkId> = Vec::with_capacity(keyword.len() + semantic.len());
    let mut by_id: HashMap<BookmarkId, Candidate> = HashMap::new();

    for (mut candidate, norm) in keyword.into_iter().zip(keyword_norm) {
        candidate.score = keyword_weight * norm;
        order.push(candidate.bookmark.id.clone());
        by_id.insert(candidate.bookmark.id.clone(), candidate);
    }

    for (candidate, norm) in semantic.into_iter().zip(semantic_norm) {
        let contribution = semantic_weight * norm;
        match by_id.get_mut(&candidate.bookmark.id) {
            Some(existing) => {
                existing.score += contribution;
                existing.reasons.extend(&candidate.reasons);
            }
            None => {
                order.push(candidate.bookmark.id.clone());
                by_id.insert(
                    candidate.bookmark.id.clone(),
                    Candidate {
                        score: contribution,
                        ..candidate
                    },
                );
            }
        }
    }

    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

/// Keeps the best-scoring entry per bookmark, merging signals in order.
fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut order: Vec<BookmarkId> = Vec::with_capacity(candidates.len());
    let mut by_id: HashMap<BookmarkId, Candidate> = HashMap::new();

    for candidate in candidates {
        let id = candidate.bookmark.id.clone();
        match by_id.get_mut(&id) {
            Some(existing) => {
                existing.score = existing.score.max(candidate.score);
                existing.reasons.extend(&candidate.reasons);
            }
            None => {
                order.push(id.clone());
                by_id.insert(id, candidate);
            }
        }
    }

    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::{Bookmark, BookmarkType};
    use crate::config::DEFAULT_HYBRID_KEYWORD_WEIGHT;
    use crate::search::{MatchReasons, MatchSignal};
    use chrono::{TimeZone, Utc};

    fn candidate(id: &str, score: f64, signals: Vec<MatchSignal>) -> Candidate {
        Candidate {
            bookmark: Bookmark {
                id: id.into(),
                owner: "u1".into(),
                kind: BookmarkType::Article,
                title: id.to_string(),
                description: None,
                url: None,
                platform: None,
                folder: None,
                cover_image: None,
                is_favorite: false,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                tags: vec![],
                content: Some("body".to_string()),
            },
            score,
            reasons: MatchReasons::from(signals),
        }
    }

    fn input(mode_used: SearchMode, keyword: Vec<Candidate>, semantic: Vec<Candidate>) -> MergeInput {
        MergeInput {
            mode_used,
            keyword,
            semantic,
            keyword_weight: DEFAULT_HYBRID_KEYWORD_WEIGHT,
            limit: 50,
            scope: SearchScope::Compact,
        }
    }

    fn ids(items: &[SearchResultItem]) -> Vec<String> {
        items.iter().map(|i| i.id.to_string()).collect()
    }

    #[test]
    fn test_keyword_mode_keeps_raw_scores() {
        let items = merge(input(
            SearchMode::Keyword,
            vec![candidate("a", 9.0, vec![MatchSignal::Title])],
            vec![candidate("b", 0.9, vec![MatchSignal::Semantic])],
        ));
        assert_eq!(ids(&items), vec!["a"]);
        assert_eq!(items[0].score, 9.0);
    }

    #[test]
    fn test_hybrid_dedups_and_unions_signals_keyword_first() {
        let items = merge(input(
            SearchMode::Hybrid,
            vec![candidate("a", 5.0, vec![MatchSignal::Title, MatchSignal::Tag])],
            vec![candidate("a", 0.8, vec![MatchSignal::Semantic])],
        ));

        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].match_reasons.as_slice(),
            &[MatchSignal::Title, MatchSignal::Tag, MatchSignal::Semantic]
        );
        assert!((items[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_weights_favor_keyword() {
        let items = merge(input(
            SearchMode::Hybrid,
            vec![candidate("kw", 5.0, vec![MatchSignal::Title])],
            vec![candidate("sem", 0.9, vec![MatchSignal::Semantic])],
        ));

        assert_eq!(ids(&items), vec!["kw", "sem"]);
        assert!((items[0].score - 0.6).abs() < 1e-6);
        assert!((items[1].score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_weight_is_tunable() {
        let mut merge_input = input(
            SearchMode::Hybrid,
            vec![candidate("kw", 5.0, vec![MatchSignal::Title])],
            vec![candidate("sem", 0.9, vec![MatchSignal::Semantic])],
        );
        merge_input.keyword_weight = 0.2;

        let items = merge(merge_input);
        assert_eq!(ids(&items), vec!["sem", "kw"]);
    }

    #[test]
    fn test_normalization_is_per_matcher() {
        let items = merge(input(
            SearchMode::Hybrid,
            vec![
                candidate("k1", 10.0, vec![MatchSignal::Title]),
                candidate("k2", 5.0, vec![MatchSignal::Description]),
            ],
            vec![candidate("k2", 0.5, vec![MatchSignal::Semantic])],
        ));

        // k1: 0.6 * 1.0; k2: 0.6 * 0.5 + 0.4 * 1.0
        assert_eq!(ids(&items), vec!["k2", "k1"]);
        assert!((items[0].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_recency_then_id() {
        let mut older = candidate("a", 1.0, vec![MatchSignal::Title]);
        older.bookmark.created_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let items = merge(input(
            SearchMode::Keyword,
            vec![
                older,
                candidate("c", 1.0, vec![MatchSignal::Title]),
                candidate("b", 1.0, vec![MatchSignal::Title]),
            ],
            vec![],
        ));
        assert_eq!(ids(&items), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_limit_applies_after_merge() {
        let keyword = (0..5)
            .map(|i| candidate(&format!("k{i}"), 5.0 - i as f64, vec![MatchSignal::Title]))
            .collect();
        let semantic = (0..5)
            .map(|i| candidate(&format!("s{i}"), 0.9 - i as f64 * 0.1, vec![MatchSignal::Semantic]))
            .collect();

        let mut merge_input = input(SearchMode::Hybrid, keyword, semantic);
        merge_input.limit = 3;
        assert_eq!(merge(merge_input).len(), 3);
    }

    #[test]
    fn test_scope_projection() {
        let mut merge_input = input(
            SearchMode::Keyword,
            vec![candidate("a", 1.0, vec![MatchSignal::Title])],
            vec![],
        );
        merge_input.scope = SearchScope::Full;
        let items = merge(merge_input);
        assert_eq!(items[0].content.as_deref(), Some("body"));
    }
}
