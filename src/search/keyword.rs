//! Keyword matching over bookmark text fields.
//!
//! Fields are checked in priority order (title, description, content, url,
//! tag). Each field a query term occurs in adds one match signal and a share
//! of that field's weight proportional to how many query terms it contains.

use std::sync::Arc;

use super::{Candidate, MatchReasons, MatchSignal, SearchRequest};
use crate::bookmarks::{Bookmark, BookmarkStore};

/// Field weights in priority order.
const FIELD_WEIGHTS: [(MatchSignal, f64); 5] = [
    (MatchSignal::Title, 5.0),
    (MatchSignal::Description, 4.0),
    (MatchSignal::Content, 3.0),
    (MatchSignal::Url, 2.0),
    (MatchSignal::Tag, 1.0),
];

#[derive(Clone)]
pub struct KeywordMatcher {
    store: Arc<dyn BookmarkStore>,
}

impl KeywordMatcher {
    pub fn new(store: Arc<dyn BookmarkStore>) -> Self {
        Self { store }
    }

    /// Matches the owner's bookmarks, honoring the request's filters and limit.
    pub fn find(&self, request: &SearchRequest) -> anyhow::Result<Vec<Candidate>> {
        let bookmarks = self.store.list_for_owner(&request.user, &request.filter)?;
        Ok(score_keyword(&request.text, bookmarks, request.limit))
    }
}

/// Scores `bookmarks` against `query` and returns the best `limit` matches.
///
/// Ordered by score descending, then newest first, then id ascending.
pub fn score_keyword(query: &str, bookmarks: Vec<Bookmark>, limit: usize) -> Vec<Candidate> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return vec![];
    }

    let mut candidates: Vec<Candidate> = bookmarks
        .into_iter()
        .filter_map(|bookmark| {
            let (score, reasons) = score_fields(&terms, &bookmark);
            if reasons.is_empty() {
                None
            } else {
                Some(Candidate {
                    bookmark,
                    score,
                    reasons,
                })
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.bookmark.created_at.cmp(&a.bookmark.created_at))
            .then_with(|| a.bookmark.id.cmp(&b.bookmark.id))
    });
    candidates.truncate(limit);

    candidates
}

/// Lowercase query terms without stop words and single ascii letters.
///
/// When filtering leaves nothing (for example "to be"), the whole trimmed
/// query becomes the only term so the user still gets literal matches.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms = tokenize(query);
    if terms.is_empty() {
        let whole = query.trim().to_lowercase();
        if !whole.is_empty() {
            terms.push(whole);
        }
    }
    terms
}

fn tokenize(query: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &[
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "in", "on", "at",
        "to", "for", "of", "with", "by", "from", "as", "and", "or", "but", "not", "no", "so",
        "if", "then",
    ];

    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .map(|s| s.to_lowercase())
        .filter(|s| !is_single_ascii(s) && !s.is_empty() && !STOP_WORDS.contains(&s.as_str()))
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn is_single_ascii(term: &str) -> bool {
    let mut chars = term.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii())
}

fn score_fields(terms: &[String], bookmark: &Bookmark) -> (f64, MatchReasons) {
    let mut score = 0.0;
    let mut reasons = MatchReasons::new();

    for (signal, weight) in FIELD_WEIGHTS {
        let matched = match signal {
            MatchSignal::Title => count_in(terms, Some(&bookmark.title)),
            MatchSignal::Description => count_in(terms, bookmark.description.as_deref()),
            MatchSignal::Content => count_in(terms, bookmark.content.as_deref()),
            MatchSignal::Url => count_in(terms, bookmark.url.as_deref()),
            MatchSignal::Tag => count_in_tags(terms, &bookmark.tags),
            MatchSignal::Semantic => 0,
        };

        if matched > 0 {
            score += weight * matched as f64 / terms.len() as f64;
            reasons.push(signal);
        }
    }

    (score, reasons)
}

fn count_in(terms: &[String], field: Option<&str>) -> usize {
    let Some(field) = field.filter(|f| !f.is_empty()) else {
        return 0;
    };
    let field = field.to_lowercase();
    terms.iter().filter(|term| field.contains(term.as_str())).count()
}

fn count_in_tags(terms: &[String], tags: &[String]) -> usize {
    if tags.is_empty() {
        return 0;
    }
    let tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    terms
        .iter()
        .filter(|term| tags.iter().any(|tag| tag.contains(term.as_str())))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::BookmarkType;
    use chrono::{TimeZone, Utc};

    fn bmark(id: &str, title: &str) -> Bookmark {
        Bookmark {
            id: id.into(),
            owner: "u1".into(),
            kind: BookmarkType::Link,
            title: title.to_string(),
            description: None,
            url: None,
            platform: None,
            folder: None,
            cover_image: None,
            is_favorite: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            tags: vec![],
            content: None,
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<String> {
        candidates.iter().map(|c| c.bookmark.id.to_string()).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("the quick brown fox"), vec!["quick", "brown", "fox"]);
        assert_eq!(tokenize("rust-lang, Python/Django"), vec!["rust", "lang", "python", "django"]);
        assert_eq!(tokenize("a b rust rust"), vec!["rust"]);
        assert_eq!(tokenize("张三"), vec!["张三"]);
        assert_eq!(tokenize("书"), vec!["书"]);
    }

    #[test]
    fn test_stop_word_only_query_uses_whole_text() {
        assert_eq!(query_terms("To Be"), vec!["to be"]);
        assert!(query_terms("   ").is_empty());
    }

    #[test]
    fn test_empty_store_returns_nothing() {
        assert!(score_keyword("rust", vec![], 10).is_empty());
    }

    #[test]
    fn test_each_field_contributes_one_signal() {
        let mut b = bmark("b1", "Rust book");
        b.description = Some("all about rust".to_string());
        b.url = Some("https://rust-lang.org".to_string());
        b.tags = vec!["rust".to_string()];

        let out = score_keyword("rust", vec![b], 10);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].reasons.as_slice(),
            &[
                MatchSignal::Title,
                MatchSignal::Description,
                MatchSignal::Url,
                MatchSignal::Tag
            ]
        );
        assert_eq!(out[0].score, 5.0 + 4.0 + 2.0 + 1.0);
    }

    #[test]
    fn test_field_priority_orders_results() {
        let mut by_content = bmark("c", "Notes");
        by_content.content = Some("a design system".to_string());
        let by_title = bmark("t", "Design patterns");
        let mut by_url = bmark("u", "Misc");
        by_url.url = Some("https://design.dev".to_string());

        let out = score_keyword("design", vec![by_url, by_content, by_title], 10);
        assert_eq!(ids(&out), vec!["t", "c", "u"]);
    }

    #[test]
    fn test_partial_term_matches_score_proportionally() {
        let both = bmark("both", "rust async runtime");
        let one = bmark("one", "rust basics");

        let out = score_keyword("rust async", vec![one, both], 10);
        assert_eq!(ids(&out), vec!["both", "one"]);
        assert_eq!(out[1].score, 2.5);
    }

    #[test]
    fn test_ties_prefer_newer_then_lower_id() {
        let mut old = bmark("a-old", "design");
        old.created_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut new = bmark("z-new", "design");
        new.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let same_b = bmark("m", "design");
        let same_a = bmark("k", "design");

        let out = score_keyword("design", vec![old, same_b, new, same_a], 10);
        assert_eq!(ids(&out), vec!["z-new", "k", "m", "a-old"]);
    }

    #[test]
    fn test_limit_truncates() {
        let bookmarks = (0..10).map(|i| bmark(&format!("b{i}"), "rust")).collect();
        assert_eq!(score_keyword("rust", bookmarks, 3).len(), 3);
    }

    #[test]
    fn test_case_insensitive_and_cjk() {
        let latin = bmark("l", "RUST Programming");
        let mut cjk = bmark("c", "会议纪要");
        cjk.description = Some("张三的分享".to_string());

        assert_eq!(ids(&score_keyword("rust", vec![latin], 10)), vec!["l"]);
        let out = score_keyword("张三", vec![cjk], 10);
        assert_eq!(out[0].reasons.as_slice(), &[MatchSignal::Description]);
    }
}
