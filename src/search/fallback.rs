//! Decides which mode actually ran.
//!
//! | requested | semantic available | mode used | fallback reason        |
//! |-----------|--------------------|-----------|------------------------|
//! | keyword   | any                | keyword   | none                   |
//! | semantic  | yes                | semantic  | none                   |
//! | semantic  | no                 | keyword   | semantic-unavailable   |
//! | hybrid    | yes                | hybrid    | none                   |
//! | hybrid    | no                 | keyword   | semantic-unavailable   |

use super::{FallbackReason, SearchMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackDecision {
    pub mode_used: SearchMode,
    pub fallback_reason: Option<FallbackReason>,
}

pub fn decide(requested: SearchMode, semantic_available: bool) -> FallbackDecision {
    match requested {
        SearchMode::Semantic | SearchMode::Hybrid if !semantic_available => FallbackDecision {
            mode_used: SearchMode::Keyword,
            fallback_reason: Some(FallbackReason::SemanticUnavailable),
        },
        mode => FallbackDecision {
            mode_used: mode,
            fallback_reason: None,
        },
    }
}
