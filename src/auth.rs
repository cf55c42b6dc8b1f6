//! Session resolution for search requests.
//!
//! Search consumes an already-issued session: a bearer token maps to a user
//! id, or the request is rejected before any retrieval work starts.

use crate::ids::UserId;
use std::collections::BTreeMap;

/// Resolves the caller of a request into a user identity.
pub trait SessionResolver: Send + Sync {
    /// Returns `None` when there is no valid session.
    fn resolve(&self, authorization: Option<&str>) -> Option<UserId>;
}

/// Static token table loaded from `auth.tokens` in the config.
#[derive(Debug, Clone, Default)]
pub struct TokenSessions {
    tokens: Vec<(String, UserId)>,
}

impl TokenSessions {
    pub fn new(tokens: &BTreeMap<String, String>) -> Self {
        let tokens = tokens
            .iter()
            .filter(|(token, _)| !token.is_empty())
            .map(|(token, user)| (token.clone(), UserId::from(user.as_str())))
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl SessionResolver for TokenSessions {
    fn resolve(&self, authorization: Option<&str>) -> Option<UserId> {
        let provided = bearer_token(authorization?)?;

        // scan the whole table regardless of where the match is
        self.tokens
            .iter()
            .fold(None, |found, (token, user)| {
                match (found, tokens_equal(provided, token)) {
                    (None, true) => Some(user),
                    (found, _) => found,
                }
            })
            .cloned()
    }
}

/// Compares two tokens without short-circuiting on the first differing byte.
pub fn tokens_equal(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || provided.len() != expected.len() {
        return false;
    }
    provided
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Token part of an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
