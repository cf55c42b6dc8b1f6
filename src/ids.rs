use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Declares an opaque string identifier.
///
/// Identifiers are compared and ordered by their raw string value, which is
/// what the ranker uses as its final tie-break.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(s.to_string()))
            }
        }

        impl Deref for $name {
            type Target = String;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(fr: &str) -> Self {
                $name(fr.to_string())
            }
        }

        impl From<String> for $name {
            fn from(fr: String) -> Self {
                $name(fr)
            }
        }

        impl From<$name> for String {
            fn from(fr: $name) -> Self {
                fr.0
            }
        }
    };
}

opaque_id!(
    /// Identity of a bookmark, assigned by the bookmark store.
    BookmarkId
);

opaque_id!(
    /// Identity of an authenticated user.
    UserId
);

/// Fresh id used to correlate the log lines of a single search request.
#[inline]
pub fn new_request_id() -> String {
    rusty_ulid::generate_ulid_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_order_by_raw_value() {
        let mut ids: Vec<BookmarkId> = vec!["b".into(), "a".into(), "c".into()];
        ids.sort();
        assert_eq!(ids, vec!["a".into(), "b".into(), "c".into()]);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = UserId::from("user-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-1\"");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
