//! Bookmark retrieval and ranking.
//!
//! # Architecture
//!
//! - `normalize`: canonicalizes raw request parameters into a `SearchRequest`
//! - `keyword`: lexical matcher over title, description, content, url and tags
//! - `semantic`: nearest-neighbor retriever, optional per user
//! - `fallback`: decides which mode actually ran and why
//! - `merge`: dedups, combines scores and orders the final list
//! - `service`: runs both matchers concurrently and assembles the response

pub mod fallback;
pub mod keyword;
pub mod merge;
pub mod normalize;
pub mod semantic;
pub mod service;
mod types;

pub use normalize::{QueryDefaults, SearchParams};
pub use service::SearchService;
pub use types::*;
