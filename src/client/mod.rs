//! Client side of search: a debounced, cancelable query session and the
//! HTTP fetcher it drives.

mod remote;
pub mod session;

pub use remote::RemoteSearchClient;
pub use session::{
    Phase, QuerySession, SessionError, SessionOptions, SessionSnapshot,
};

use async_trait::async_trait;
use serde::Serialize;

use crate::search::{SearchMode, SearchResponse, SearchScope};

/// Query sent to the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientQuery {
    pub q: String,
    pub mode: SearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<SearchScope>,
    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Failed(String),
}

/// Issues one search request.
///
/// Dropping the returned future must abort the request.
#[async_trait]
pub trait SearchFetcher: Send + Sync + 'static {
    async fn fetch(&self, query: ClientQuery) -> Result<SearchResponse, FetchError>;

    /// Whether the fetcher has anything to authenticate with.
    fn has_credentials(&self) -> bool {
        true
    }
}
