use async_trait::async_trait;
use reqwest::StatusCode;

use super::{ClientQuery, FetchError, SearchFetcher};
use crate::config::ClientConfig;
use crate::search::SearchResponse;

/// Talks to a running `recall serve` over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteSearchClient {
    client: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl RemoteSearchClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            addr: config.addr.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }
}

#[async_trait]
impl SearchFetcher for RemoteSearchClient {
    async fn fetch(&self, query: ClientQuery) -> Result<SearchResponse, FetchError> {
        let mut req = self
            .client
            .get(format!("{}/search", self.addr))
            .query(&query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| FetchError::Failed(format!("request failed: {e}")))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(FetchError::Unauthenticated),
            status if status.is_success() => resp
                .json::<SearchResponse>()
                .await
                .map_err(|e| FetchError::Failed(format!("malformed response: {e}"))),
            status => {
                let body = resp.json::<serde_json::Value>().await.ok();
                let message = body
                    .as_ref()
                    .and_then(|b| b.get("error"))
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("server returned {status}"));
                Err(FetchError::Failed(message))
            }
        }
    }

    fn has_credentials(&self) -> bool {
        self.token.is_some()
    }
}
