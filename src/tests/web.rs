use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::auth::TokenSessions;
use crate::bookmarks::BackendCsv;
use crate::config::Config;
use crate::search::QueryDefaults;
use crate::web::{router, SharedState};

use super::fixtures::*;

const TOKEN: &str = "secret-token";

fn state(store: Arc<MemoryStore>) -> SharedState {
    let mut tokens = BTreeMap::new();
    tokens.insert(TOKEN.to_string(), OWNER.to_string());
    SharedState {
        search: service(store, None, MemoryIndex::default()),
        sessions: Arc::new(TokenSessions::new(&tokens)),
        defaults: QueryDefaults::default(),
    }
}

fn store() -> Arc<MemoryStore> {
    let mut talk = in_folder(bookmark("b1", "Design talk"), "f1", "Talks");
    talk.content = Some("transcript".to_string());
    let mut other = bookmark("b2", "Design doc");
    other.owner = OTHER_OWNER.into();
    MemoryStore::new(vec![talk, other])
}

async fn get(state: SharedState, uri: &str, token: Option<&str>) -> (StatusCode, String) {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = token {
        req = req.header("Authorization", format!("Bearer {token}"));
    }

    let resp = router(state)
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_unauthenticated_is_401_without_body() {
    let store = store();

    let (status, body) = get(state(store.clone()), "/search?q=design", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_empty());

    let (status, _) = get(state(store.clone()), "/search?q=design", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // rejected before any retrieval work
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_search_response_shape() {
    let (status, body) = get(
        state(store()),
        "/search?q=design&mode=keyword",
        Some(TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["modeUsed"], "keyword");
    assert!(json.get("fallbackReason").is_none());

    let items = json["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item["id"], "b1");
    assert_eq!(item["title"], "Design talk");
    assert_eq!(item["type"], "link");
    assert_eq!(item["folderName"], "Talks");
    assert_eq!(item["matchReasons"], serde_json::json!(["title"]));
    assert!(item["score"].is_number());
    assert!(item["createdAt"].is_string());
    assert!(item.get("content").is_none());
}

#[tokio::test]
async fn test_api_alias_and_full_scope() {
    let (status, body) = get(
        state(store()),
        "/api/search?q=design&mode=keyword&scope=full",
        Some(TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["items"][0]["content"], "transcript");
    assert_eq!(json["items"][0]["folderId"], "f1");
}

#[tokio::test]
async fn test_unknown_mode_defaults_and_reports_fallback() {
    let (status, body) = get(
        state(store()),
        "/search?q=design&mode=vector&limit=abc",
        Some(TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["modeUsed"], "keyword");
    assert_eq!(json["fallbackReason"], "semantic-unavailable");
}

#[tokio::test]
async fn test_limit_is_capped() {
    let bookmarks = (0..70)
        .map(|i| bookmark(&format!("b{i:02}"), "rust"))
        .collect();
    let (status, body) = get(
        state(MemoryStore::new(bookmarks)),
        "/search?q=rust&limit=9999",
        Some(TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["items"].as_array().unwrap().len(), 50);
}

#[tokio::test]
async fn test_empty_query_is_empty_success() {
    let store = store();
    let (status, body) = get(state(store.clone()), "/search?q=%20%20", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["items"], serde_json::json!([]));
    assert_eq!(json["modeUsed"], "hybrid");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_store_failure_is_500() {
    let store = store();
    store.fail();

    let (status, body) = get(state(store), "/search?q=design", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("bookmark store"));
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(state(store()), "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_state_from_config_reads_csv() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.yaml"),
        format!("auth:\n  tokens:\n    {TOKEN}: {OWNER}\n"),
    )
    .unwrap();
    let config = Config::load_with(tmp.path()).unwrap();
    BackendCsv::write_all(
        &config.bookmarks_path(),
        &[bookmark("b1", "Design talk"), bookmark("b2", "Cooking")],
    )
    .unwrap();

    let state = SharedState::from_config(&config).unwrap();
    let (status, body) = get(state, "/search?q=design", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["modeUsed"], "keyword");
    assert_eq!(json["fallbackReason"], "semantic-unavailable");
    assert_eq!(json["items"][0]["id"], "b1");
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
}
