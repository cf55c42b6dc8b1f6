use crate::{
    auth::{SessionResolver, TokenSessions},
    bookmarks::{BackendCsv, BookmarkStore},
    config::Config,
    search::{
        normalize::normalize, QueryDefaults, SearchError, SearchParams, SearchResponse,
        SearchService,
    },
};
use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
pub struct SharedState {
    pub search: SearchService,
    pub sessions: Arc<dyn SessionResolver>,
    pub defaults: QueryDefaults,
}

impl SharedState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn BookmarkStore> = Arc::new(BackendCsv::load(config.bookmarks_path())?);
        let sessions = TokenSessions::new(&config.auth.tokens);
        if sessions.is_empty() {
            log::warn!("no auth tokens configured, every search will be rejected");
        }

        Ok(Self {
            search: SearchService::from_config(config, store),
            sessions: Arc::new(sessions),
            defaults: QueryDefaults::from(&config.search),
        })
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/api/search", get(search))
        .route("/health", get(health))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

async fn start_app(config: Config) -> anyhow::Result<()> {
    let state = SharedState::from_config(&config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    log::info!("listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(config))
}

#[derive(Debug)]
struct HttpError(SearchError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            SearchError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            SearchError::Store(_) | SearchError::Task(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": self.0.to_string()})),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for HttpError
where
    E: Into<SearchError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn search(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, HttpError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(user) = state.sessions.resolve(authorization) else {
        return Err(HttpError(SearchError::Unauthenticated));
    };

    let request = normalize(&params, user, &state.defaults);
    let response = state.search.search(request).await?;

    Ok(Json(response))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}
