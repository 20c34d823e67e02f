//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info};

use super::auth::{AccessToken, token_middleware};
use crate::cache::{CacheLayerState, ResponseCache, cache_middleware};
use crate::oauth::{GoogleOAuthClient, LoginDetails, RefreshTokenRequest, RefreshedToken, TokenGrant};
use crate::website::{self, Website};
use crate::youtube::YoutubeClient;
use crate::{Error, Result};

/// Poll interval used when the client does not pass one
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    /// Google OAuth client
    pub oauth: GoogleOAuthClient,
    /// YouTube Data API client
    pub youtube: YoutubeClient,
    /// Response cache in front of the YouTube routes
    pub cache: Arc<ResponseCache>,
    /// Overall budget for one device login polling call
    pub poll_timeout: Duration,
    /// Maximum request body size buffered by the cache
    pub max_body_size: usize,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cache_layer = CacheLayerState {
        cache: Arc::clone(&state.cache),
        max_body_size: state.max_body_size,
    };

    // Layers run bottom to top: token check first, then the cache
    let youtube = Router::new()
        .route("/youtube/subscriptions", get(subscriptions_handler))
        .route("/youtube/channels/{channel_id}", get(channel_handler))
        .route(
            "/youtube/playlists/{playlist_id}/videos",
            get(playlist_items_handler),
        )
        .route(
            "/youtube/playlist-items/{playlist_id}",
            get(playlist_items_handler),
        )
        .route_layer(middleware::from_fn_with_state(cache_layer, cache_middleware))
        .route_layer(middleware::from_fn(token_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/tv", post(initiate_login_handler))
        .route("/auth/tv/{device_code}", get(poll_login_handler))
        .route("/auth/refresh-token", post(refresh_token_handler))
        .merge(youtube)
        .merge(website::router(Website::new()))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": state.cache.stats(),
    }))
}

/// POST /auth/tv - start a device login
async fn initiate_login_handler(State(state): State<Arc<AppState>>) -> Result<Json<LoginDetails>> {
    state.oauth.initiate_login().await.map(Json)
}

#[derive(Debug, Deserialize)]
struct PollQuery {
    interval: Option<String>,
}

impl PollQuery {
    /// Requested interval in seconds; anything that is not an integer falls
    /// back to the default
    fn interval_secs(&self) -> u64 {
        self.interval
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
    }
}

/// GET /auth/tv/{device_code}?interval=5 - wait for the user to approve
async fn poll_login_handler(
    State(state): State<Arc<AppState>>,
    Path(device_code): Path<String>,
    query: std::result::Result<Query<PollQuery>, QueryRejection>,
) -> Result<Json<TokenGrant>> {
    let Query(query) = query.map_err(|_| Error::BadRequest("invalid query".to_string()))?;
    let interval = query.interval_secs();
    if interval == 0 {
        return Err(Error::BadRequest("interval must be positive".to_string()));
    }

    info!(interval, "Polling device login");

    // Polling runs on its own task; the guard stops it if this request goes away
    let cancel = CancellationToken::new();
    let child = cancel.child_token();
    let oauth = state.oauth.clone();
    let timeout = state.poll_timeout;
    let task = tokio::spawn(async move {
        oauth
            .poll_device_login(&device_code, Duration::from_secs(interval), timeout, &child)
            .await
    });
    let _guard = cancel.drop_guard();

    task.await
        .map_err(|e| Error::Internal(format!("polling task failed: {e}")))?
        .map(Json)
}

/// POST /auth/refresh-token
async fn refresh_token_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<RefreshedToken>> {
    let Json(body) = payload.map_err(|e| {
        debug!(error = %e, "Rejected refresh body");
        Error::BadRequest("malformed body".to_string())
    })?;

    state
        .oauth
        .refresh_access_token(&body.refresh_token)
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(rename = "pageToken", alias = "nextPageToken")]
    page_token: Option<String>,
}

/// GET /youtube/subscriptions
async fn subscriptions_handler(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<AccessToken>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Value>> {
    state
        .youtube
        .subscriptions(token.as_str(), page.page_token.as_deref())
        .await
        .map(Json)
}

/// GET /youtube/channels/{channel_id}
async fn channel_handler(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<AccessToken>,
    Path(channel_id): Path<String>,
) -> Result<Json<Value>> {
    state
        .youtube
        .channel(token.as_str(), &channel_id)
        .await
        .map(Json)
}

/// GET /youtube/playlists/{playlist_id}/videos
async fn playlist_items_handler(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<AccessToken>,
    Path(playlist_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Value>> {
    state
        .youtube
        .playlist_items(token.as_str(), &playlist_id, page.page_token.as_deref())
        .await
        .map(Json)
}
