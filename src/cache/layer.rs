//! axum middleware that routes a handler through the response cache

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{BufferedRequest, CachedResponse, ResponseCache};

/// State shared by every request passing through [`cache_middleware`]
#[derive(Debug, Clone)]
pub struct CacheLayerState {
    /// The cache to consult
    pub cache: Arc<ResponseCache>,
    /// Upper bound on request bodies read for fingerprinting
    pub max_body_size: usize,
}

/// Serve identical requests from the cache within its TTL.
///
/// The body is read into memory once, fingerprinted, and a replayable copy is
/// handed to the next handler on a miss. Install it with
/// `axum::middleware::from_fn_with_state`.
pub async fn cache_middleware(
    State(state): State<CacheLayerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let buffered = match BufferedRequest::from_request(request, state.max_body_size).await {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let key = buffered.fingerprint();

    let result = state
        .cache
        .get_or_compute(key, || async move {
            let response = next.run(buffered.into_request()).await;
            CachedResponse::from_response(response).await
        })
        .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}
