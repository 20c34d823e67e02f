//! Caller token middleware
//!
//! The BFF does not authenticate its callers itself. It requires the Google
//! access token in `X-YouHedge-Token` and forwards it upstream as a bearer
//! token; Google decides what the caller may read.

use std::fmt;

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::Error;

/// Header carrying the caller's Google access token
pub const TOKEN_HEADER: &str = "x-youhedge-token";

/// Access token of the current caller, inserted as a request extension
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Reject requests without a usable `X-YouHedge-Token` header
pub async fn token_middleware(mut request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();

    let Some(value) = request.headers().get(TOKEN_HEADER) else {
        warn!(path = %path, "Missing token header");
        return Error::Unauthorized("Missing 'X-YouHedge-Token' header".to_string()).into_response();
    };

    let token = match value.to_str() {
        Ok(token) if !token.trim().is_empty() => AccessToken::new(token.trim()),
        _ => {
            warn!(path = %path, "Unusable token header");
            return Error::Unauthorized("Invalid 'X-YouHedge-Token' header".to_string())
                .into_response();
        }
    };

    debug!(path = %path, "Token header present");
    request.extensions_mut().insert(token);
    next.run(request).await
}
