//! Error types for the tube BFF

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Result type alias for the tube BFF
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the BFF core and its HTTP surface.
///
/// Each kind maps to a distinct HTTP status through [`Error::status_code`],
/// so callers never need to inspect messages to tell a timeout from an
/// upstream failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure or non-success answer from a third-party endpoint
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream answered with a success status but an unexpected body
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// The user declined the device login
    #[error("Authorization denied by user")]
    AuthorizationDenied,

    /// Any other definitive rejection from the OAuth provider
    #[error("OAuth provider error {code}: {description}")]
    Provider {
        /// Provider error code (e.g. `expired_token`)
        code: String,
        /// Human readable description, if the provider sent one
        description: String,
    },

    /// The overall polling budget ran out before a definitive answer
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The caller went away while the operation was in progress
    #[error("Operation cancelled")]
    Cancelled,

    /// Missing or unusable credentials on the inbound request
    #[error("{0}")]
    Unauthorized(String),

    /// Inbound request failed validation
    #[error("{0}")]
    BadRequest(String),

    /// Inbound request body exceeds the configured limit
    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// Requested resource does not exist upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a provider error from the OAuth `error` / `error_description` pair
    pub fn provider(code: impl Into<String>, description: Option<String>) -> Self {
        Self::Provider {
            code: code.into(),
            description: description.unwrap_or_default(),
        }
    }

    /// HTTP status this error is rendered with
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) | Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::AuthorizationDenied => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the client.
    ///
    /// Server-side failures collapse to a generic message; their detail only
    /// goes to the log.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Timeout(_) => "request timed out".to_string(),
            Self::Provider { code, .. } => format!("authorization failed: {code}"),
            e if e.status_code().is_server_error() => "unknown internal error".to_string(),
            e => e.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
