//! Device flow payloads
//!
//! Wire shapes exchanged with the OAuth provider and handed back to clients.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Answer to a device authorization request.
///
/// Passed through to the client so it can show `user_code` and
/// `verification_url` to the user and start polling with `device_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginDetails {
    /// Opaque code identifying the pending login
    pub device_code: String,
    /// Short code the user types on the verification page
    pub user_code: String,
    /// Page where the user approves the login
    pub verification_url: String,
    /// Seconds until `device_code` expires
    pub expires_in: u64,
    /// Minimum seconds between poll attempts
    pub interval: u64,
}

/// Tokens granted once the user approves a device login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Bearer token for API calls
    pub access_token: String,
    /// Always `Bearer` for Google
    pub token_type: String,
    /// Seconds until `access_token` expires
    pub expires_in: u64,
    /// Long-lived token for [`RefreshedToken`] exchanges
    pub refresh_token: String,
}

/// Result of exchanging a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedToken {
    /// Fresh bearer token
    pub access_token: String,
    /// Seconds until `access_token` expires
    pub expires_in: u64,
    /// Space separated granted scopes
    #[serde(default)]
    pub scope: String,
    /// Token type, `Bearer`
    pub token_type: String,
}

/// Inbound body of `POST /auth/refresh-token`
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    /// Refresh token obtained from a device login
    pub refresh_token: String,
}

/// One classified answer from the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// The user approved; tokens attached
    Granted(TokenGrant),
    /// `authorization_pending`
    Pending,
    /// `slow_down`
    SlowDown,
    /// `access_denied`
    Denied,
    /// Any other provider error code
    Rejected {
        /// Provider error code
        code: String,
        /// Optional `error_description`
        description: Option<String>,
    },
}

impl PollResponse {
    /// Classify a provider error code
    #[must_use]
    pub fn from_error_code(code: &str, description: Option<String>) -> Self {
        match code {
            "authorization_pending" => Self::Pending,
            "slow_down" => Self::SlowDown,
            "access_denied" => Self::Denied,
            other => Self::Rejected {
                code: other.to_string(),
                description,
            },
        }
    }
}

/// Error payload returned by the provider (RFC 6749 section 5.2)
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderError {
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

/// Parameters of one polling call.
///
/// Lives only for the duration of [`poll_device_login`](super::poll_device_login);
/// nothing about it is persisted.
#[derive(Debug, Clone)]
pub struct DeviceLoginSession {
    /// Device code from [`LoginDetails`]
    pub device_code: String,
    /// Wait between attempts; doubled on every `slow_down`
    pub interval: Duration,
    /// Overall wall-clock budget for the call
    pub timeout: Duration,
}

impl DeviceLoginSession {
    /// Create a session
    #[must_use]
    pub fn new(device_code: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            device_code: device_code.into(),
            interval,
            timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn error_codes_classify() {
        assert_eq!(
            PollResponse::from_error_code("authorization_pending", None),
            PollResponse::Pending
        );
        assert_eq!(
            PollResponse::from_error_code("slow_down", None),
            PollResponse::SlowDown
        );
        assert_eq!(
            PollResponse::from_error_code("access_denied", None),
            PollResponse::Denied
        );
        assert_eq!(
            PollResponse::from_error_code("expired_token", Some("gone".into())),
            PollResponse::Rejected {
                code: "expired_token".into(),
                description: Some("gone".into()),
            }
        );
    }

    #[test]
    fn grant_drops_unknown_fields() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{
                "access_token": "a",
                "token_type": "Bearer",
                "expires_in": 3599,
                "refresh_token": "r",
                "id_token": "ignored"
            }"#,
        )
        .unwrap();
        assert_eq!(grant.refresh_token, "r");
        assert_eq!(
            serde_json::to_value(&grant).unwrap(),
            serde_json::json!({
                "access_token": "a",
                "token_type": "Bearer",
                "expires_in": 3599,
                "refresh_token": "r",
            })
        );
    }
}
