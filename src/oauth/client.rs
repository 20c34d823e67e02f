//! Google OAuth client
//!
//! Speaks the three form-encoded calls of the limited-input device flow:
//! device authorization, device code exchange and refresh token exchange.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::poller::{self, TokenEndpoint};
use super::types::{
    DeviceLoginSession, LoginDetails, PollResponse, ProviderError, RefreshedToken, TokenGrant,
};
use crate::config::GoogleConfig;
use crate::{Error, Result};

/// Grant type Google expects when exchanging a device code
pub const DEVICE_GRANT_TYPE: &str = "http://oauth.net/grant_type/device/1.0";

/// OAuth client bound to one set of Google credentials
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: Client,
    config: GoogleConfig,
}

impl fmt::Debug for GoogleOAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleOAuthClient")
            .field("client_id", &self.config.client_id)
            .field("token_url", &self.config.token_url)
            .finish_non_exhaustive()
    }
}

impl GoogleOAuthClient {
    /// Create a client. `http` should carry the per-call upstream timeout.
    #[must_use]
    pub fn new(http: Client, config: GoogleConfig) -> Self {
        Self { http, config }
    }

    /// Start a device login.
    ///
    /// Single request; any non-success answer is fatal.
    pub async fn initiate_login(&self) -> Result<LoginDetails> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let details: LoginDetails = self
            .post_form(&self.config.device_code_url, &form, "device authorization")
            .await?;

        info!(
            interval = details.interval,
            expires_in = details.expires_in,
            "Device login initiated"
        );
        Ok(details)
    }

    /// Trade a refresh token for a fresh access token.
    ///
    /// Single request; any non-success answer is fatal.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let token: RefreshedToken = self
            .post_form(&self.config.token_url, &form, "token refresh")
            .await?;

        info!(expires_in = token.expires_in, "Access token refreshed");
        Ok(token)
    }

    /// Poll the token endpoint until the login identified by `device_code`
    /// resolves. See [`poller::poll_device_login`].
    pub async fn poll_device_login(
        &self,
        device_code: &str,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant> {
        let session = DeviceLoginSession::new(device_code, interval, timeout);
        poller::poll_device_login(self, session, cancel).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
        operation: &str,
    ) -> Result<T> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{operation} body unreadable: {e}")))?;

        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "{operation} failed: {}",
                describe_failure(status, &body)
            )));
        }

        serde_json::from_slice(&body)
            .map_err(|e| Error::MalformedUpstreamResponse(format!("{operation}: {e}")))
    }
}

#[async_trait]
impl TokenEndpoint for GoogleOAuthClient {
    async fn exchange_device_code(&self, device_code: &str) -> Result<PollResponse> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", device_code),
            ("grant_type", DEVICE_GRANT_TYPE),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("token body unreadable: {e}")))?;

        debug!(status = status.as_u16(), "Token endpoint answered");
        classify_poll_body(status, &body)
    }
}

/// Turn a token endpoint answer into a [`PollResponse`].
///
/// Google reports `authorization_pending` and friends with a non-200 status,
/// so the `error` field decides, whatever the status.
fn classify_poll_body(status: StatusCode, body: &[u8]) -> Result<PollResponse> {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Err(Error::UpstreamUnavailable(format!(
            "token endpoint answered HTTP {status} without a JSON body"
        )));
    };

    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let description = value
            .get("error_description")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(PollResponse::from_error_code(code, description));
    }

    if !status.is_success() {
        return Err(Error::UpstreamUnavailable(format!(
            "token endpoint answered HTTP {status}"
        )));
    }

    serde_json::from_value(value)
        .map(PollResponse::Granted)
        .map_err(|e| Error::MalformedUpstreamResponse(format!("token grant: {e}")))
}

fn describe_failure(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ProviderError>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("HTTP {status} {}: {description}", err.error),
            None => format!("HTTP {status} {}", err.error),
        },
        Err(_) => format!("HTTP {status}"),
    }
}
