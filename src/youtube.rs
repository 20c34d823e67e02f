//! YouTube Data API client
//!
//! Read-only listing calls made on behalf of the logged-in user. Payloads are
//! passed through untouched once they pass a shallow shape check.
//!
//! # Security
//!
//! The caller's access token and the API key are never logged or included in
//! error messages.

use reqwest::{Client, header};
use serde_json::Value;
use tracing::debug;

use crate::config::GoogleConfig;
use crate::{Error, Result};

/// Client for the YouTube Data API v3
#[derive(Clone)]
pub struct YoutubeClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for YoutubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl YoutubeClient {
    /// Create a client. `http` should carry the per-call upstream timeout.
    #[must_use]
    pub fn new(http: Client, config: &GoogleConfig) -> Self {
        Self {
            http,
            base_url: config.youtube_api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// One page of the caller's subscriptions
    pub async fn subscriptions(&self, access_token: &str, page_token: Option<&str>) -> Result<Value> {
        let mut query = vec![("part", "snippet"), ("mine", "true")];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.list("subscriptions", access_token, &query).await
    }

    /// A single channel with its snippet and content details.
    ///
    /// An empty result set is [`Error::NotFound`].
    pub async fn channel(&self, access_token: &str, channel_id: &str) -> Result<Value> {
        let query = [("part", "snippet,contentDetails"), ("id", channel_id)];
        let mut page = self.list("channels", access_token, &query).await?;

        match page.get_mut("items").and_then(Value::as_array_mut) {
            Some(items) if !items.is_empty() => Ok(items.swap_remove(0)),
            _ => Err(Error::NotFound(format!("channel {channel_id}"))),
        }
    }

    /// One page of the items in a playlist
    pub async fn playlist_items(
        &self,
        access_token: &str,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<Value> {
        let mut query = vec![("part", "snippet"), ("playlistId", playlist_id)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.list("playlistItems", access_token, &query).await
    }

    async fn list(&self, resource: &str, access_token: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{resource}", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                Error::UpstreamUnavailable(format!("{resource} request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        debug!(resource, status = status.as_u16(), "YouTube API answered");

        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "{resource} returned HTTP {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{resource} body unreadable: {}", e.without_url())))?;

        validate_list_response(resource, &body)?;
        Ok(body)
    }
}

/// Shallow check of a `*ListResponse`: string `kind`, string `etag` and an
/// `items` array.
fn validate_list_response(resource: &str, body: &Value) -> Result<()> {
    let well_formed = body.get("kind").is_some_and(Value::is_string)
        && body.get("etag").is_some_and(Value::is_string)
        && body.get("items").is_some_and(Value::is_array);

    if well_formed {
        Ok(())
    } else {
        Err(Error::MalformedUpstreamResponse(format!(
            "{resource} response lacks kind, etag or items"
        )))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> YoutubeClient {
        let config = GoogleConfig {
            api_key: "api-key".into(),
            youtube_api_url: format!("{}/youtube/v3/", server.uri()),
            ..GoogleConfig::default()
        };
        YoutubeClient::new(Client::new(), &config)
    }

    fn list(kind: &str, items: Value) -> Value {
        json!({
            "kind": kind,
            "etag": "etag-1",
            "nextPageToken": "CAUQAA",
            "pageInfo": {"totalResults": 1, "resultsPerPage": 5},
            "items": items
        })
    }

    #[tokio::test]
    async fn subscriptions_forward_token_key_and_page() {
        let server = MockServer::start().await;
        let page = list("youtube#subscriptionListResponse", json!([{"id": "sub-1"}]));
        Mock::given(method("GET"))
            .and(path("/youtube/v3/subscriptions"))
            .and(query_param("part", "snippet"))
            .and(query_param("mine", "true"))
            .and(query_param("key", "api-key"))
            .and(query_param("pageToken", "CAUQAA"))
            .and(header("authorization", "Bearer user-token"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&page))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server)
            .subscriptions("user-token", Some("CAUQAA"))
            .await
            .unwrap();
        assert_eq!(body, page);
    }

    #[tokio::test]
    async fn first_page_sends_no_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/playlistItems"))
            .and(query_param("playlistId", "PL123"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(list("youtube#playlistItemListResponse", json!([]))),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .playlist_items("user-token", "PL123", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn channel_returns_first_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/channels"))
            .and(query_param("part", "snippet,contentDetails"))
            .and(query_param("id", "UC123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list(
                "youtube#channelListResponse",
                json!([{"id": "UC123", "kind": "youtube#channel"}]),
            )))
            .mount(&server)
            .await;

        let channel = client(&server).channel("user-token", "UC123").await.unwrap();
        assert_eq!(channel, json!({"id": "UC123", "kind": "youtube#channel"}));
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/channels"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(list("youtube#channelListResponse", json!([]))),
            )
            .mount(&server)
            .await;

        let err = client(&server).channel("user-token", "UCnope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn upstream_error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"code": 401}})))
            .mount(&server)
            .await;

        let err = client(&server).subscriptions("expired", None).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
        assert!(!err.to_string().contains("api-key"));
    }

    #[tokio::test]
    async fn shape_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "x", "items": {}})))
            .mount(&server)
            .await;

        let err = client(&server).subscriptions("t", None).await.unwrap_err();
        assert!(matches!(err, Error::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn list_response_shape() {
        assert!(validate_list_response("x", &list("k", json!([]))).is_ok());
        assert!(validate_list_response("x", &json!([])).is_err());
        assert!(validate_list_response("x", &json!({"kind": 1, "etag": "e", "items": []})).is_err());
    }
}
