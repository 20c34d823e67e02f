//! Response deduplication cache
//!
//! [`ResponseCache`] replays a previously computed successful response when
//! the *same* request (same [`Fingerprint`]) arrives again within the TTL.
//! Only responses with a status below 400 are stored, so a failing upstream
//! call is retried by the very next identical request.
//!
//! Expiry is lazy: an entry older than the TTL is removed by the lookup that
//! finds it. There is no size bound and no background sweep.
//!
//! # Concurrency
//!
//! The map is a `DashMap`, so concurrent reads and writes never corrupt it.
//! `get_or_compute` is check-then-act without a per-key lock: two identical
//! requests racing on a cold key may both run the handler, and the later
//! `put` wins. That is accepted behaviour for a cache.

pub mod fingerprint;
pub mod layer;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    body::{self, Body},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

pub use fingerprint::{BufferedRequest, Fingerprint};
pub use layer::{CacheLayerState, cache_middleware};

use crate::{Error, Result};

/// A response produced by a handler, detached from any connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// `Content-Type` header value, if the handler set one
    pub content_type: Option<HeaderValue>,
    /// Body bytes
    pub body: Bytes,
}

impl CachedResponse {
    /// Build a response from its parts
    pub fn new(status: StatusCode, content_type: Option<HeaderValue>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// Convenience constructor for a JSON body
    pub fn json(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(
            status,
            Some(HeaderValue::from_static("application/json")),
            body,
        )
    }

    /// Whether this response may be stored (no client or server error)
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status.as_u16() < 400
    }

    /// Drain an axum response into memory
    pub async fn from_response(response: Response) -> Result<Self> {
        let (parts, body) = response.into_parts();
        let body = body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| Error::Internal(format!("Failed to buffer response body: {e}")))?;
        Ok(Self {
            status: parts.status,
            content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
            body,
        })
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

/// A cached response with its insertion time
#[derive(Debug)]
struct CacheEntry {
    value: CachedResponse,
    stored_at: Instant,
}

impl CacheEntry {
    /// An entry is readable while its age is within the TTL
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() > ttl
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries dropped because they outlived the TTL
    pub evictions: u64,
    /// Current number of entries (expired ones included until touched)
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

/// Thread-safe TTL cache of handler responses, keyed by request fingerprint
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    ttl: Duration,
    stats: CacheStats,
}

impl ResponseCache {
    /// Create an empty cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    /// Look up a live entry.
    ///
    /// Returns `None` when the key is absent or its entry is older than the
    /// TTL; an expired entry is evicted by this call.
    pub fn get(&self, key: &Fingerprint) -> Option<CachedResponse> {
        let Some(entry) = self.entries.get(key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired(self.ttl) {
            // Release the read guard before taking the write lock
            drop(entry);
            // Re-check under the write lock: a concurrent put may have refreshed it
            if self
                .entries
                .remove_if(key, |_, e| e.is_expired(self.ttl))
                .is_some()
            {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Insert or overwrite an entry, restarting its TTL
    pub fn put(&self, key: Fingerprint, value: CachedResponse) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Return the live entry for `key`, or run `handler` once and return its
    /// result.
    ///
    /// A handler result is stored only when it is `Ok` with a status below
    /// 400. Errors propagate unchanged and nothing is stored for them.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: Fingerprint,
        handler: F,
    ) -> std::result::Result<CachedResponse, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<CachedResponse, E>>,
    {
        if let Some(hit) = self.get(&key) {
            debug!(key = ?key, status = hit.status.as_u16(), "Cache hit");
            return Ok(hit);
        }

        let response = handler().await?;
        if response.is_cacheable() {
            debug!(key = ?key, status = response.status.as_u16(), "Caching response");
            self.put(key, response.clone());
        } else {
            debug!(key = ?key, status = response.status.as_u16(), "Not caching error response");
        }
        Ok(response)
    }

    /// Drop every entry at once
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet touched
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        CacheStatsSnapshot {
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use axum::http::{HeaderMap, Method};

    use super::*;

    fn key(path: &str) -> Fingerprint {
        Fingerprint::compute(&Method::GET, &path.parse().unwrap(), &HeaderMap::new(), b"")
    }

    fn ok(body: &'static str) -> CachedResponse {
        CachedResponse::json(StatusCode::OK, body)
    }

    /// Handler that counts invocations and answers with the next scripted response
    fn scripted(
        calls: &Arc<AtomicUsize>,
        script: Vec<CachedResponse>,
    ) -> impl Fn() -> std::future::Ready<std::result::Result<CachedResponse, Infallible>> {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(script[n.min(script.len() - 1)].clone()))
        }
    }

    #[test]
    fn test_put_then_get() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.put(key("/a"), ok("A"));

        assert_eq!(cache.get(&key("/a")), Some(ok("A")));
        assert_eq!(cache.get(&key("/b")), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_put_overwrites_before_expiry() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.put(key("/a"), ok("old"));
        cache.put(key("/a"), ok("new"));

        assert_eq!(cache.get(&key("/a")), Some(ok("new")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = ResponseCache::new(Duration::from_millis(5));
        cache.put(key("/a"), ok("A"));

        std::thread::sleep(Duration::from_millis(15));

        assert_eq!(cache.get(&key("/a")), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.put(key("/a"), ok("A"));
        cache.put(key("/b"), ok("B"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key("/a")), None);
    }

    #[tokio::test]
    async fn test_hit_skips_handler() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = scripted(&calls, vec![ok("B")]);

        let first = cache.get_or_compute(key("/a"), &handler).await.unwrap();
        let second = cache.get_or_compute(key("/a"), &handler).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.body, "B");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reinvokes_handler() {
        let cache = ResponseCache::new(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = scripted(&calls, vec![ok("first"), ok("second")]);

        let first = cache.get_or_compute(key("/a"), &handler).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = cache.get_or_compute(key("/a"), &handler).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.body, "first");
        assert_eq!(second.body, "second");
    }

    #[tokio::test]
    async fn test_error_responses_are_not_cached() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = scripted(
            &calls,
            vec![
                CachedResponse::json(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#),
                ok("C"),
            ],
        );

        let first = cache.get_or_compute(key("/a"), &handler).await.unwrap();
        let second = cache.get_or_compute(key("/a"), &handler).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(second.body, "C");

        // The success is what sticks
        let third = cache.get_or_compute(key("/a"), &handler).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(third.body, "C");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_cached() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = scripted(&calls, vec![CachedResponse::json(StatusCode::NOT_FOUND, "{}")]);

        cache.get_or_compute(key("/a"), &handler).await.unwrap();
        cache.get_or_compute(key("/a"), &handler).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_handler_errors_propagate_unchanged() {
        let cache = ResponseCache::new(Duration::from_secs(60));

        let result = cache
            .get_or_compute(key("/a"), || async {
                Err::<CachedResponse, _>(Error::UpstreamUnavailable("refused".into()))
            })
            .await;

        assert!(matches!(result, Err(Error::UpstreamUnavailable(ref m)) if m == "refused"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share_entries() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = scripted(&calls, vec![ok("a"), ok("b")]);

        let a = cache.get_or_compute(key("/a"), &handler).await.unwrap();
        let b = cache.get_or_compute(key("/b"), &handler).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(a.body, b.body);
    }

    #[tokio::test]
    async fn test_concurrent_access_keeps_map_consistent() {
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
        let mut tasks = Vec::new();
        for i in 0..32 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                let k = key(&format!("/item/{}", i % 4));
                cache
                    .get_or_compute(k, || async move {
                        tokio::task::yield_now().await;
                        Ok::<_, Infallible>(CachedResponse::json(StatusCode::OK, format!("{}", i % 4)))
                    })
                    .await
                    .unwrap()
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let response = task.await.unwrap();
            assert_eq!(response.body, format!("{}", i % 4));
        }
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_response_round_trip_through_axum() {
        let original = CachedResponse::json(StatusCode::CREATED, r#"{"ok":true}"#);
        let restored = CachedResponse::from_response(original.clone().into_response())
            .await
            .unwrap();
        assert_eq!(restored, original);
    }
}
