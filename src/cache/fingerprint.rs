//! Request fingerprinting
//!
//! A [`Fingerprint`] is the SHA-256 digest of everything that can change the
//! answer to a request: method, full URI (path and query), the canonical
//! header list and the raw body. Every field is length-prefixed before it is
//! hashed so bytes cannot migrate across a field boundary and collide.
//!
//! Hop-by-hop headers and `content-length` are left out; they describe the
//! connection, not the request. So are correlation headers (`date`,
//! `user-agent`, `x-request-id`, `traceparent` and friends) that a client
//! stamps differently on every call. Everything else is folded in, which
//! keeps `authorization` and `x-youhedge-token` load-bearing: two callers
//! asking for the same path with different tokens never share an entry.

use std::error::Error as StdError;
use std::fmt;

use axum::{
    body::{self, Body},
    http::{HeaderMap, Method, Request, Uri, request::Parts},
};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Headers that never take part in a fingerprint
pub const EXCLUDED_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    // Correlation
    "date",
    "traceparent",
    "tracestate",
    "user-agent",
    "x-correlation-id",
    "x-request-id",
];

/// Deterministic cache key for an inbound request
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a request from its individual parts
    #[must_use]
    pub fn compute(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Self {
        let mut hasher = Sha256::new();

        update_field(&mut hasher, method.as_str().as_bytes());
        update_field(&mut hasher, uri.to_string().as_bytes());

        let canonical = canonical_headers(headers);
        hasher.update((canonical.len() as u64).to_le_bytes());
        for (name, value) in &canonical {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, value);
        }

        update_field(&mut hasher, body);

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        Self(out)
    }

    /// Lowercase hex rendering of the digest
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Header list in canonical order: lowercase names, sorted, transport
/// and correlation headers removed. Values of a repeated header keep their
/// arrival order.
fn canonical_headers(headers: &HeaderMap) -> Vec<(&str, &[u8])> {
    let mut canonical: Vec<(&str, &[u8])> = headers
        .iter()
        .filter(|(name, _)| !EXCLUDED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| (name.as_str(), value.as_bytes()))
        .collect();
    // Stable sort keeps the relative order of repeated values
    canonical.sort_by(|a, b| a.0.cmp(b.0));
    canonical
}

fn exceeds_limit(error: &(dyn StdError + 'static)) -> bool {
    std::iter::successors(Some(error), |e| (*e).source()).any(|e| e.is::<LengthLimitError>())
}

/// An inbound request whose body has been read into memory once.
///
/// The body is held as [`Bytes`], so [`body`](Self::body) can be read any
/// number of times and [`into_request`](Self::into_request) hands the wrapped
/// handler an identical copy.
#[derive(Debug)]
pub struct BufferedRequest {
    parts: Parts,
    body: Bytes,
}

impl BufferedRequest {
    /// Drain the request body (up to `limit` bytes) into memory
    ///
    /// A body over `limit` is [`Error::BodyTooLarge`]; any other read
    /// failure, such as the client hanging up mid-body, is
    /// [`Error::BadRequest`].
    pub async fn from_request(request: Request<Body>, limit: usize) -> Result<Self> {
        let (parts, body) = request.into_parts();
        let body = body::to_bytes(body, limit).await.map_err(|e| {
            let cause = e.into_inner();
            if exceeds_limit(cause.as_ref()) {
                Error::BodyTooLarge(limit)
            } else {
                Error::BadRequest(format!("unreadable request body: {cause}"))
            }
        })?;
        Ok(Self { parts, body })
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Full request URI, including the query string
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Materialized body bytes
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Cache key for this request
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self.method(), self.uri(), self.headers(), &self.body)
    }

    /// Rebuild a request carrying the same parts and a fresh copy of the body
    #[must_use]
    pub fn into_request(self) -> Request<Body> {
        Request::from_parts(self.parts, Body::from(self.body))
    }
}
