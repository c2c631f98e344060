//! Common types shared between the governance middleware, the governor
//! actor, and the policy layer.

use axum::http::{HeaderValue, Method, StatusCode};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Role attached to an authenticated principal by the external auth layer.
///
/// Administrative roles receive the largest rate allowance; plain users the
/// smallest authenticated one. Requests with no principal at all fall back
/// to the anonymous default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    User,
}

/// Authenticated identity of a request.
///
/// The auth collaborator verifies the token and inserts a `Principal` into
/// the request extensions before the governance middleware runs; the
/// governance layer only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

/// Everything the governance layer reads from an inbound request to compute
/// keys and resolve policies.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub principal: Option<Principal>,
    pub client_addr: String,
}

impl RequestDescriptor {
    /// Read requests may consult the cache; only GET responses are cached
    /// because the cache key carries no method component.
    pub fn is_cacheable_read(&self) -> bool {
        self.method == Method::GET
    }

    /// Writes that complete successfully trigger pattern invalidation.
    pub fn is_write(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

/// A completed response retained for replay: status, content type, and the
/// buffered body. Cloned out of the store on every hit.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Wire format of a denied request, mirrored by every governed endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

impl ErrorEnvelope {
    pub fn rate_limited(message: impl Into<String>, retry_after: u64, request_id: String) -> Self {
        ErrorEnvelope {
            success: false,
            error: ErrorDetail {
                code: "RATE_LIMIT_EXCEEDED".to_string(),
                message: message.into(),
                retry_after,
            },
            meta: ResponseMeta {
                timestamp: iso8601(SystemTime::now()),
                request_id,
            },
        }
    }
}

/// ISO-8601 rendering used for the reset header and envelope timestamps.
pub fn iso8601(at: SystemTime) -> String {
    chrono::DateTime::<Utc>::from(at).to_rfc3339_opts(SecondsFormat::Secs, true)
}
