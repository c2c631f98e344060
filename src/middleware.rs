//! The policy-dispatch middleware composing both stores into the request
//! pipeline.
//!
//! Per request: derive keys, resolve the rate policy, consult the governor.
//! Denied requests are answered immediately with 429, quota headers, and
//! the standard error envelope. Admitted GET requests consult the response
//! cache and replay hits verbatim; misses forward to the wrapped handler,
//! whose `(status, body)` is intercepted on the way out and stored when it
//! is a successful envelope. Admitted writes forward directly and, on
//! success, cascade-invalidate the cache patterns their route family
//! declares.
//!
//! Every governance failure degrades rather than failing the request: an
//! unreachable governor lets it through ungoverned, and an unparsable body
//! is simply not cached. Only the rate-limit denial itself is ever
//! surfaced to a client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use uuid::Uuid;

use crate::actor::{Governor, GovernorConfig, GovernorHandle};
use crate::core::RateLimitDecision;
use crate::core::keys;
use crate::metrics::Metrics;
use crate::policy::{CacheDirective, PolicyTable};
use crate::types::{CachedResponse, ErrorEnvelope, Principal, RequestDescriptor, iso8601};

/// Shared governance services, constructed once at process start and
/// injected into the middleware by reference (no global state).
#[derive(Clone)]
pub struct Governance {
    pub governor: GovernorHandle,
    pub policy: Arc<PolicyTable>,
    pub metrics: Arc<Metrics>,
}

impl Governance {
    /// Spawn a governor and bundle it with the policy tables and metrics.
    pub fn new(policy: PolicyTable, config: GovernorConfig) -> Self {
        let metrics = Arc::new(Metrics::new());
        let governor = Governor::spawn(config, Arc::clone(&metrics));
        Governance {
            governor,
            policy: Arc::new(policy),
            metrics,
        }
    }

    /// Stop the governor task and its sweep timer.
    pub async fn shutdown(&self) {
        self.governor.shutdown().await;
    }
}

/// Governance middleware; attach with
/// `axum::middleware::from_fn_with_state(governance, govern)`.
pub async fn govern(State(gov): State<Governance>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let descriptor = describe(&req);
    let request_id = request_id(&req);

    let policy = gov.policy.resolve_rate(&descriptor);
    let rate_key = keys::rate_limit_key(&descriptor);

    let decision = match gov
        .governor
        .check(rate_key, policy.quota, policy.window)
        .await
    {
        Ok(decision) => Some(decision),
        Err(err) => {
            tracing::error!(%err, path = %descriptor.path, "admission check unavailable, request proceeds ungoverned");
            None
        }
    };

    if let Some(decision) = decision {
        if !decision.allowed {
            tracing::debug!(path = %descriptor.path, "request denied by rate limiter");
            gov.metrics
                .record_request(started.elapsed().as_micros() as u64, false);
            return rate_limited_response(&decision, request_id);
        }
    }

    // Cache consult: reads only, and only for paths the TTL table does not
    // mark as live data.
    let directive = if descriptor.is_cacheable_read() {
        gov.policy.cache_directive(&descriptor.path)
    } else {
        CacheDirective::Bypass
    };

    let cache_key = match directive {
        CacheDirective::Store(_) => Some(keys::cache_key(&descriptor)),
        CacheDirective::Bypass => None,
    };

    if let Some(key) = &cache_key {
        match gov.governor.cache_get(key.clone()).await {
            Ok(Some(cached)) => {
                gov.metrics.record_cache_hit();
                let mut response = replay(cached);
                response
                    .headers_mut()
                    .insert("x-cache", HeaderValue::from_static("HIT"));
                apply_rate_headers(&mut response, decision.as_ref());
                gov.metrics
                    .record_request(started.elapsed().as_micros() as u64, true);
                return response;
            }
            Ok(None) => gov.metrics.record_cache_miss(),
            Err(err) => {
                // degraded cache is a miss, never an error
                tracing::warn!(%err, "cache lookup unavailable");
                gov.metrics.record_cache_miss();
            }
        }
    }

    let mut response = next.run(req).await;

    if let (Some(key), CacheDirective::Store(ttl)) = (cache_key, directive) {
        response = intercept_and_store(response, key, ttl, &gov).await;
    } else if descriptor.is_write() && response.status().is_success() {
        invalidate_for_write(&gov, &descriptor).await;
    }

    apply_rate_headers(&mut response, decision.as_ref());
    gov.metrics
        .record_request(started.elapsed().as_micros() as u64, true);
    response
}

/// Read the request descriptor off the inbound request. The principal is
/// whatever the external auth layer attached; the client address comes from
/// the connect-info extension when the server was built with it.
fn describe(req: &Request) -> RequestDescriptor {
    let principal = req.extensions().get::<Principal>().cloned();
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string());

    RequestDescriptor {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
        query: req.uri().query().map(str::to_string),
        principal,
        client_addr,
    }
}

fn request_id(req: &Request) -> String {
    req.headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

/// Build the 429 answer: quota headers plus the standard error envelope.
fn rate_limited_response(decision: &RateLimitDecision, request_id: String) -> Response {
    let retry_after = retry_after_secs(decision.reset_at, SystemTime::now());
    let envelope = ErrorEnvelope::rate_limited(
        "Too many requests, please retry later",
        retry_after,
        request_id,
    );

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(envelope)).into_response();
    apply_rate_headers_inner(&mut response, decision);
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// Seconds until `reset_at`, rounded up so a client that waits exactly this
/// long is past the window.
fn retry_after_secs(reset_at: SystemTime, now: SystemTime) -> u64 {
    match reset_at.duration_since(now) {
        Ok(wait) if wait.subsec_nanos() > 0 => wait.as_secs() + 1,
        Ok(wait) => wait.as_secs(),
        Err(_) => 0,
    }
}

fn apply_rate_headers(response: &mut Response, decision: Option<&RateLimitDecision>) {
    if let Some(decision) = decision {
        apply_rate_headers_inner(response, decision);
    }
}

fn apply_rate_headers_inner(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&iso8601(decision.reset_at)) {
        headers.insert("x-ratelimit-reset", value);
    }
}

/// Rebuild a response from a stored value. The envelope is replayed
/// verbatim; only the cache-origin header is new.
fn replay(cached: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;
    if let Some(content_type) = cached.content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}

/// Buffer a cacheable response and store it when it is a successful
/// envelope: 2xx status and a JSON body carrying `"success": true`. Error
/// payloads, non-2xx statuses, and unparsable bodies are never cached.
async fn intercept_and_store(
    response: Response,
    key: String,
    ttl: Duration,
    gov: &Governance,
) -> Response {
    let status = response.status();
    if !status.is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // the stream already failed towards the client; nothing to cache
            tracing::warn!(%err, "failed to buffer response body, skipping cache");
            return Response::from_parts(parts, Body::empty());
        }
    };

    if is_success_envelope(&bytes) {
        let cached = CachedResponse {
            status,
            content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
            body: bytes.clone(),
        };
        match gov.governor.cache_store(key, cached, ttl).await {
            Ok(()) => gov.metrics.record_cache_store(),
            Err(err) => tracing::warn!(%err, "cache population unavailable"),
        }
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static("MISS"));
    response
}

async fn invalidate_for_write(gov: &Governance, descriptor: &RequestDescriptor) {
    let patterns = gov.policy.invalidation_patterns(&descriptor.path);
    if patterns.is_empty() {
        return;
    }
    match gov.governor.invalidate(patterns.clone()).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::debug!(
                    path = %descriptor.path,
                    ?patterns,
                    removed,
                    "invalidated cached views after write"
                );
                gov.metrics.record_invalidations(removed as u64);
            }
        }
        Err(err) => tracing::warn!(%err, "cache invalidation unavailable"),
    }
}

fn is_success_envelope(bytes: &[u8]) -> bool {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => value
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        Err(_) => false,
    }
}
