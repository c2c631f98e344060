//! # Gatewarden
//!
//! In-process request governance for axum services: a sliding-window rate
//! limiter and a TTL response cache, composed into the request pipeline by
//! a policy-dispatch middleware.
//!
//! Both stores live in server-process memory and are owned by a single
//! governor task; every request reaches them through a clonable handle, so
//! store access is serialized in arrival order without locks. Policies are
//! resolved per request: dedicated `{quota, window}` pairs for expensive or
//! abuse-prone path classes, role-based quotas for everything else, and a
//! conservative default for unauthenticated traffic.
//!
//! ## Quick Start
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use gatewarden::{Governance, GovernorConfig, PolicyTable, govern};
//!
//! let governance = Governance::new(PolicyTable::builder().build(), GovernorConfig::default());
//!
//! let app: Router = Router::new()
//!     .route("/api/dashboard/summary", get(summary))
//!     .layer(from_fn_with_state(governance.clone(), govern));
//!
//! // ... serve, then stop the governor and its sweep timer:
//! // governance.shutdown().await;
//! ```
//!
//! Admission is checked first: denied requests are answered immediately
//! with 429, `X-RateLimit-*` headers, and the standard error envelope.
//! Admitted GET requests may be served straight from the cache; successful
//! writes cascade-invalidate the cached views of their entity family.
//!
//! The stores are per-process. Behind a load balancer each instance counts
//! and caches independently. That is acceptable for the deployments this crate
//! targets, and the [`GovernorHandle`] seam is where a shared backend
//! would be substituted.

pub mod actor;
pub mod config;
pub mod core;
pub mod metrics;
pub mod middleware;
pub mod policy;
pub mod types;


pub use actor::{Governor, GovernorConfig, GovernorError, GovernorHandle, StoreStats};
pub use config::Config;
pub use core::{RateLimitDecision, RateLimitStore, ResponseCache};
pub use metrics::Metrics;
pub use middleware::{Governance, govern};
pub use policy::{CacheDirective, PolicyTable, RatePolicy};
pub use types::{CachedResponse, Principal, RequestDescriptor, Role};
