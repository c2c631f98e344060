//! Policy tables driving the dispatch layer: which `{quota, window}` pair a
//! request is limited under, which TTL its response is cached with, and
//! which cache patterns a successful write invalidates.
//!
//! Rate policy resolution order: path-prefix override first, then the
//! principal's role, then the conservative anonymous default. Path
//! overrides exist because endpoint classes have different cost and abuse
//! profiles: report generation is expensive and authentication is a
//! brute-force target.

use std::time::Duration;

use crate::types::{RequestDescriptor, Role};

/// A `{quota, window}` pair. Passed per call into the rate-limit store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub quota: u32,
    pub window: Duration,
}

/// Cache handling for a path: store with a TTL, or bypass the cache store
/// entirely. Bypass is distinct from a zero TTL: no key is derived and no
/// store traffic happens at all for live-data endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirective {
    Store(Duration),
    Bypass,
}

/// Immutable policy tables, built once at startup and shared by reference
/// with the middleware. First matching prefix wins in every table.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    path_overrides: Vec<(String, RatePolicy)>,
    admin: RatePolicy,
    staff: RatePolicy,
    user: RatePolicy,
    anonymous: RatePolicy,
    ttl_overrides: Vec<(String, Duration)>,
    default_ttl: Duration,
    no_cache_prefixes: Vec<String>,
    invalidations: Vec<(String, Vec<String>)>,
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// Resolve the `{quota, window}` pair for a request: path override
    /// first, then role, then the anonymous default. A request with no
    /// principal (or one the auth layer failed to attach) lands on the
    /// least-privileged default rather than failing.
    pub fn resolve_rate(&self, descriptor: &RequestDescriptor) -> RatePolicy {
        if let Some((_, policy)) = self
            .path_overrides
            .iter()
            .find(|(prefix, _)| descriptor.path.starts_with(prefix))
        {
            return *policy;
        }
        match descriptor.principal.as_ref().map(|p| p.role) {
            Some(Role::Admin) => self.admin,
            Some(Role::Staff) => self.staff,
            Some(Role::User) => self.user,
            None => self.anonymous,
        }
    }

    /// TTL dispatch for a path. No-cache prefixes win over every TTL entry.
    pub fn cache_directive(&self, path: &str) -> CacheDirective {
        if self
            .no_cache_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return CacheDirective::Bypass;
        }
        let ttl = self
            .ttl_overrides
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map_or(self.default_ttl, |(_, ttl)| *ttl);
        CacheDirective::Store(ttl)
    }

    /// Patterns a successful write to `path` invalidates. Routes with no
    /// declared rule fall back to their resource segment, so cached views
    /// of an undeclared entity family still drop after a mutation.
    pub fn invalidation_patterns(&self, path: &str) -> Vec<String> {
        if let Some((_, patterns)) = self
            .invalidations
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
        {
            return patterns.clone();
        }
        resource_segment(path)
            .map(|segment| vec![segment.to_string()])
            .unwrap_or_default()
    }
}

/// The entity-family segment of an API path: `/api/tickets/42` yields `tickets`.
fn resource_segment(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match segments.next() {
        Some("api") => segments.next(),
        first => first,
    }
}

/// Builder for [`PolicyTable`], with the standard endpoint classes wired in
/// as defaults. Every table can be extended or replaced.
pub struct PolicyTableBuilder {
    table: PolicyTable,
}

impl Default for PolicyTableBuilder {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        PolicyTableBuilder {
            table: PolicyTable {
                path_overrides: Vec::new(),
                admin: RatePolicy {
                    quota: 1000,
                    window: minute,
                },
                staff: RatePolicy {
                    quota: 500,
                    window: minute,
                },
                user: RatePolicy {
                    quota: 200,
                    window: minute,
                },
                anonymous: RatePolicy {
                    quota: 60,
                    window: minute,
                },
                ttl_overrides: Vec::new(),
                default_ttl: minute,
                no_cache_prefixes: Vec::new(),
                invalidations: Vec::new(),
            },
        }
    }
}

impl PolicyTableBuilder {
    /// Dedicated `{quota, window}` for a path prefix, taking precedence
    /// over every role policy.
    pub fn path_override(mut self, prefix: impl Into<String>, policy: RatePolicy) -> Self {
        self.table.path_overrides.push((prefix.into(), policy));
        self
    }

    pub fn role_policy(mut self, role: Role, policy: RatePolicy) -> Self {
        match role {
            Role::Admin => self.table.admin = policy,
            Role::Staff => self.table.staff = policy,
            Role::User => self.table.user = policy,
        }
        self
    }

    pub fn anonymous_policy(mut self, policy: RatePolicy) -> Self {
        self.table.anonymous = policy;
        self
    }

    pub fn ttl_override(mut self, prefix: impl Into<String>, ttl: Duration) -> Self {
        self.table.ttl_overrides.push((prefix.into(), ttl));
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.table.default_ttl = ttl;
        self
    }

    /// Paths that bypass the cache store entirely (live/real-time data).
    pub fn no_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table.no_cache_prefixes.push(prefix.into());
        self
    }

    /// Declare the cache patterns a successful write under `prefix`
    /// invalidates.
    pub fn invalidation(
        mut self,
        prefix: impl Into<String>,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.table
            .invalidations
            .push((prefix.into(), patterns.into_iter().map(Into::into).collect()));
        self
    }

    pub fn build(self) -> PolicyTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Principal;
    use axum::http::Method;

    fn request(path: &str, principal: Option<Principal>) -> RequestDescriptor {
        RequestDescriptor {
            method: Method::GET,
            path: path.to_string(),
            query: None,
            principal,
            client_addr: "192.0.2.1".to_string(),
        }
    }

    fn with_role(role: Role) -> Option<Principal> {
        Some(Principal {
            id: "p1".to_string(),
            role,
        })
    }

    fn table() -> PolicyTable {
        PolicyTable::builder()
            .path_override(
                "/api/reports",
                RatePolicy {
                    quota: 10,
                    window: Duration::from_secs(600),
                },
            )
            .ttl_override("/api/dashboard", Duration::from_secs(300))
            .no_cache_prefix("/api/live")
            .invalidation("/api/tickets", ["tickets", "dashboard"])
            .build()
    }

    #[test]
    fn path_override_beats_role() {
        let table = table();
        // even an admin is limited by the reports class on report paths
        let policy = table.resolve_rate(&request("/api/reports/export", with_role(Role::Admin)));
        assert_eq!(policy.quota, 10);
        assert_eq!(policy.window, Duration::from_secs(600));
    }

    #[test]
    fn roles_escalate_quota() {
        let table = table();
        let admin = table.resolve_rate(&request("/api/tickets", with_role(Role::Admin)));
        let staff = table.resolve_rate(&request("/api/tickets", with_role(Role::Staff)));
        let user = table.resolve_rate(&request("/api/tickets", with_role(Role::User)));
        assert!(admin.quota > staff.quota);
        assert!(staff.quota > user.quota);
    }

    #[test]
    fn unauthenticated_falls_back_to_conservative_default() {
        let table = table();
        let anon = table.resolve_rate(&request("/api/tickets", None));
        let user = table.resolve_rate(&request("/api/tickets", with_role(Role::User)));
        assert!(anon.quota < user.quota);
    }

    #[test]
    fn ttl_dispatch_per_prefix() {
        let table = table();
        assert_eq!(
            table.cache_directive("/api/dashboard/summary"),
            CacheDirective::Store(Duration::from_secs(300))
        );
        assert_eq!(
            table.cache_directive("/api/tickets"),
            CacheDirective::Store(Duration::from_secs(60))
        );
    }

    #[test]
    fn live_paths_bypass_the_cache_entirely() {
        let table = table();
        assert_eq!(table.cache_directive("/api/live/feed"), CacheDirective::Bypass);
    }

    #[test]
    fn declared_invalidation_patterns_win() {
        let table = table();
        assert_eq!(
            table.invalidation_patterns("/api/tickets/42"),
            vec!["tickets".to_string(), "dashboard".to_string()]
        );
    }

    #[test]
    fn undeclared_writes_invalidate_their_resource_segment() {
        let table = table();
        assert_eq!(
            table.invalidation_patterns("/api/widgets/7"),
            vec!["widgets".to_string()]
        );
        assert_eq!(table.invalidation_patterns("/"), Vec::<String>::new());
    }
}
