//! Pure key derivation: maps a request descriptor to the identity a request
//! is limited under and the identity its response is cached under.

use crate::types::RequestDescriptor;

/// Rate-limit key: the authenticated principal id when present, otherwise
/// the client network address. Principals are preferred so a user behind a
/// shared NAT is not punished for their neighbors.
pub fn rate_limit_key(descriptor: &RequestDescriptor) -> String {
    match &descriptor.principal {
        Some(principal) => principal.id.clone(),
        None => descriptor.client_addr.clone(),
    }
}

/// Cache key: principal (or `anonymous`) + path + canonicalized query.
///
/// Two logically identical requests from the same principal collide on the
/// same entry regardless of query-parameter insertion order.
pub fn cache_key(descriptor: &RequestDescriptor) -> String {
    let who = descriptor
        .principal
        .as_ref()
        .map_or("anonymous", |p| p.id.as_str());
    match descriptor.query.as_deref() {
        Some(query) if !query.is_empty() => {
            format!("{who}:{}?{}", descriptor.path, canonical_query(query))
        }
        _ => format!("{who}:{}", descriptor.path),
    }
}

/// Re-serialize a raw query string with its pairs sorted by key, then value.
/// Bare flags (`?verbose`) serialize as `verbose=`.
pub fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    pairs.sort_unstable();
    let mut out = String::with_capacity(query.len());
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Principal, Role};
    use axum::http::Method;

    fn descriptor(query: Option<&str>, principal: Option<Principal>) -> RequestDescriptor {
        RequestDescriptor {
            method: Method::GET,
            path: "/api/dashboard".to_string(),
            query: query.map(str::to_string),
            principal,
            client_addr: "192.0.2.7".to_string(),
        }
    }

    fn user(id: &str) -> Principal {
        Principal {
            id: id.to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn rate_key_prefers_principal_over_address() {
        assert_eq!(rate_limit_key(&descriptor(None, Some(user("u1")))), "u1");
        assert_eq!(rate_limit_key(&descriptor(None, None)), "192.0.2.7");
    }

    #[test]
    fn cache_key_is_stable_under_query_reordering() {
        let a = descriptor(Some("x=1&y=2"), Some(user("u1")));
        let b = descriptor(Some("y=2&x=1"), Some(user("u1")));
        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a), "u1:/api/dashboard?x=1&y=2");
    }

    #[test]
    fn cache_key_separates_principals() {
        let a = descriptor(Some("x=1"), Some(user("u1")));
        let b = descriptor(Some("x=1"), Some(user("u2")));
        let anon = descriptor(Some("x=1"), None);
        assert_ne!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&anon), "anonymous:/api/dashboard?x=1");
    }

    #[test]
    fn empty_query_matches_absent_query() {
        assert_eq!(
            cache_key(&descriptor(Some(""), None)),
            cache_key(&descriptor(None, None))
        );
    }

    #[test]
    fn canonical_query_handles_flags_and_duplicates() {
        assert_eq!(canonical_query("b=2&a=1"), "a=1&b=2");
        assert_eq!(canonical_query("verbose&a=1"), "a=1&verbose=");
        // duplicate keys keep both values, ordered by value
        assert_eq!(canonical_query("t=2&t=1"), "t=1&t=2");
    }
}
