use super::ResponseCache;
use std::time::{Duration, SystemTime};

const TTL: Duration = Duration::from_secs(300);

fn cache() -> ResponseCache<String> {
    ResponseCache::new()
}

#[test]
fn stores_and_returns_values_within_ttl() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("u1:/api/dashboard".to_string(), "payload".to_string(), TTL, now);
    assert_eq!(
        cache.get("u1:/api/dashboard", now + Duration::from_secs(299)),
        Some("payload".to_string())
    );
}

#[test]
fn expired_entries_are_absent_and_lazily_evicted() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("k".to_string(), "v".to_string(), TTL, now);
    assert_eq!(cache.len(), 1);

    // unreachable after the TTL elapses, with no explicit delete
    assert_eq!(cache.get("k", now + TTL), None);
    // the expired read removed the entry
    assert_eq!(cache.len(), 0);
}

#[test]
fn set_overwrites_unconditionally() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("k".to_string(), "old".to_string(), TTL, now);
    cache.set("k".to_string(), "new".to_string(), TTL, now + Duration::from_secs(1));
    assert_eq!(cache.get("k", now + Duration::from_secs(2)), Some("new".to_string()));
    assert_eq!(cache.len(), 1);
}

#[test]
fn repopulating_refreshes_expiry() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("k".to_string(), "v1".to_string(), TTL, now);
    cache.set("k".to_string(), "v2".to_string(), TTL, now + Duration::from_secs(200));

    // past the first expiry, inside the second
    assert_eq!(
        cache.get("k", now + Duration::from_secs(400)),
        Some("v2".to_string())
    );
}

#[test]
fn delete_and_clear() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("a".to_string(), "1".to_string(), TTL, now);
    cache.set("b".to_string(), "2".to_string(), TTL, now);

    assert!(cache.delete("a"));
    assert!(!cache.delete("a"));
    assert_eq!(cache.get("a", now), None);
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.get("b", now), None);
}

#[test]
fn invalidate_matching_removes_by_substring() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("u1:/api/tickets".to_string(), "a".to_string(), TTL, now);
    cache.set("u2:/api/tickets?page=2".to_string(), "b".to_string(), TTL, now);
    cache.set("u1:/api/dashboard".to_string(), "c".to_string(), TTL, now);

    let removed = cache.invalidate_matching("tickets");
    assert_eq!(removed, 2);
    assert_eq!(cache.get("u1:/api/tickets", now), None);
    assert_eq!(cache.get("u2:/api/tickets?page=2", now), None);
    assert_eq!(cache.get("u1:/api/dashboard", now), Some("c".to_string()));
}

#[test]
fn invalidate_matching_with_no_matches_is_a_noop() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("u1:/api/dashboard".to_string(), "c".to_string(), TTL, now);
    assert_eq!(cache.invalidate_matching("tickets"), 0);
    assert_eq!(cache.len(), 1);
}

#[test]
fn get_returns_clones_not_references() {
    let mut cache = cache();
    let now = SystemTime::now();

    cache.set("k".to_string(), "v".to_string(), TTL, now);
    let mut first = cache.get("k", now).unwrap();
    first.push_str("-mutated");

    // mutating the returned value never touches the stored one
    assert_eq!(cache.get("k", now), Some("v".to_string()));
}
