use super::RateLimitStore;
use std::time::{Duration, SystemTime};

const WINDOW: Duration = Duration::from_millis(1000);

#[test]
fn first_request_is_allowed() {
    let mut store = RateLimitStore::new();

    let now = SystemTime::now();
    let decision = store.is_allowed("u1", 5, WINDOW, now);
    assert!(decision.allowed);
    assert_eq!(decision.limit, 5);
    assert_eq!(decision.remaining, 4);
    assert_eq!(decision.reset_at, now + WINDOW);
}

#[test]
fn quota_exhausts_then_window_slides_back() {
    let mut store = RateLimitStore::new();
    let now = SystemTime::now();

    // 5 instant requests: remaining counts down 4, 3, 2, 1, 0
    for i in 0..5u32 {
        let decision = store.is_allowed("u1", 5, WINDOW, now);
        assert!(decision.allowed, "request {} should be allowed", i + 1);
        assert_eq!(decision.remaining, 4 - i);
    }

    // 6th immediately after: denied with nothing remaining
    let denied = store.is_allowed("u1", 5, WINDOW, now);
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.reset_at, now + WINDOW);

    // after the full window the log is empty again
    let later = now + WINDOW + Duration::from_millis(1);
    let decision = store.is_allowed("u1", 5, WINDOW, later);
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 4);
}

#[test]
fn window_slides_continuously_not_in_buckets() {
    let mut store = RateLimitStore::new();
    let t0 = SystemTime::now();

    assert!(store.is_allowed("u1", 2, WINDOW, t0).allowed);
    assert!(
        store
            .is_allowed("u1", 2, WINDOW, t0 + Duration::from_millis(600))
            .allowed
    );

    // at t0+900 both earlier requests are still inside the trailing second
    let denied = store.is_allowed("u1", 2, WINDOW, t0 + Duration::from_millis(900));
    assert!(!denied.allowed);
    // the oldest request frees its slot one window after it arrived
    assert_eq!(denied.reset_at, t0 + WINDOW);

    // at t0+1100 the t0 request has slid out; one slot is free again
    let decision = store.is_allowed("u1", 2, WINDOW, t0 + Duration::from_millis(1100));
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 0);
}

#[test]
fn timestamp_on_window_boundary_has_expired() {
    let mut store = RateLimitStore::new();
    let t0 = SystemTime::now();

    assert!(store.is_allowed("u1", 1, WINDOW, t0).allowed);
    // exactly one window later the original request no longer counts
    let decision = store.is_allowed("u1", 1, WINDOW, t0 + WINDOW);
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 0);
}

#[test]
fn denied_requests_do_not_consume_quota() {
    let mut store = RateLimitStore::new();
    let t0 = SystemTime::now();

    assert!(store.is_allowed("u1", 1, WINDOW, t0).allowed);
    for i in 1..10 {
        let denied = store.is_allowed("u1", 1, WINDOW, t0 + Duration::from_millis(i * 50));
        assert!(!denied.allowed);
    }

    // only the single admitted request occupies the log, so one window
    // after t0 the key recovers even though denials kept arriving
    let decision = store.is_allowed("u1", 1, WINDOW, t0 + WINDOW + Duration::from_millis(1));
    assert!(decision.allowed);
}

#[test]
fn deny_reset_matches_remaining_window_of_oldest() {
    let mut store = RateLimitStore::new();
    let t0 = SystemTime::now();

    store.is_allowed("u1", 2, WINDOW, t0);
    store.is_allowed("u1", 2, WINDOW, t0 + Duration::from_millis(400));

    let now = t0 + Duration::from_millis(700);
    let denied = store.is_allowed("u1", 2, WINDOW, now);
    assert!(!denied.allowed);
    let wait = denied.reset_at.duration_since(now).unwrap();
    assert_eq!(wait, Duration::from_millis(300));
}

#[test]
fn keys_are_limited_independently() {
    let mut store = RateLimitStore::new();
    let now = SystemTime::now();

    assert!(store.is_allowed("u1", 1, WINDOW, now).allowed);
    assert!(!store.is_allowed("u1", 1, WINDOW, now).allowed);
    assert!(store.is_allowed("u2", 1, WINDOW, now).allowed);
}

#[test]
fn quota_and_window_vary_per_call() {
    let mut store = RateLimitStore::new();
    let now = SystemTime::now();

    // the same key can be checked under different policies without the
    // store being reconfigured
    let report = store.is_allowed("u1", 2, Duration::from_secs(600), now);
    assert_eq!(report.limit, 2);
    let default = store.is_allowed("u1", 100, Duration::from_secs(60), now);
    assert_eq!(default.limit, 100);
}

#[test]
fn zero_quota_always_denies() {
    let mut store = RateLimitStore::new();
    let now = SystemTime::now();

    let denied = store.is_allowed("u1", 0, WINDOW, now);
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
}

#[test]
fn reset_clears_a_single_key() {
    let mut store = RateLimitStore::new();
    let now = SystemTime::now();

    store.is_allowed("u1", 1, WINDOW, now);
    assert!(!store.is_allowed("u1", 1, WINDOW, now).allowed);

    assert!(store.reset("u1"));
    assert!(!store.reset("u1"));
    assert!(store.is_allowed("u1", 1, WINDOW, now).allowed);
}

#[test]
fn sweep_evicts_only_idle_keys() {
    let mut store = RateLimitStore::new();
    let t0 = SystemTime::now();
    let horizon = Duration::from_secs(3600);

    store.is_allowed("idle", 10, WINDOW, t0);
    store.is_allowed("fresh", 10, WINDOW, t0 + Duration::from_secs(3599));
    assert_eq!(store.len(), 2);

    let evicted = store.sweep(horizon, t0 + Duration::from_secs(3601));
    assert_eq!(evicted, 1);
    assert_eq!(store.len(), 1);

    // the swept key is simply re-created on its next request
    let decision = store.is_allowed("idle", 10, WINDOW, t0 + Duration::from_secs(3601));
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 9);
}

#[test]
fn sweep_horizon_is_independent_of_window_size() {
    let mut store = RateLimitStore::new();
    let t0 = SystemTime::now();

    // a key checked under a very long window still goes stale on the
    // fixed horizon, not on its window
    store.is_allowed("report-user", 5, Duration::from_secs(86_400), t0);
    let evicted = store.sweep(Duration::from_secs(3600), t0 + Duration::from_secs(3601));
    assert_eq!(evicted, 1);
    assert!(store.is_empty());
}
