//! Lightweight metrics for the governance layer: atomic counters, latency
//! buckets, and a hand-rendered Prometheus text exposition. No allocations
//! in the hot path.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Counters collected across the governed request path.
pub struct Metrics {
    start_time: Instant,

    pub total_requests: AtomicU64,
    pub requests_allowed: AtomicU64,
    pub requests_denied: AtomicU64,

    /// Cache decisions (counted for cacheable reads only)
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_stores: AtomicU64,
    pub cache_invalidations: AtomicU64,

    /// Rate-limit keys evicted by the periodic sweep
    pub sweep_evictions: AtomicU64,

    /// Store sizes, refreshed by the governor
    pub rate_keys: AtomicUsize,
    pub cache_entries: AtomicUsize,

    /// Request latency buckets (in microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_under_1s: AtomicU64,
    pub latency_over_1s: AtomicU64,
    pub latency_sum_micros: AtomicU64,
    pub latency_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            requests_allowed: AtomicU64::new(0),
            requests_denied: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_stores: AtomicU64::new(0),
            cache_invalidations: AtomicU64::new(0),
            sweep_evictions: AtomicU64::new(0),
            rate_keys: AtomicUsize::new(0),
            cache_entries: AtomicUsize::new(0),
            latency_under_1ms: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_under_1s: AtomicU64::new(0),
            latency_over_1s: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }

    /// Record a governed request and its end-to-end latency.
    pub fn record_request(&self, latency_us: u64, allowed: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if allowed {
            self.requests_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_denied.fetch_add(1, Ordering::Relaxed);
        }

        match latency_us {
            0..=999 => self.latency_under_1ms.fetch_add(1, Ordering::Relaxed),
            1000..=9999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10000..=99999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            100000..=999999 => self.latency_under_1s.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_1s.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_store(&self) {
        self.cache_stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: u64) {
        self.cache_invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sweep_evictions(&self, count: u64) {
        self.sweep_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn update_store_sizes(&self, rate_keys: usize, cache_entries: usize) {
        self.rate_keys.store(rate_keys, Ordering::Relaxed);
        self.cache_entries.store(cache_entries, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        output.push_str("# HELP gatewarden_uptime_seconds Time since process start in seconds\n");
        output.push_str("# TYPE gatewarden_uptime_seconds gauge\n");
        output.push_str(&format!(
            "gatewarden_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        output.push_str("# HELP gatewarden_requests_total Total governed requests\n");
        output.push_str("# TYPE gatewarden_requests_total counter\n");
        output.push_str(&format!(
            "gatewarden_requests_total {}\n\n",
            self.total_requests.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_requests_allowed Requests admitted by the rate limiter\n");
        output.push_str("# TYPE gatewarden_requests_allowed counter\n");
        output.push_str(&format!(
            "gatewarden_requests_allowed {}\n\n",
            self.requests_allowed.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_requests_denied Requests rejected with 429\n");
        output.push_str("# TYPE gatewarden_requests_denied counter\n");
        output.push_str(&format!(
            "gatewarden_requests_denied {}\n\n",
            self.requests_denied.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_cache_events Cache decisions by kind\n");
        output.push_str("# TYPE gatewarden_cache_events counter\n");
        output.push_str(&format!(
            "gatewarden_cache_events{{kind=\"hit\"}} {}\n",
            self.cache_hits.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "gatewarden_cache_events{{kind=\"miss\"}} {}\n",
            self.cache_misses.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "gatewarden_cache_events{{kind=\"store\"}} {}\n",
            self.cache_stores.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "gatewarden_cache_events{{kind=\"invalidation\"}} {}\n\n",
            self.cache_invalidations.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_sweep_evictions Rate-limit keys evicted by the sweep\n");
        output.push_str("# TYPE gatewarden_sweep_evictions counter\n");
        output.push_str(&format!(
            "gatewarden_sweep_evictions {}\n\n",
            self.sweep_evictions.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_rate_keys Rate-limit keys currently tracked\n");
        output.push_str("# TYPE gatewarden_rate_keys gauge\n");
        output.push_str(&format!(
            "gatewarden_rate_keys {}\n\n",
            self.rate_keys.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_cache_entries Cached responses currently stored\n");
        output.push_str("# TYPE gatewarden_cache_entries gauge\n");
        output.push_str(&format!(
            "gatewarden_cache_entries {}\n\n",
            self.cache_entries.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP gatewarden_request_duration_bucket Request latency distribution\n");
        output.push_str("# TYPE gatewarden_request_duration_bucket histogram\n");
        let under_1ms = self.latency_under_1ms.load(Ordering::Relaxed);
        let under_10ms = under_1ms + self.latency_under_10ms.load(Ordering::Relaxed);
        let under_100ms = under_10ms + self.latency_under_100ms.load(Ordering::Relaxed);
        let under_1s = under_100ms + self.latency_under_1s.load(Ordering::Relaxed);
        output.push_str(&format!(
            "gatewarden_request_duration_bucket{{le=\"0.001\"}} {under_1ms}\n"
        ));
        output.push_str(&format!(
            "gatewarden_request_duration_bucket{{le=\"0.01\"}} {under_10ms}\n"
        ));
        output.push_str(&format!(
            "gatewarden_request_duration_bucket{{le=\"0.1\"}} {under_100ms}\n"
        ));
        output.push_str(&format!(
            "gatewarden_request_duration_bucket{{le=\"1\"}} {under_1s}\n"
        ));
        output.push_str(&format!(
            "gatewarden_request_duration_bucket{{le=\"+Inf\"}} {}\n",
            self.latency_count.load(Ordering::Relaxed)
        ));

        let latency_sum_seconds =
            self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!(
            "gatewarden_request_duration_sum {latency_sum_seconds:.6}\n"
        ));
        output.push_str(&format!(
            "gatewarden_request_duration_count {}\n",
            self.latency_count.load(Ordering::Relaxed)
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
