use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ahash::AHashMap as HashMap;

// Pre-allocate extra space to avoid rehashing under churn
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CAPACITY: usize = 1000;

/// Outcome of a single admission check.
///
/// `limit` echoes the quota the check ran against, `remaining` is the quota
/// left in the current window (0 when denied), and `reset_at` is the instant
/// the window next frees a slot for this key.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: SystemTime,
}

/// Per-key request log. Timestamps are kept oldest-first; after pruning they
/// all fall within the trailing window of the last check.
struct WindowEntry {
    timestamps: VecDeque<SystemTime>,
}

/// Sliding-window rate limiter state, one request log per key.
///
/// Quota and window size are parameters of every call rather than fields of
/// the store, so a single store serves every limiting policy in the process.
/// Time is always supplied by the caller, which keeps the store synchronous
/// and deterministic under test.
///
/// The window is exact: each admitted request is logged with its timestamp
/// and only timestamps inside the trailing window are counted, so a burst is
/// never forgiven early the way fixed-bucket counters forgive it at bucket
/// boundaries.
pub struct RateLimitStore {
    data: HashMap<String, WindowEntry>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store sized for an expected number of distinct keys.
    pub fn with_capacity(capacity: usize) -> Self {
        RateLimitStore {
            data: HashMap::with_capacity((capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize),
        }
    }

    /// Check whether a request for `key` is admitted under `quota` requests
    /// per `window`, charging the request to the log if it is.
    ///
    /// Timestamps at or before `now - window` have slid out and are pruned
    /// before counting. Denied requests are not logged; only admissions
    /// consume quota.
    pub fn is_allowed(
        &mut self,
        key: &str,
        quota: u32,
        window: Duration,
        now: SystemTime,
    ) -> RateLimitDecision {
        let cutoff = now.checked_sub(window).unwrap_or(UNIX_EPOCH);

        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                timestamps: VecDeque::new(),
            });

        while let Some(&oldest) = entry.timestamps.front() {
            if oldest <= cutoff {
                entry.timestamps.pop_front();
            } else {
                break;
            }
        }

        let count = entry.timestamps.len() as u32;
        if count >= quota {
            // Full window: the next slot frees when the oldest logged
            // request slides out.
            let reset_at = entry
                .timestamps
                .front()
                .map_or(now + window, |&oldest| oldest + window);
            return RateLimitDecision {
                allowed: false,
                limit: quota,
                remaining: 0,
                reset_at,
            };
        }

        entry.timestamps.push_back(now);
        let oldest = entry.timestamps.front().copied().unwrap_or(now);
        RateLimitDecision {
            allowed: true,
            limit: quota,
            remaining: quota - (count + 1),
            reset_at: oldest + window,
        }
    }

    /// Drop one key's request log entirely. Returns whether it existed.
    pub fn reset(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Remove every entry whose most recent request is older than `horizon`,
    /// returning the number evicted.
    ///
    /// The horizon is independent of any window size: it bounds memory for
    /// keys that stopped sending requests, regardless of which policy they
    /// were checked under. A swept key that shows up again is re-created on
    /// its next request.
    pub fn sweep(&mut self, horizon: Duration, now: SystemTime) -> usize {
        let cutoff = now.checked_sub(horizon).unwrap_or(UNIX_EPOCH);
        let before = self.data.len();
        self.data
            .retain(|_, entry| entry.timestamps.back().is_some_and(|&last| last > cutoff));
        before - self.data.len()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}
