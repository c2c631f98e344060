//! The governor actor owns both governance stores.
//!
//! All store access goes through one Tokio task and one mpsc queue, so the
//! maps need no locking and every operation observes arrival order. This is
//! the single-logical-thread model the stores are written for. The same task
//! drives the periodic staleness sweep, which therefore can never overlap a
//! request-path mutation.
//!
//! The governor is an explicit service: spawned once at startup, passed
//! around as a cheap clonable [`GovernorHandle`], and stopped with
//! [`GovernorHandle::shutdown`], which also cancels the sweep timer.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::core::{RateLimitDecision, RateLimitStore, ResponseCache};
use crate::metrics::Metrics;
use crate::types::CachedResponse;

/// Message types processed by the governor actor.
pub enum GovernorMessage {
    Check {
        key: String,
        quota: u32,
        window: Duration,
        respond: oneshot::Sender<RateLimitDecision>,
    },
    Reset {
        key: String,
        respond: oneshot::Sender<bool>,
    },
    CacheGet {
        key: String,
        respond: oneshot::Sender<Option<CachedResponse>>,
    },
    CacheStore {
        key: String,
        value: CachedResponse,
        ttl: Duration,
    },
    CacheDelete {
        key: String,
    },
    CacheClear,
    Invalidate {
        patterns: Vec<String>,
        respond: oneshot::Sender<usize>,
    },
    Stats {
        respond: oneshot::Sender<StoreStats>,
    },
    Shutdown,
}

/// Point-in-time sizes of both stores.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub rate_keys: usize,
    pub cache_entries: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    /// The governor task is gone (shut down or crashed). Callers treat this
    /// as "proceed ungoverned": governance is defense in depth, not a
    /// correctness dependency.
    #[error("governor is not running")]
    Unavailable,
}

/// Sizing and sweep parameters for a governor instance.
#[derive(Debug, Clone, Copy)]
pub struct GovernorConfig {
    /// Expected number of distinct rate-limit keys
    pub rate_capacity: usize,
    /// Expected number of cached responses
    pub cache_capacity: usize,
    /// Channel buffer size for actor communication
    pub buffer_size: usize,
    /// How often the staleness sweep runs
    pub sweep_interval: Duration,
    /// How long a rate-limit key may stay idle before the sweep drops it
    pub staleness_horizon: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        GovernorConfig {
            rate_capacity: 10_000,
            cache_capacity: 10_000,
            buffer_size: 10_000,
            sweep_interval: Duration::from_secs(60),
            staleness_horizon: Duration::from_secs(3600),
        }
    }
}

/// Handle to communicate with the governor actor.
#[derive(Clone)]
pub struct GovernorHandle {
    tx: mpsc::Sender<GovernorMessage>,
}

impl GovernorHandle {
    /// Admission check for `key` under `quota` requests per `window`.
    pub async fn check(
        &self,
        key: String,
        quota: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, GovernorError> {
        let (respond, rx) = oneshot::channel();
        self.send(GovernorMessage::Check {
            key,
            quota,
            window,
            respond,
        })
        .await?;
        rx.await.map_err(|_| GovernorError::Unavailable)
    }

    /// Clear one key's rate-limit log (administrative recovery).
    pub async fn reset(&self, key: String) -> Result<bool, GovernorError> {
        let (respond, rx) = oneshot::channel();
        self.send(GovernorMessage::Reset { key, respond }).await?;
        rx.await.map_err(|_| GovernorError::Unavailable)
    }

    pub async fn cache_get(&self, key: String) -> Result<Option<CachedResponse>, GovernorError> {
        let (respond, rx) = oneshot::channel();
        self.send(GovernorMessage::CacheGet { key, respond }).await?;
        rx.await.map_err(|_| GovernorError::Unavailable)
    }

    /// Fire-and-forget store; population is never worth blocking a response.
    pub async fn cache_store(
        &self,
        key: String,
        value: CachedResponse,
        ttl: Duration,
    ) -> Result<(), GovernorError> {
        self.send(GovernorMessage::CacheStore { key, value, ttl })
            .await
    }

    pub async fn cache_delete(&self, key: String) -> Result<(), GovernorError> {
        self.send(GovernorMessage::CacheDelete { key }).await
    }

    pub async fn cache_clear(&self) -> Result<(), GovernorError> {
        self.send(GovernorMessage::CacheClear).await
    }

    /// Remove every cached entry whose key contains any of `patterns`,
    /// returning how many entries were dropped.
    pub async fn invalidate(&self, patterns: Vec<String>) -> Result<usize, GovernorError> {
        let (respond, rx) = oneshot::channel();
        self.send(GovernorMessage::Invalidate { patterns, respond })
            .await?;
        rx.await.map_err(|_| GovernorError::Unavailable)
    }

    pub async fn stats(&self) -> Result<StoreStats, GovernorError> {
        let (respond, rx) = oneshot::channel();
        self.send(GovernorMessage::Stats { respond }).await?;
        rx.await.map_err(|_| GovernorError::Unavailable)
    }

    /// Stop the governor. The actor drains nothing further: the sweep timer
    /// is cancelled with the task and later calls return
    /// [`GovernorError::Unavailable`].
    pub async fn shutdown(&self) {
        let _ = self.tx.send(GovernorMessage::Shutdown).await;
    }

    async fn send(&self, msg: GovernorMessage) -> Result<(), GovernorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| GovernorError::Unavailable)
    }
}

/// The governor actor.
pub struct Governor;

impl Governor {
    /// Spawn a governor task owning freshly created stores and return the
    /// handle used to reach it.
    pub fn spawn(config: GovernorConfig, metrics: Arc<Metrics>) -> GovernorHandle {
        let (tx, rx) = mpsc::channel(config.buffer_size);

        tokio::spawn(async move {
            run_governor(rx, config, metrics).await;
        });

        GovernorHandle { tx }
    }
}

async fn run_governor(
    mut rx: mpsc::Receiver<GovernorMessage>,
    config: GovernorConfig,
    metrics: Arc<Metrics>,
) {
    let mut limits = RateLimitStore::with_capacity(config.rate_capacity);
    let mut cache: ResponseCache<CachedResponse> =
        ResponseCache::with_capacity(config.cache_capacity);

    let mut sweep = tokio::time::interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick fires immediately against empty stores
    sweep.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(GovernorMessage::Shutdown) | None => break,
                    Some(msg) => handle_message(msg, &mut limits, &mut cache),
                }
            }
            _ = sweep.tick() => {
                let now = SystemTime::now();
                let evicted = limits.sweep(config.staleness_horizon, now);
                if evicted > 0 {
                    tracing::debug!(evicted, "swept stale rate-limit keys");
                }
                metrics.record_sweep_evictions(evicted as u64);
                metrics.update_store_sizes(limits.len(), cache.len());
            }
        }
    }

    tracing::info!("governor shutting down");
}

fn handle_message(
    msg: GovernorMessage,
    limits: &mut RateLimitStore,
    cache: &mut ResponseCache<CachedResponse>,
) {
    let now = SystemTime::now();
    match msg {
        GovernorMessage::Check {
            key,
            quota,
            window,
            respond,
        } => {
            // Ignore send errors - the requester may have gone away
            let _ = respond.send(limits.is_allowed(&key, quota, window, now));
        }
        GovernorMessage::Reset { key, respond } => {
            let _ = respond.send(limits.reset(&key));
        }
        GovernorMessage::CacheGet { key, respond } => {
            let _ = respond.send(cache.get(&key, now));
        }
        GovernorMessage::CacheStore { key, value, ttl } => {
            cache.set(key, value, ttl, now);
        }
        GovernorMessage::CacheDelete { key } => {
            cache.delete(&key);
        }
        GovernorMessage::CacheClear => {
            cache.clear();
        }
        GovernorMessage::Invalidate { patterns, respond } => {
            let removed = patterns
                .iter()
                .map(|pattern| cache.invalidate_matching(pattern))
                .sum();
            let _ = respond.send(removed);
        }
        GovernorMessage::Stats { respond } => {
            let _ = respond.send(StoreStats {
                rate_keys: limits.len(),
                cache_entries: cache.len(),
            });
        }
        // handled by the select loop before reaching here
        GovernorMessage::Shutdown => {}
    }
}
