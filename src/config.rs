//! Server configuration and CLI argument parsing.
//!
//! All options can be set as CLI arguments or environment variables with
//! the GATEWARDEN_ prefix; CLI arguments take precedence, defaults apply
//! last. Windows, TTLs, and sweep parameters are given in seconds.
//!
//! ```bash
//! # Via CLI
//! gatewarden --port 9090 --dashboard-ttl 600
//!
//! # Via environment variables
//! export GATEWARDEN_PORT=9090
//! export GATEWARDEN_SWEEP_INTERVAL=30
//! gatewarden
//! ```

use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;

use crate::actor::GovernorConfig;
use crate::policy::{PolicyTable, RatePolicy};
use crate::types::Role;

/// Main configuration structure, built from CLI arguments and environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: ListenConfig,
    pub limits: LimitConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

/// Per-category `{quota, window-seconds}` pairs.
///
/// Roles cover ordinary traffic; the reports, auth, and realtime classes
/// override every role on their path prefixes because their cost and abuse
/// profiles differ from ordinary API calls.
#[derive(Debug, Clone)]
pub struct LimitConfig {
    pub anonymous_quota: u32,
    pub anonymous_window: u64,
    pub user_quota: u32,
    pub user_window: u64,
    pub staff_quota: u32,
    pub staff_window: u64,
    pub admin_quota: u32,
    pub admin_window: u64,
    pub reports_quota: u32,
    pub reports_window: u64,
    pub auth_quota: u32,
    pub auth_window: u64,
    pub realtime_quota: u32,
    pub realtime_window: u64,
}

/// Per-category TTLs in seconds. Live endpoints have no TTL at all; they
/// bypass the cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl: u64,
    pub dashboard_ttl: u64,
    pub reports_ttl: u64,
}

/// Store sizing and sweep parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub rate_capacity: usize,
    pub cache_capacity: usize,
    pub buffer_size: usize,
    /// Seconds between staleness sweeps
    pub sweep_interval: u64,
    /// Seconds a rate-limit key may stay idle before it is swept
    pub staleness_horizon: u64,
}

/// Path prefixes of the governed endpoint classes.
pub const REPORTS_PREFIX: &str = "/api/reports";
pub const AUTH_PREFIX: &str = "/api/auth";
pub const REALTIME_PREFIX: &str = "/api/live";
pub const DASHBOARD_PREFIX: &str = "/api/dashboard";

/// Command-line arguments. Every argument can also be set via a
/// GATEWARDEN_-prefixed environment variable; CLI takes precedence.
#[derive(Parser, Debug)]
#[command(
    name = "gatewarden",
    about = "API gateway with sliding-window rate limiting and response caching"
)]
pub struct Args {
    #[arg(
        long,
        value_name = "HOST",
        default_value = "127.0.0.1",
        env = "GATEWARDEN_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        default_value_t = 8080,
        env = "GATEWARDEN_PORT"
    )]
    pub port: u16,

    // Role-based limits
    #[arg(
        long,
        value_name = "N",
        help = "Requests per window for unauthenticated clients",
        default_value_t = 60,
        env = "GATEWARDEN_ANONYMOUS_QUOTA"
    )]
    pub anonymous_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        env = "GATEWARDEN_ANONYMOUS_WINDOW"
    )]
    pub anonymous_window: u64,
    #[arg(
        long,
        value_name = "N",
        default_value_t = 200,
        env = "GATEWARDEN_USER_QUOTA"
    )]
    pub user_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        env = "GATEWARDEN_USER_WINDOW"
    )]
    pub user_window: u64,
    #[arg(
        long,
        value_name = "N",
        default_value_t = 500,
        env = "GATEWARDEN_STAFF_QUOTA"
    )]
    pub staff_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        env = "GATEWARDEN_STAFF_WINDOW"
    )]
    pub staff_window: u64,
    #[arg(
        long,
        value_name = "N",
        default_value_t = 1000,
        env = "GATEWARDEN_ADMIN_QUOTA"
    )]
    pub admin_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        env = "GATEWARDEN_ADMIN_WINDOW"
    )]
    pub admin_window: u64,

    // Endpoint-class overrides
    #[arg(
        long,
        value_name = "N",
        help = "Quota for report-generation endpoints",
        default_value_t = 10,
        env = "GATEWARDEN_REPORTS_QUOTA"
    )]
    pub reports_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 600,
        env = "GATEWARDEN_REPORTS_WINDOW"
    )]
    pub reports_window: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Quota for authentication endpoints",
        default_value_t = 20,
        env = "GATEWARDEN_AUTH_QUOTA"
    )]
    pub auth_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 300,
        env = "GATEWARDEN_AUTH_WINDOW"
    )]
    pub auth_window: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Quota for real-time endpoints",
        default_value_t = 300,
        env = "GATEWARDEN_REALTIME_QUOTA"
    )]
    pub realtime_quota: u32,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        env = "GATEWARDEN_REALTIME_WINDOW"
    )]
    pub realtime_window: u64,

    // Cache TTLs
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        env = "GATEWARDEN_DEFAULT_TTL"
    )]
    pub default_ttl: u64,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 300,
        env = "GATEWARDEN_DASHBOARD_TTL"
    )]
    pub dashboard_ttl: u64,
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 600,
        env = "GATEWARDEN_REPORTS_TTL"
    )]
    pub reports_ttl: u64,

    // Store sizing and sweep
    #[arg(
        long,
        value_name = "SIZE",
        default_value_t = 10_000,
        env = "GATEWARDEN_RATE_CAPACITY"
    )]
    pub rate_capacity: usize,
    #[arg(
        long,
        value_name = "SIZE",
        default_value_t = 10_000,
        env = "GATEWARDEN_CACHE_CAPACITY"
    )]
    pub cache_capacity: usize,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Channel buffer size for the governor",
        default_value_t = 10_000,
        env = "GATEWARDEN_BUFFER_SIZE"
    )]
    pub buffer_size: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Interval between staleness sweeps",
        default_value_t = 60,
        env = "GATEWARDEN_SWEEP_INTERVAL"
    )]
    pub sweep_interval: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Idle time before a rate-limit key is swept",
        default_value_t = 3600,
        env = "GATEWARDEN_STALENESS_HORIZON"
    )]
    pub staleness_horizon: u64,

    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "GATEWARDEN_LOG_LEVEL"
    )]
    pub log_level: String,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments,
    /// then validate it.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let config = Config {
            listen: ListenConfig {
                host: args.host,
                port: args.port,
            },
            limits: LimitConfig {
                anonymous_quota: args.anonymous_quota,
                anonymous_window: args.anonymous_window,
                user_quota: args.user_quota,
                user_window: args.user_window,
                staff_quota: args.staff_quota,
                staff_window: args.staff_window,
                admin_quota: args.admin_quota,
                admin_window: args.admin_window,
                reports_quota: args.reports_quota,
                reports_window: args.reports_window,
                auth_quota: args.auth_quota,
                auth_window: args.auth_window,
                realtime_quota: args.realtime_quota,
                realtime_window: args.realtime_window,
            },
            cache: CacheConfig {
                default_ttl: args.default_ttl,
                dashboard_ttl: args.dashboard_ttl,
                reports_ttl: args.reports_ttl,
            },
            store: StoreConfig {
                rate_capacity: args.rate_capacity,
                cache_capacity: args.cache_capacity,
                buffer_size: args.buffer_size,
                sweep_interval: args.sweep_interval,
                staleness_horizon: args.staleness_horizon,
            },
            log_level: args.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the stores cannot meaningfully run with.
    fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        let quotas = [
            ("anonymous", limits.anonymous_quota),
            ("user", limits.user_quota),
            ("staff", limits.staff_quota),
            ("admin", limits.admin_quota),
            ("reports", limits.reports_quota),
            ("auth", limits.auth_quota),
            ("realtime", limits.realtime_quota),
        ];
        for (name, quota) in quotas {
            if quota == 0 {
                return Err(anyhow!("{name} quota must be at least 1"));
            }
        }

        let windows = [
            ("anonymous", limits.anonymous_window),
            ("user", limits.user_window),
            ("staff", limits.staff_window),
            ("admin", limits.admin_window),
            ("reports", limits.reports_window),
            ("auth", limits.auth_window),
            ("realtime", limits.realtime_window),
        ];
        for (name, window) in windows {
            if window == 0 {
                return Err(anyhow!("{name} window must be at least 1 second"));
            }
        }

        if self.store.sweep_interval == 0 {
            return Err(anyhow!("sweep interval must be at least 1 second"));
        }

        let longest_window = windows.iter().map(|(_, w)| *w).max().unwrap_or(0);
        if self.store.staleness_horizon < longest_window {
            // a shorter horizon would sweep keys that are still inside an
            // active window
            return Err(anyhow!(
                "staleness horizon ({}s) must cover the longest window ({}s)",
                self.store.staleness_horizon,
                longest_window
            ));
        }

        Ok(())
    }

    /// The policy tables this configuration describes.
    pub fn policy_table(&self) -> PolicyTable {
        let limits = &self.limits;
        PolicyTable::builder()
            .anonymous_policy(rate(limits.anonymous_quota, limits.anonymous_window))
            .role_policy(Role::User, rate(limits.user_quota, limits.user_window))
            .role_policy(Role::Staff, rate(limits.staff_quota, limits.staff_window))
            .role_policy(Role::Admin, rate(limits.admin_quota, limits.admin_window))
            .path_override(
                REPORTS_PREFIX,
                rate(limits.reports_quota, limits.reports_window),
            )
            .path_override(AUTH_PREFIX, rate(limits.auth_quota, limits.auth_window))
            .path_override(
                REALTIME_PREFIX,
                rate(limits.realtime_quota, limits.realtime_window),
            )
            .default_ttl(Duration::from_secs(self.cache.default_ttl))
            .ttl_override(
                DASHBOARD_PREFIX,
                Duration::from_secs(self.cache.dashboard_ttl),
            )
            .ttl_override(REPORTS_PREFIX, Duration::from_secs(self.cache.reports_ttl))
            .no_cache_prefix(REALTIME_PREFIX)
            .no_cache_prefix(AUTH_PREFIX)
            .invalidation("/api/investors", ["investors", "dashboard"])
            .invalidation("/api/tickets", ["tickets", "dashboard"])
            .invalidation("/api/communications", ["communications"])
            .invalidation("/api/automations", ["automations", "dashboard"])
            .build()
    }

    /// Sizing and sweep parameters for the governor actor.
    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            rate_capacity: self.store.rate_capacity,
            cache_capacity: self.store.cache_capacity,
            buffer_size: self.store.buffer_size,
            sweep_interval: Duration::from_secs(self.store.sweep_interval),
            staleness_horizon: Duration::from_secs(self.store.staleness_horizon),
        }
    }
}

fn rate(quota: u32, window_secs: u64) -> RatePolicy {
    RatePolicy {
        quota,
        window: Duration::from_secs(window_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CacheDirective;
    use crate::types::{Principal, RequestDescriptor};
    use axum::http::Method;

    fn default_args() -> Args {
        Args::parse_from(["gatewarden"])
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::from_args(default_args()).unwrap();
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.limits.anonymous_quota, 60);
        assert_eq!(config.store.staleness_horizon, 3600);
    }

    #[test]
    fn zero_quota_is_rejected() {
        let mut args = default_args();
        args.user_quota = 0;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut args = default_args();
        args.auth_window = 0;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn horizon_shorter_than_longest_window_is_rejected() {
        let mut args = default_args();
        args.reports_window = 600;
        args.staleness_horizon = 300;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn policy_table_reflects_configured_numbers() {
        let mut args = default_args();
        args.reports_quota = 3;
        args.dashboard_ttl = 120;
        let config = Config::from_args(args).unwrap();
        let table = config.policy_table();

        let report_request = RequestDescriptor {
            method: Method::GET,
            path: "/api/reports/weekly".to_string(),
            query: None,
            principal: Some(Principal {
                id: "a1".to_string(),
                role: Role::Admin,
            }),
            client_addr: "192.0.2.1".to_string(),
        };
        assert_eq!(table.resolve_rate(&report_request).quota, 3);
        assert_eq!(
            table.cache_directive("/api/dashboard/summary"),
            CacheDirective::Store(Duration::from_secs(120))
        );
        assert_eq!(
            table.cache_directive("/api/live/feed"),
            CacheDirective::Bypass
        );
    }
}
