use std::time::Duration;

use markbatch_core::filtering::FilterPolicy;
use markbatch_core::progress::FlushPolicy;
use markbatch_registry::pacer::min_delay_ms;
use markbatch_registry::RegistryConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,

    /// Maximum identifiers per submitted batch (default: `500`).
    pub max_batch_size: usize,

    /// Registry base URL, API key, rate ceiling and per-call timeout.
    pub registry: RegistryConfig,

    /// Whether records represented by a third party are excluded from
    /// final results (default: `true`).
    pub filter: FilterPolicy,

    /// Throttle for durable progress writes.
    pub flush: FlushPolicy,

    /// Dispatcher idle poll interval (default: 1s).
    pub dispatch_poll_interval: Duration,
    /// A processing job with no heartbeat for this long is stalled
    /// (default: 60s).
    pub stall_window: Duration,
    /// How often the stall monitor scans (default: 15s).
    pub stall_poll_interval: Duration,
    /// Requeues allowed for a stalled job before it is failed (default: 2).
    pub max_requeues: i16,

    /// Snapshot cache capacity (default: 10000 entries).
    pub cache_capacity: u64,
    /// Cache TTL for active jobs -- short, to force periodic resync
    /// (default: 10s).
    pub cache_active_ttl: Duration,
    /// Cache TTL for terminal jobs (default: 3600s).
    pub cache_terminal_ttl: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                   |
    /// |------------------------------|---------------------------|
    /// | `HOST`                       | `0.0.0.0`                 |
    /// | `PORT`                       | `3000`                    |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                      |
    /// | `MAX_BATCH_SIZE`             | `500`                     |
    /// | `REGISTRY_BASE_URL`          | `http://localhost:8089`   |
    /// | `REGISTRY_API_KEY`           | unset                     |
    /// | `REGISTRY_RATE_PER_MINUTE`   | `60`                      |
    /// | `REGISTRY_TIMEOUT_SECS`      | `10`                      |
    /// | `FILTER_EXCLUDE_REPRESENTED` | `true`                    |
    /// | `PROGRESS_FLUSH_MS`          | `2000`                    |
    /// | `PROGRESS_BUCKET_PERCENT`    | `10`                      |
    /// | `DISPATCH_POLL_SECS`         | `1`                       |
    /// | `STALL_WINDOW_SECS`          | `60`                      |
    /// | `STALL_POLL_SECS`            | `15`                      |
    /// | `MAX_REQUEUES`               | `2`                       |
    /// | `CACHE_CAPACITY`             | `10000`                   |
    /// | `CACHE_ACTIVE_TTL_SECS`      | `10`                      |
    /// | `CACHE_TERMINAL_TTL_SECS`    | `3600`                    |
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parsed("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS", 30),
            max_batch_size: env_parsed("MAX_BATCH_SIZE", 500),
            registry: RegistryConfig {
                base_url: std::env::var("REGISTRY_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8089".into()),
                api_key: std::env::var("REGISTRY_API_KEY").ok(),
                requests_per_minute: env_parsed("REGISTRY_RATE_PER_MINUTE", 60),
                timeout: Duration::from_secs(env_parsed("REGISTRY_TIMEOUT_SECS", 10)),
            },
            filter: FilterPolicy {
                exclude_represented: env_parsed("FILTER_EXCLUDE_REPRESENTED", true),
            },
            flush: FlushPolicy {
                interval: Duration::from_millis(env_parsed("PROGRESS_FLUSH_MS", 2000)),
                bucket_percent: env_parsed("PROGRESS_BUCKET_PERCENT", 10),
            },
            dispatch_poll_interval: Duration::from_secs(env_parsed("DISPATCH_POLL_SECS", 1)),
            stall_window: Duration::from_secs(env_parsed("STALL_WINDOW_SECS", 60)),
            stall_poll_interval: Duration::from_secs(env_parsed("STALL_POLL_SECS", 15)),
            max_requeues: env_parsed("MAX_REQUEUES", 2),
            cache_capacity: env_parsed("CACHE_CAPACITY", 10_000),
            cache_active_ttl: Duration::from_secs(env_parsed("CACHE_ACTIVE_TTL_SECS", 10)),
            cache_terminal_ttl: Duration::from_secs(env_parsed("CACHE_TERMINAL_TTL_SECS", 3600)),
        }
    }

    /// Check consistency between variables that no single default can
    /// guarantee.
    ///
    /// The worker heartbeats once per identifier, and consecutive
    /// identifiers are separated by the pacer delay plus up to one
    /// registry timeout. A stall window at or below that gap would flag
    /// a healthy worker as stalled and requeue live jobs.
    pub fn validate(&self) -> Result<(), String> {
        let heartbeat_gap = Duration::from_millis(min_delay_ms(self.registry.requests_per_minute))
            + self.registry.timeout;
        if self.stall_window <= heartbeat_gap {
            return Err(format!(
                "STALL_WINDOW_SECS ({}s) must exceed the worst-case heartbeat gap of {}s \
                 (pacer delay for REGISTRY_RATE_PER_MINUTE={} plus REGISTRY_TIMEOUT_SECS)",
                self.stall_window.as_secs(),
                heartbeat_gap.as_secs(),
                self.registry.requests_per_minute,
            ));
        }
        Ok(())
    }
}

/// Parse an env var, panicking on malformed values (misconfiguration
/// should fail fast at startup).
fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate_per_minute: u32, timeout_secs: u64, stall_window_secs: u64) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 30,
            max_batch_size: 500,
            registry: RegistryConfig {
                base_url: "http://localhost:8089".into(),
                api_key: None,
                requests_per_minute: rate_per_minute,
                timeout: Duration::from_secs(timeout_secs),
            },
            filter: FilterPolicy::default(),
            flush: FlushPolicy::default(),
            dispatch_poll_interval: Duration::from_secs(1),
            stall_window: Duration::from_secs(stall_window_secs),
            stall_poll_interval: Duration::from_secs(15),
            max_requeues: 2,
            cache_capacity: 16,
            cache_active_ttl: Duration::from_secs(10),
            cache_terminal_ttl: Duration::from_secs(3600),
        }
    }

    #[test]
    fn default_stall_window_accommodates_default_pacing() {
        // rate 60 -> 1s between calls, 10s timeout, 60s window.
        assert!(config(60, 10, 60).validate().is_ok());
    }

    #[test]
    fn slow_pacing_with_tight_stall_window_is_rejected() {
        // rate 1 -> 60s between calls; a 60s window would flag every
        // healthy worker as stalled.
        let err = config(1, 10, 60).validate().unwrap_err();
        assert!(err.contains("STALL_WINDOW_SECS"));

        assert!(config(1, 10, 120).validate().is_ok());
    }
}
