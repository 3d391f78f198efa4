//! Controller configuration
//!
//! All tunables in one place: listen address, source polling cadence,
//! retry/backoff shape and build executor wiring.

use std::time::Duration;

use crate::engine::EngineSettings;

/// Controller configuration
///
/// Intervals and retry budgets are configurable to allow tuning for
/// different deployment scenarios (dev vs prod, busy vs quiet stores).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to
    pub listen_addr: String,

    /// Directory holding the local git clones read by the source layer
    pub clones_root: String,

    /// How often each source watcher polls for a new fingerprint
    pub poll_interval: Duration,

    /// First retry delay for failed polls and conflicting applies
    pub backoff_base: Duration,

    /// Upper bound every backoff delay is clamped to
    pub backoff_cap: Duration,

    /// Apply attempts per object before it is marked Failed
    pub max_object_retries: u32,

    /// Trigger queue capacity per application
    pub queue_capacity: usize,

    /// External build command; when unset, builds are simulated
    pub build_command: Option<String>,

    /// Latency of the simulated builder
    pub build_latency: Duration,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - CAPSTAN_LISTEN_ADDR (default: 0.0.0.0:7070)
    /// - CAPSTAN_CLONES_ROOT (default: ./repos)
    /// - CAPSTAN_POLL_INTERVAL_SECS (default: 180)
    /// - CAPSTAN_BACKOFF_BASE_SECS (default: 5)
    /// - CAPSTAN_BACKOFF_CAP_SECS (default: 300)
    /// - CAPSTAN_MAX_OBJECT_RETRIES (default: 5)
    /// - CAPSTAN_QUEUE_CAPACITY (default: 64)
    /// - CAPSTAN_BUILD_COMMAND (default: unset, builds are simulated)
    /// - CAPSTAN_BUILD_LATENCY_MS (default: 100)
    pub fn from_env() -> Self {
        let listen_addr = std::env::var("CAPSTAN_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:7070".to_string());

        let clones_root = std::env::var("CAPSTAN_CLONES_ROOT")
            .unwrap_or_else(|_| "./repos".to_string());

        let poll_interval = std::env::var("CAPSTAN_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(180));

        let backoff_base = std::env::var("CAPSTAN_BACKOFF_BASE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let backoff_cap = std::env::var("CAPSTAN_BACKOFF_CAP_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        let max_object_retries = std::env::var("CAPSTAN_MAX_OBJECT_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(5);

        let queue_capacity = std::env::var("CAPSTAN_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(64);

        let build_command = std::env::var("CAPSTAN_BUILD_COMMAND")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let build_latency = std::env::var("CAPSTAN_BUILD_LATENCY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(100));

        Self {
            listen_addr,
            clones_root,
            poll_interval,
            backoff_base,
            backoff_cap,
            max_object_retries,
            queue_capacity,
            build_command,
            build_latency,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_addr.is_empty() {
            anyhow::bail!("listen_addr cannot be empty");
        }

        if self.clones_root.is_empty() {
            anyhow::bail!("clones_root cannot be empty");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.backoff_base.as_millis() == 0 {
            anyhow::bail!("backoff_base must be greater than 0");
        }

        if self.backoff_cap < self.backoff_base {
            anyhow::bail!("backoff_cap must not be below backoff_base");
        }

        if self.max_object_retries == 0 {
            anyhow::bail!("max_object_retries must be at least 1");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }

        Ok(())
    }

    /// Engine tunables derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            poll_interval: self.poll_interval,
            backoff_base: self.backoff_base,
            backoff_cap: self.backoff_cap,
            max_object_retries: self.max_object_retries,
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7070".to_string(),
            clones_root: "./repos".to_string(),
            poll_interval: Duration::from_secs(180),
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            max_object_retries: 5,
            queue_capacity: 64,
            build_command: None,
            build_latency: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, Duration::from_secs(180));
        assert_eq!(config.max_object_retries, 5);
        assert!(config.build_command.is_none());
    }

    #[test]
    fn test_engine_settings_mirror_the_config() {
        let config = Config::default();
        let settings = config.engine_settings();

        assert_eq!(settings.poll_interval, config.poll_interval);
        assert_eq!(settings.backoff_base, config.backoff_base);
        assert_eq!(settings.backoff_cap, config.backoff_cap);
        assert_eq!(settings.max_object_retries, config.max_object_retries);
        assert_eq!(settings.queue_capacity, config.queue_capacity);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.backoff_cap = Duration::from_secs(1);
        assert!(config.validate().is_err());

        config.backoff_cap = Duration::from_secs(300);
        config.max_object_retries = 0;
        assert!(config.validate().is_err());

        config.max_object_retries = 5;
        config.listen_addr = String::new();
        assert!(config.validate().is_err());
    }
}
