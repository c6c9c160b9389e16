use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the message store and its cleanup processor
///
/// All durations are kept in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStoreConfig {
    /// Maximum age of an unprocessed message reference (default: 2 hours)
    #[serde(default = "default_time_to_live_ms")]
    pub time_to_live_ms: u64,

    /// Period of the cleanup timer (default: 30 minutes)
    ///
    /// Each tick starts a cleanup run unless one is already active. Also caps
    /// the pause between two passes of a run.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Pause between two endpoints within a pass (default: 30 seconds)
    #[serde(default = "default_endpoint_pause_ms")]
    pub endpoint_pause_ms: u64,

    /// Lower bound on the pause between two passes (default: 1 second)
    #[serde(default = "default_min_pass_interval_ms")]
    pub min_pass_interval_ms: u64,

    /// How long closing the store waits for an in-flight cleanup run
    /// (default: 30 seconds)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_time_to_live_ms() -> u64 {
    2 * 60 * 60 * 1000
}

fn default_cleanup_interval_ms() -> u64 {
    30 * 60 * 1000
}

fn default_endpoint_pause_ms() -> u64 {
    30_000
}

fn default_min_pass_interval_ms() -> u64 {
    1000
}

fn default_shutdown_grace_ms() -> u64 {
    30_000
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for MessageStoreConfig {
    fn default() -> Self {
        Self {
            time_to_live_ms: default_time_to_live_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            endpoint_pause_ms: default_endpoint_pause_ms(),
            min_pass_interval_ms: default_min_pass_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl MessageStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_to_live(&self) -> Duration {
        Duration::from_millis(self.time_to_live_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn endpoint_pause(&self) -> Duration {
        Duration::from_millis(self.endpoint_pause_ms)
    }

    pub fn min_pass_interval(&self) -> Duration {
        Duration::from_millis(self.min_pass_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live_ms = millis(ttl);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_ms = millis(interval);
        self
    }

    pub fn with_endpoint_pause(mut self, pause: Duration) -> Self {
        self.endpoint_pause_ms = millis(pause);
        self
    }

    pub fn with_min_pass_interval(mut self, interval: Duration) -> Self {
        self.min_pass_interval_ms = millis(interval);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = millis(grace);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: MessageStoreConfig =
            serde_json::from_str(r#"{"time_to_live_ms": 60000, "endpoint_pause_ms": 10}"#).unwrap();
        assert_eq!(cfg.time_to_live(), Duration::from_secs(60));
        assert_eq!(cfg.endpoint_pause(), Duration::from_millis(10));
        assert_eq!(cfg.cleanup_interval(), Duration::from_secs(1800));
        assert_eq!(cfg.min_pass_interval(), Duration::from_secs(1));
        assert_eq!(cfg.shutdown_grace(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder_round_trips_durations() {
        let cfg = MessageStoreConfig::new()
            .with_time_to_live(Duration::from_secs(5))
            .with_endpoint_pause(Duration::from_millis(250))
            .with_min_pass_interval(Duration::from_millis(20));
        assert_eq!(cfg.time_to_live_ms, 5000);
        assert_eq!(cfg.endpoint_pause(), Duration::from_millis(250));
        assert_eq!(cfg.min_pass_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_sub_second_durations_are_kept() {
        let cfg = MessageStoreConfig::new()
            .with_time_to_live(Duration::from_millis(500))
            .with_cleanup_interval(Duration::from_millis(1500))
            .with_shutdown_grace(Duration::from_millis(900));
        assert_eq!(cfg.time_to_live(), Duration::from_millis(500));
        assert_eq!(cfg.cleanup_interval(), Duration::from_millis(1500));
        assert_eq!(cfg.shutdown_grace(), Duration::from_millis(900));
    }

    #[test]
    fn test_oversized_duration_saturates() {
        let cfg = MessageStoreConfig::new().with_time_to_live(Duration::MAX);
        assert_eq!(cfg.time_to_live_ms, u64::MAX);
    }
}
