//! Configuration for permission sessions

use std::time::Duration;

/// Default interval between allow-set polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Environment variable overriding the poll interval, in milliseconds
pub const POLL_INTERVAL_ENV: &str = "GLYPHGATE_POLL_INTERVAL_MS";

/// Configuration for a [`PermissionSession`](super::PermissionSession)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often the held allow-set is compared against the store
    pub poll_interval: Duration,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Defaults, with the poll interval taken from the environment if set
    pub fn from_env() -> Self {
        let config = Self::new();
        match std::env::var(POLL_INTERVAL_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(ms) => config.poll_interval(Duration::from_millis(ms)),
            None => config,
        }
    }

    /// Set the poll interval. Zero is clamped to one millisecond.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
