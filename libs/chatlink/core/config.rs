use crate::traits::*;
use std::time::Duration;

/// Default channel open timeout
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Default maximum number of consecutive reconnect attempts
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default delay before the first reconnect attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Default latency probe period
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of finished message ids remembered by the assembler
pub const DEFAULT_FINISHED_CAPACITY: usize = 1024;

/// Default number of partial messages the assembler holds at once
pub const DEFAULT_STREAMING_CAPACITY: usize = 256;

/// Configuration for the connection manager
///
/// Holds the channel open parameters plus the timer periods the manager
/// schedules. Built through [`ConnectionManagerBuilder`](crate::builder::ConnectionManagerBuilder)
/// or directly with [`ManagerConfig::new`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Server URL (http(s):// or ws(s)://)
    pub url: String,

    /// Time allowed between starting an open and receiving `connect`
    pub open_timeout: Duration,

    /// Maximum consecutive reconnect attempts before entering `error`
    pub max_retries: u32,

    /// Backoff base: retry `n` waits `base_delay * 2^n`
    pub base_delay: Duration,

    /// Period of the latency probe while connected
    pub probe_interval: Duration,

    /// How many completed message ids the assembler remembers
    pub finished_capacity: usize,

    /// How many partial messages the assembler holds before evicting the oldest
    pub streaming_capacity: usize,
}

impl ManagerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            finished_capacity: DEFAULT_FINISHED_CAPACITY,
            streaming_capacity: DEFAULT_STREAMING_CAPACITY,
        }
    }

    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reconnect policy described by this configuration
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_delay, self.max_retries)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ChatLinkError::Configuration("url cannot be empty".to_string()));
        }

        if self.open_timeout.is_zero() {
            return Err(ChatLinkError::Configuration(
                "open_timeout must be greater than 0".to_string(),
            ));
        }

        if self.probe_interval.is_zero() {
            return Err(ChatLinkError::Configuration(
                "probe_interval must be greater than 0".to_string(),
            ));
        }

        if self.finished_capacity == 0 {
            return Err(ChatLinkError::Configuration(
                "finished_capacity must be greater than 0".to_string(),
            ));
        }

        if self.streaming_capacity == 0 {
            return Err(ChatLinkError::Configuration(
                "streaming_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
