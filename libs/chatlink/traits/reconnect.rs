use std::time::Duration;

/// Trait for defining reconnection policies
///
/// The connection manager owns the attempt counter; a policy is a pure
/// function of that counter and never keeps state of its own.
pub trait ReconnectPolicy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - Retries already scheduled before this one (0-indexed)
    fn delay(&self, attempt: u32) -> Duration;

    /// Check if another retry may be scheduled
    ///
    /// # Arguments
    /// * `attempt` - Retries already scheduled
    fn eligible(&self, attempt: u32) -> bool {
        attempt < self.max_retries()
    }

    /// Maximum number of consecutive retries
    fn max_retries(&self) -> u32;
}

/// Exponential backoff reconnection policy
///
/// Delays between reconnection attempts grow exponentially:
/// base_delay * 2^attempt. Saturates at `Duration::MAX` instead of overflowing.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_retries: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    ///
    /// # Arguments
    /// * `base_delay` - The delay before the first retry
    /// * `max_retries` - Maximum number of consecutive retries
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 5)
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
