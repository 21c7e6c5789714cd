//! Engine.IO keep-alive watchdog
//!
//! The server pings every `pingInterval`; the client answers each ping with
//! a pong. A connection that stays silent for `pingInterval + pingTimeout`
//! is considered dead and closed with `ping timeout`.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// Deadline that is pushed back every time the server pings
pub struct KeepAlive {
    window: Option<Duration>,
    deadline: Pin<Box<Sleep>>,
}

impl KeepAlive {
    /// A watchdog that is not armed until the handshake is known
    pub fn new() -> Self {
        Self {
            window: None,
            deadline: Box::pin(sleep(Duration::ZERO)),
        }
    }

    /// Arm with the handshake window and start counting now
    pub fn arm(&mut self, window: Duration) {
        self.window = Some(window);
        self.record_ping();
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.window.is_some()
    }

    /// Record that the server just pinged
    pub fn record_ping(&mut self) {
        if let Some(window) = self.window {
            self.deadline.as_mut().reset(Instant::now() + window);
        }
    }

    /// Resolves when the server has been silent for the whole window
    ///
    /// Never resolves while unarmed.
    pub async fn expired(&mut self) {
        if self.window.is_none() {
            std::future::pending::<()>().await;
        }
        self.deadline.as_mut().await;
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}
