//! Round-trip latency probe
//!
//! While connected, the probe ticks on a fixed interval. Each tick sends a
//! `ping(timestamp)`; the matching `pong(timestamp)` yields
//! `latency = now - timestamp`.
//!
//! ```text
//! tick ──> begin(now) ──> ping(t0) ──────────────> server
//!                                                     │
//! publish(t1 - t0) <── complete(t0, t1) <── pong(t0) ─┘
//! ```
//!
//! Only one probe is in flight at a time. The first tick after an unanswered
//! ping is skipped; a probe outstanding for more than one and a half
//! intervals (measured on the runtime clock) is considered lost and replaced
//! on the tick after that.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Periodic latency measurement over the active channel
///
/// Owns its interval timer; [`stop`](LatencyProbe::stop) cancels the timer
/// and discards any pending probe.
pub struct LatencyProbe {
    period: Duration,
    ticker: Option<Interval>,
    /// Epoch-ms timestamp of the ping awaiting its pong, and when it left
    pending: Option<(i64, Instant)>,
}

impl LatencyProbe {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
            pending: None,
        }
    }

    /// Start ticking; the first tick fires one period from now
    pub fn start(&mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        // If ticks are missed, skip them rather than bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        self.pending = None;
        debug!("Latency probe started with interval: {:?}", self.period);
    }

    /// Stop ticking and forget any in-flight probe
    pub fn stop(&mut self) {
        if self.ticker.take().is_some() {
            debug!("Latency probe stopped");
        }
        if self.pending.take().is_some() {
            debug!("Discarded in-flight latency probe");
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    #[inline]
    pub fn in_flight(&self) -> Option<i64> {
        self.pending.map(|(timestamp, _)| timestamp)
    }

    /// Wait for the next tick; never resolves while stopped
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Begin a probe at `now_ms`
    ///
    /// Returns the timestamp to send as `ping`, or `None` if a probe is
    /// already in flight.
    pub fn begin(&mut self, now_ms: i64) -> Option<i64> {
        if let Some((sent, sent_at)) = self.pending {
            let outstanding = sent_at.elapsed();
            if outstanding <= self.lost_after() {
                debug!("Latency probe still in flight ({:?}), skipping tick", outstanding);
                return None;
            }
            debug!("Latency probe from {} lost, replacing", sent);
        }
        self.pending = Some((now_ms, Instant::now()));
        Some(now_ms)
    }

    /// Age past which a pending probe is given up on
    fn lost_after(&self) -> Duration {
        self.period + self.period / 2
    }

    /// Complete the in-flight probe with a `pong` echoing `timestamp`
    ///
    /// Returns the measured latency in milliseconds, or `None` when the pong
    /// does not match the pending probe.
    pub fn complete(&mut self, timestamp: i64, now_ms: i64) -> Option<u64> {
        match self.pending.map(|(sent, _)| sent) {
            Some(sent) if sent == timestamp => {
                self.pending = None;
                Some(now_ms.saturating_sub(timestamp).max(0) as u64)
            }
            Some(sent) => {
                debug!("Ignoring pong {} (waiting for {})", timestamp, sent);
                None
            }
            None => {
                debug!("Ignoring unsolicited pong {}", timestamp);
                None
            }
        }
    }
}
