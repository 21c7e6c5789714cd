use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection states of the manager's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Initial state; also reached by manual disconnect or server disconnect
    Disconnected,
    /// Channel open in progress
    Connecting,
    /// Channel open and acknowledged
    Connected,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
    /// Retries exhausted or authentication rejected
    Error,
}

impl ConnectionStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        }
    }

    /// States from which `connect()` starts a new attempt
    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the connection published to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub status: ConnectionStatus,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    /// Retries scheduled since the last successful connect
    pub retry_attempts: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
}

impl ConnectionInfo {
    pub fn new(max_retries: u32) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_connected_at: None,
            latency_ms: None,
            retry_attempts: 0,
            max_retries,
            last_error: None,
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
