pub mod states;

use crate::config::ManagerConfig;
use crate::manager::ConnectionManager;
use crate::traits::*;
use crate::ws_transport::WsTransport;
use states::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Type-state builder for ConnectionManager
///
/// The server URL must be set before the manager can be built. Everything
/// else has a default:
/// - Transport: [`WsTransport`]
/// - Reconnect policy: exponential backoff from `base_delay` / `max_retries`
/// - Session: anonymous, never changing
pub struct ConnectionManagerBuilder<U>
where
    U: UrlState,
{
    _state: TypeState<U>,
    config: ManagerConfig,
    transport: Option<Arc<dyn Transport>>,
    policy: Option<Box<dyn ReconnectPolicy>>,
    session: Session,
    session_rx: Option<watch::Receiver<Session>>,
}

impl ConnectionManagerBuilder<NoUrl> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ManagerConfig::new(String::new()),
            transport: None,
            policy: None,
            session: Session::anonymous(),
            session_rx: None,
        }
    }

    pub fn url(self, url: impl Into<String>) -> ConnectionManagerBuilder<HasUrl> {
        let mut config = self.config;
        config.url = url.into();

        ConnectionManagerBuilder {
            _state: TypeState::new(),
            config,
            transport: self.transport,
            policy: self.policy,
            session: self.session,
            session_rx: self.session_rx,
        }
    }
}

impl Default for ConnectionManagerBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManagerBuilder<HasUrl> {
    /// Start from a complete configuration
    pub fn from_config(config: ManagerConfig) -> Self {
        Self {
            _state: TypeState::new(),
            config,
            transport: None,
            policy: None,
            session: Session::anonymous(),
            session_rx: None,
        }
    }
}

impl<U> ConnectionManagerBuilder<U>
where
    U: UrlState,
{
    /// Use a custom transport (tests plug an in-memory one here)
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom reconnect policy
    ///
    /// Overrides `base_delay` and `max_retries`.
    pub fn reconnect_policy(mut self, policy: impl ReconnectPolicy + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Fixed session for every open
    pub fn session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Follow a session published by the auth layer
    ///
    /// The current value is used for the first open. Later changes open a
    /// channel when the manager is idle and are picked up by the next open
    /// otherwise.
    pub fn session_source(mut self, session_rx: watch::Receiver<Session>) -> Self {
        self.session_rx = Some(session_rx);
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = interval;
        self
    }

    /// How many completed message ids to remember for duplicate suppression
    pub fn finished_capacity(mut self, capacity: usize) -> Self {
        self.config.finished_capacity = capacity;
        self
    }

    /// How many partial messages to hold before the oldest is abandoned
    pub fn streaming_capacity(mut self, capacity: usize) -> Self {
        self.config.streaming_capacity = capacity;
        self
    }
}

impl ConnectionManagerBuilder<HasUrl> {
    /// Build the manager and spawn its driver task
    ///
    /// Must be called from within a Tokio runtime. The manager starts
    /// `disconnected`; call `connect()` to open the channel.
    pub fn build(self) -> Result<ConnectionManager> {
        self.config.validate()?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ChatLinkError::Configuration(
                "ConnectionManager must be built inside a Tokio runtime".to_string(),
            ));
        }

        let policy: Box<dyn ReconnectPolicy> = match self.policy {
            Some(policy) => policy,
            None => Box::new(self.config.backoff()),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(WsTransport::new()),
        };

        Ok(ConnectionManager::spawn(
            self.config,
            transport,
            policy,
            self.session,
            self.session_rx,
        ))
    }
}
