use crate::assembler::{Assembly, MessageStreamAssembler};
use crate::config::ManagerConfig;
use crate::connection_info::{ConnectionInfo, ConnectionStatus};
use crate::latency::LatencyProbe;
use crate::protocol::{
    self, inbound, ClientEvent, DisconnectReason, FileAttachment, OutboundEvent, StreamChunk,
    TypingIndicator,
};
use crate::router::EventRouter;
use crate::traits::*;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, warn};

/// `lastError` once the retry budget is spent
pub const MAX_RETRIES_REACHED: &str = "max reconnection attempts reached";

/// Internal command messages for manager control
#[derive(Debug)]
enum ManagerCommand {
    Connect,
    Disconnect,
    Emit(OutboundEvent),
    Shutdown,
}

/// Result of one spawned open attempt, tagged with its epoch
struct OpenOutcome {
    epoch: u64,
    result: Result<ChannelHandle>,
}

/// Realtime connection manager for a single chat channel
///
/// Owns one channel to the backend and keeps it alive:
/// - Exponential-backoff reconnects on transport failures
/// - No reconnect when the server closes the channel on purpose
/// - Latency probing while connected
/// - Reassembly of streamed assistant messages
/// - Session changes reconnect an idle manager, never a live channel
///
/// All state lives in a single driver task; this handle only sends commands
/// and reads the consumer event stream, so no method blocks.
///
/// Dropping the handle tears the driver down; [`shutdown`](Self::shutdown)
/// does the same and waits for it.
pub struct ConnectionManager {
    /// Command channel sender
    command_tx: mpsc::UnboundedSender<ManagerCommand>,
    /// Event channel receiver
    event_rx: mpsc::UnboundedReceiver<ClientEvent>,
    /// Latest published snapshot
    info: Arc<RwLock<ConnectionInfo>>,
    /// Driver task handle
    task_handle: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Spawn the driver task
    ///
    /// Called by the builder's `build()` method; must run inside a Tokio
    /// runtime. Use `ConnectionManager::builder()` to create a manager.
    pub(crate) fn spawn(
        config: ManagerConfig,
        transport: Arc<dyn Transport>,
        policy: Box<dyn ReconnectPolicy>,
        session: Session,
        session_rx: Option<watch::Receiver<Session>>,
    ) -> Self {
        let initial = ConnectionInfo::new(policy.max_retries());
        let info = Arc::new(RwLock::new(initial.clone()));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = mpsc::unbounded_channel();

        let mut session_rx = session_rx;
        let session = match session_rx.as_mut() {
            Some(rx) => rx.borrow_and_update().clone(),
            None => session,
        };

        let driver = Driver {
            probe: LatencyProbe::new(config.probe_interval),
            assembler: MessageStreamAssembler::new(
                config.finished_capacity,
                config.streaming_capacity,
            ),
            config,
            transport,
            policy,
            info: initial,
            shared_info: Arc::clone(&info),
            event_tx,
            session,
            session_rx,
            channel: None,
            epoch: 0,
            open_tx,
            open_task: None,
            open_deadline: None,
            reconnect_timer: None,
        };

        let task_handle = tokio::spawn(driver.run(command_rx, open_rx));

        Self {
            command_tx,
            event_rx,
            info,
            task_handle: Some(task_handle),
        }
    }

    /// Open the channel
    ///
    /// No-op while connecting, reconnecting or connected.
    pub fn connect(&self) {
        self.command(ManagerCommand::Connect);
    }

    /// Close the channel and cancel every pending timer
    ///
    /// Safe to call repeatedly. The manager stays `disconnected` until
    /// `connect()` is called again (or the session changes).
    pub fn disconnect(&self) {
        self.command(ManagerCommand::Disconnect);
    }

    /// Send an event with a verbatim payload
    ///
    /// Dropped with a warning if the manager is not connected.
    pub fn emit(&self, name: impl Into<String>, payload: Value) {
        self.send(OutboundEvent::Custom {
            name: name.into(),
            payload,
        });
    }

    /// Send a typed outbound event
    pub fn send(&self, event: OutboundEvent) {
        self.command(ManagerCommand::Emit(event));
    }

    /// Send a chat message to a conversation
    pub fn send_message(
        &self,
        content: impl Into<String>,
        conversation_id: impl Into<String>,
        files: Option<Vec<FileAttachment>>,
    ) {
        self.send(OutboundEvent::send_message(content, conversation_id, files));
    }

    /// Tell the server whether the user is typing
    pub fn send_typing(&self, conversation_id: impl Into<String>, is_typing: bool) {
        self.send(OutboundEvent::typing(conversation_id, is_typing));
    }

    /// Latest connection snapshot
    pub fn info(&self) -> ConnectionInfo {
        self.info.read().clone()
    }

    /// Get current connection status
    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        self.info.read().status
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Receive the next consumer event
    ///
    /// Returns `None` once the driver has stopped and the stream is drained.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.recv().await
    }

    /// Try to receive an event (non-blocking)
    pub fn try_next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Tear the manager down and wait for the driver to exit
    ///
    /// Cancels every timer, closes the channel and publishes a final
    /// `disconnected` snapshot if the manager was not already disconnected.
    pub async fn shutdown(mut self) {
        info!("Shutting down connection manager");

        let _ = self.command_tx.send(ManagerCommand::Shutdown);

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Connection manager task failed: {}", e);
            }
        }
    }

    fn command(&self, command: ManagerCommand) {
        if let Err(e) = self.command_tx.send(command) {
            warn!("Connection manager is not running, dropped {:?}", e.0);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            let _ = self.command_tx.send(ManagerCommand::Shutdown);
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// State machine owned by the driver task
struct Driver {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    policy: Box<dyn ReconnectPolicy>,

    /// Authoritative snapshot; `shared_info` mirrors it on every publish
    info: ConnectionInfo,
    shared_info: Arc<RwLock<ConnectionInfo>>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,

    session: Session,
    session_rx: Option<watch::Receiver<Session>>,

    channel: Option<ChannelHandle>,
    /// Bumped for every open attempt; results from older attempts are dropped
    epoch: u64,
    open_tx: mpsc::UnboundedSender<OpenOutcome>,
    open_task: Option<JoinHandle<()>>,
    open_deadline: Option<Pin<Box<Sleep>>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,

    probe: LatencyProbe,
    assembler: MessageStreamAssembler,
}

impl Driver {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<ManagerCommand>,
        mut open_rx: mpsc::UnboundedReceiver<OpenOutcome>,
    ) {
        let router = routes();
        debug!("Connection manager started for {}", self.config.url());

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ManagerCommand::Connect) => self.connect(),
                    Some(ManagerCommand::Disconnect) => self.disconnect(),
                    Some(ManagerCommand::Emit(event)) => self.emit(event),
                    Some(ManagerCommand::Shutdown) | None => break,
                },
                Some(outcome) = open_rx.recv() => self.on_open_outcome(outcome),
                frame = next_frame(&mut self.channel) => match frame {
                    Some(frame) => {
                        router.dispatch(&mut self, &frame.name, frame.payload);
                    }
                    None => self.on_channel_lost(),
                },
                _ = expire(&mut self.open_deadline) => self.on_open_timeout(),
                _ = expire(&mut self.reconnect_timer) => self.on_reconnect_timer(),
                _ = self.probe.tick() => self.on_probe_tick(),
                session = session_changed(&mut self.session_rx) => self.on_session_changed(session),
            }
        }

        self.teardown();
    }

    // -------------------------------------------------------------------------
    // Publishing
    // -------------------------------------------------------------------------

    fn publish(&mut self) {
        *self.shared_info.write() = self.info.clone();
        let _ = self.event_tx.send(ClientEvent::Status(self.info.clone()));
    }

    /// Enter `status` and publish exactly one snapshot
    fn transition(&mut self, status: ConnectionStatus) {
        debug!("Connection status: {} -> {}", self.info.status, status);
        self.info.status = status;
        if status != ConnectionStatus::Connected {
            self.info.latency_ms = None;
        }
        self.publish();
    }

    fn notify(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn connect(&mut self) {
        if !self.info.status.is_idle() {
            debug!("connect() ignored while {}", self.info.status);
            return;
        }
        self.begin_attempt();
    }

    fn disconnect(&mut self) {
        self.reconnect_timer = None;
        self.close_channel();

        if self.info.status == ConnectionStatus::Disconnected {
            debug!("disconnect() while already disconnected");
            return;
        }

        info!("Disconnected by client");
        self.transition(ConnectionStatus::Disconnected);
    }

    fn emit(&mut self, event: OutboundEvent) {
        let name = event.name().to_string();

        let channel = match (&self.channel, self.info.status) {
            (Some(channel), ConnectionStatus::Connected) => channel,
            (_, status) => {
                warn!("Cannot emit '{}': not connected (status: {})", name, status);
                return;
            }
        };

        match event.into_frame() {
            Ok(frame) => {
                if let Err(e) = channel.send(frame) {
                    warn!("Failed to emit '{}': {}", name, e);
                }
            }
            Err(e) => error!("Failed to encode '{}': {}", name, e),
        }
    }

    // -------------------------------------------------------------------------
    // Channel lifecycle
    // -------------------------------------------------------------------------

    fn begin_attempt(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;

        let request = OpenRequest {
            url: self.config.url.clone(),
            token: self.session.bearer_token().map(str::to_string),
        };

        info!(
            "Opening channel to {} ({})",
            request.url,
            if request.token.is_some() { "authenticated" } else { "anonymous" }
        );

        self.open_deadline = Some(Box::pin(sleep(self.config.open_timeout)));

        let transport = Arc::clone(&self.transport);
        let open_tx = self.open_tx.clone();
        self.open_task = Some(tokio::spawn(async move {
            let result = transport.open(request).await;
            let _ = open_tx.send(OpenOutcome { epoch, result });
        }));

        self.transition(ConnectionStatus::Connecting);
    }

    fn on_open_outcome(&mut self, outcome: OpenOutcome) {
        if outcome.epoch != self.epoch || self.info.status != ConnectionStatus::Connecting {
            // Dropping a stale handle closes its socket
            debug!("Discarding result of superseded open attempt {}", outcome.epoch);
            return;
        }

        self.open_task = None;

        match outcome.result {
            Ok(channel) => {
                debug!("Channel open, waiting for connect acknowledgement");
                self.channel = Some(channel);
            }
            Err(e) => {
                warn!("Failed to open channel: {}", e);
                self.on_transport_failure(e.to_string());
            }
        }
    }

    fn on_open_timeout(&mut self) {
        self.open_deadline = None;

        if self.info.status == ConnectionStatus::Connecting {
            warn!("Channel open timed out after {:?}", self.config.open_timeout);
            self.on_transport_failure(format!(
                "timeout after {}ms",
                self.config.open_timeout.as_millis()
            ));
        }
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_timer = None;

        if self.info.status == ConnectionStatus::Reconnecting {
            self.begin_attempt();
        }
    }

    fn on_channel_lost(&mut self) {
        debug!("Transport dropped the channel without a disconnect event");
        self.on_disconnect(DisconnectReason::TransportClose);
    }

    fn on_connect(&mut self) {
        if self.info.status != ConnectionStatus::Connecting {
            debug!("Ignoring connect while {}", self.info.status);
            return;
        }

        self.open_deadline = None;
        self.reconnect_timer = None;
        self.info.retry_attempts = 0;
        self.info.last_connected_at = Some(Utc::now());
        self.info.last_error = None;
        self.probe.start();

        info!("Connected to {}", self.config.url());
        self.transition(ConnectionStatus::Connected);
    }

    fn on_disconnect(&mut self, reason: DisconnectReason) {
        if !matches!(
            self.info.status,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            debug!("Ignoring disconnect ({}) while {}", reason, self.info.status);
            return;
        }

        self.close_channel();

        if reason.is_server_initiated() {
            info!("Server closed the channel ({}), not reconnecting", reason);
            self.transition(ConnectionStatus::Disconnected);
        } else {
            warn!("Channel lost: {}", reason);
            self.on_transport_failure(reason.to_string());
        }
    }

    fn on_connect_error(&mut self, message: String) {
        if self.info.status != ConnectionStatus::Connecting {
            debug!("Ignoring connect_error ({}) while {}", message, self.info.status);
            return;
        }

        warn!("Connection error: {}", message);
        self.on_transport_failure(message);
    }

    /// Retry with backoff, or give up once the policy says so
    fn on_transport_failure(&mut self, reason: String) {
        self.close_channel();

        let attempt = self.info.retry_attempts;
        if self.policy.eligible(attempt) {
            let delay = self.policy.delay(attempt);
            self.info.retry_attempts = attempt + 1;
            self.info.last_error = Some(reason);
            self.reconnect_timer = Some(Box::pin(sleep(delay)));

            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                self.policy.max_retries()
            );
            self.transition(ConnectionStatus::Reconnecting);
        } else {
            error!(
                "Giving up after {} reconnection attempts (last error: {})",
                attempt, reason
            );
            self.info.last_error = Some(MAX_RETRIES_REACHED.to_string());
            self.transition(ConnectionStatus::Error);
        }
    }

    fn on_auth_error(&mut self, message: String) {
        error!("Authentication rejected: {}", message);

        self.reconnect_timer = None;
        self.close_channel();
        self.info.last_error = Some(message.clone());
        self.transition(ConnectionStatus::Error);
        self.notify(ClientEvent::AuthError(message));
    }

    fn on_session_changed(&mut self, session: Option<Session>) {
        let session = match session {
            Some(session) => session,
            None => {
                debug!("Session source closed, keeping the last session");
                self.session_rx = None;
                return;
            }
        };

        self.session = session;

        if self.info.status.is_idle() {
            info!(
                "Session changed while {}, connecting with new credentials",
                self.info.status
            );
            self.begin_attempt();
        } else {
            debug!(
                "Session changed while {}, keeping the existing channel",
                self.info.status
            );
        }
    }

    /// Drop the channel and everything scoped to it
    fn close_channel(&mut self) {
        self.probe.stop();
        self.open_deadline = None;

        if let Some(task) = self.open_task.take() {
            task.abort();
        }

        if self.channel.take().is_some() {
            debug!("Channel closed");
        }
    }

    fn teardown(&mut self) {
        self.reconnect_timer = None;
        self.close_channel();
        self.assembler.clear();

        if self.info.status != ConnectionStatus::Disconnected {
            self.transition(ConnectionStatus::Disconnected);
        }

        info!("Connection manager stopped");
    }

    // -------------------------------------------------------------------------
    // Latency
    // -------------------------------------------------------------------------

    fn on_probe_tick(&mut self) {
        if self.info.status != ConnectionStatus::Connected {
            self.probe.stop();
            return;
        }

        if let Some(timestamp) = self.probe.begin(protocol::epoch_ms()) {
            self.emit(OutboundEvent::Ping(timestamp));
        }
    }

    fn on_pong(&mut self, timestamp: i64) {
        if let Some(latency) = self.probe.complete(timestamp, protocol::epoch_ms()) {
            debug!("Latency: {}ms", latency);
            self.info.latency_ms = Some(latency);
            self.publish();
        }
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    fn on_stream_chunk(&mut self, chunk: StreamChunk) {
        match self.assembler.ingest(chunk) {
            Assembly::Partial {
                message_id,
                conversation_id,
                chunk,
            } => self.notify(ClientEvent::MessageDelta {
                message_id,
                conversation_id,
                chunk,
            }),
            Assembly::Completed {
                message,
                last_chunk,
            } => {
                if !last_chunk.is_empty() {
                    self.notify(ClientEvent::MessageDelta {
                        message_id: message.message_id.clone(),
                        conversation_id: message.conversation_id.clone(),
                        chunk: last_chunk,
                    });
                }
                self.notify(ClientEvent::MessageCompleted(message));
            }
            Assembly::Ignored(reason) => debug!("Stream chunk ignored: {:?}", reason),
        }
    }
}

// =============================================================================
// Routes
// =============================================================================

fn routes() -> EventRouter<Driver> {
    EventRouter::new()
        .route(inbound::CONNECT, handle_connect)
        .route(inbound::DISCONNECT, handle_disconnect)
        .route(inbound::CONNECT_ERROR, handle_connect_error)
        .route(inbound::MESSAGE_STREAM, handle_message_stream)
        .route(inbound::TYPING, handle_typing)
        .route(inbound::ERROR, handle_error)
        .route(inbound::AUTH_ERROR, handle_auth_error)
        .route(inbound::RATE_LIMIT, handle_rate_limit)
        .route(inbound::PONG, handle_pong)
}

fn handle_connect(driver: &mut Driver, _payload: Value) -> Result<()> {
    driver.on_connect();
    Ok(())
}

fn handle_disconnect(driver: &mut Driver, payload: Value) -> Result<()> {
    let reason = protocol::payload_message(&payload);
    driver.on_disconnect(DisconnectReason::parse(&reason));
    Ok(())
}

fn handle_connect_error(driver: &mut Driver, payload: Value) -> Result<()> {
    driver.on_connect_error(protocol::payload_message(&payload));
    Ok(())
}

fn handle_message_stream(driver: &mut Driver, payload: Value) -> Result<()> {
    let chunk: StreamChunk = serde_json::from_value(payload)
        .map_err(|e| ChatLinkError::ParseError(format!("malformed message_stream: {}", e)))?;
    driver.on_stream_chunk(chunk);
    Ok(())
}

fn handle_typing(driver: &mut Driver, payload: Value) -> Result<()> {
    let typing: TypingIndicator = serde_json::from_value(payload)
        .map_err(|e| ChatLinkError::ParseError(format!("malformed typing: {}", e)))?;
    driver.notify(ClientEvent::Typing {
        is_typing: typing.is_typing,
    });
    Ok(())
}

fn handle_error(driver: &mut Driver, payload: Value) -> Result<()> {
    error!("Server error: {}", payload);
    driver.notify(ClientEvent::ServerError(payload));
    Ok(())
}

fn handle_auth_error(driver: &mut Driver, payload: Value) -> Result<()> {
    driver.on_auth_error(protocol::payload_message(&payload));
    Ok(())
}

fn handle_rate_limit(driver: &mut Driver, payload: Value) -> Result<()> {
    warn!("Rate limited by server: {}", payload);
    driver.notify(ClientEvent::RateLimited(payload));
    Ok(())
}

fn handle_pong(driver: &mut Driver, payload: Value) -> Result<()> {
    let timestamp = protocol::pong_timestamp(&payload)?;
    driver.on_pong(timestamp);
    Ok(())
}

// =============================================================================
// Select helpers
// =============================================================================

async fn next_frame(channel: &mut Option<ChannelHandle>) -> Option<EventFrame> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn session_changed(rx: &mut Option<watch::Receiver<Session>>) -> Option<Session> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
