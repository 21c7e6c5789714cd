//! Common test utilities for chatlink integration tests
//!
//! - [`MemoryTransport`]: scripted in-memory transport; each open is accepted,
//!   refused or left hanging, and accepted channels are handed to the test as
//!   a [`ServerPeer`] that plays the backend.
//! - [`MockSocketIoServer`]: a real websocket server speaking just enough
//!   Engine.IO to drive [`chatlink::WsTransport`] end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use chatlink::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const TEST_URL: &str = "http://chat.test";

/// Upper bound for any single wait; paused-clock tests auto-advance to it
pub const WAIT: Duration = Duration::from_secs(600);

// =============================================================================
// In-memory transport
// =============================================================================

/// What the next `open()` does
#[derive(Debug, Clone)]
pub enum OpenScript {
    /// Hand a channel to the test server
    Accept,
    /// Fail immediately
    Fail(&'static str),
    /// Never complete (exercises the open timeout)
    Hang,
}

#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub request: OpenRequest,
    pub at: Instant,
}

struct Shared {
    script: Mutex<VecDeque<OpenScript>>,
    opens: Mutex<Vec<OpenRecord>>,
    accepted: mpsc::UnboundedSender<ServerPeer>,
}

#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Test-side controller for a [`MemoryTransport`]
pub struct MemoryServer {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedReceiver<ServerPeer>,
}

pub fn memory_transport() -> (MemoryTransport, MemoryServer) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        script: Mutex::new(VecDeque::new()),
        opens: Mutex::new(Vec::new()),
        accepted: accepted_tx,
    });

    (
        MemoryTransport {
            shared: Arc::clone(&shared),
        },
        MemoryServer {
            shared,
            accepted: accepted_rx,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, request: OpenRequest) -> Result<ChannelHandle> {
        self.shared.opens.lock().push(OpenRecord {
            request,
            at: Instant::now(),
        });

        let outcome = self
            .shared
            .script
            .lock()
            .pop_front()
            .unwrap_or(OpenScript::Accept);

        match outcome {
            OpenScript::Accept => {
                let (handle, peer) = ChannelHandle::pair();
                let _ = self.shared.accepted.send(ServerPeer { peer });
                Ok(handle)
            }
            OpenScript::Fail(reason) => Err(ChatLinkError::WebSocket(reason.to_string())),
            OpenScript::Hang => std::future::pending().await,
        }
    }
}

impl MemoryServer {
    /// Queue the outcome of upcoming opens (default: accept)
    pub fn script(&self, outcomes: impl IntoIterator<Item = OpenScript>) {
        self.shared.script.lock().extend(outcomes);
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.shared.opens.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.lock().len()
    }

    /// Wait for the next accepted channel
    pub async fn accept(&mut self) -> ServerPeer {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("timed out waiting for an open")
            .expect("transport dropped")
    }

    /// Accept the next channel and acknowledge it with `connect`
    pub async fn accept_and_ack(&mut self) -> ServerPeer {
        let peer = self.accept().await;
        peer.ack();
        peer
    }

    pub fn try_accept(&mut self) -> Option<ServerPeer> {
        self.accepted.try_recv().ok()
    }
}

/// The backend's end of one in-memory channel
pub struct ServerPeer {
    peer: ChannelPeer,
}

impl ServerPeer {
    pub fn emit(&self, name: &str, payload: Value) {
        let _ = self.peer.inbound_tx.send(EventFrame::new(name, payload));
    }

    /// Acknowledge the channel
    pub fn ack(&self) {
        self.emit("connect", Value::Null);
    }

    pub fn disconnect(&self, reason: &str) {
        self.emit("disconnect", Value::String(reason.to_string()));
    }

    /// True once the manager has dropped its end
    pub fn is_closed(&self) -> bool {
        self.peer.inbound_tx.is_closed()
    }

    /// Next frame sent by the manager
    pub async fn next_frame(&mut self) -> Option<EventFrame> {
        timeout(WAIT, self.peer.outbound_rx.recv()).await.ok().flatten()
    }

    /// Next frame named `name`, skipping anything else
    pub async fn next_named(&mut self, name: &str) -> Option<EventFrame> {
        loop {
            let frame = self.next_frame().await?;
            if frame.name == name {
                return Some(frame);
            }
        }
    }

    pub fn try_frame(&mut self) -> Option<EventFrame> {
        self.peer.outbound_rx.try_recv().ok()
    }
}

// =============================================================================
// Manager helpers
// =============================================================================

/// Builder wired to a memory transport: 1s base delay, 3 retries
pub fn test_manager(transport: MemoryTransport) -> ConnectionManagerBuilder<states::HasUrl> {
    ConnectionManager::builder()
        .url(TEST_URL)
        .transport(transport)
        .base_delay(Duration::from_millis(1_000))
        .max_retries(3)
}

/// Next status snapshot, skipping other events
pub async fn next_status(manager: &mut ConnectionManager) -> ConnectionInfo {
    match next_matching(manager, |e| matches!(e, ClientEvent::Status(_))).await {
        ClientEvent::Status(info) => info,
        other => panic!("expected status, got {:?}", other),
    }
}

/// Skip events until a snapshot with `status` arrives
pub async fn wait_for_status(
    manager: &mut ConnectionManager,
    status: ConnectionStatus,
) -> ConnectionInfo {
    match next_matching(
        manager,
        |e| matches!(e, ClientEvent::Status(info) if info.status == status),
    )
    .await
    {
        ClientEvent::Status(info) => info,
        other => panic!("expected status, got {:?}", other),
    }
}

/// Skip events until one satisfies `predicate`
pub async fn next_matching<F>(manager: &mut ConnectionManager, predicate: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = timeout(remaining, manager.next_event())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed");

        verbose_println!("event: {:?}", event);

        if predicate(&event) {
            return event;
        }
    }
}

/// Let the driver task run until it is idle
///
/// Under a paused clock the sleep only completes once every task is waiting.
pub async fn settle() {
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Every event currently queued
pub fn drain_events(manager: &mut ConnectionManager) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Some(event) = manager.try_next_event() {
        events.push(event);
    }
    events
}

pub fn statuses(events: &[ClientEvent]) -> Vec<ConnectionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Status(info) => Some(info.status),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Mock Socket.IO server
// =============================================================================

/// Handshake sent by [`MockSocketIoServer`] on every new websocket
pub const MOCK_HANDSHAKE: &str =
    r#"0{"sid":"mock-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

/// Minimal Engine.IO server; every accepted socket becomes a [`MockSocket`]
pub struct MockSocketIoServer {
    pub addr: SocketAddr,
    sockets: mpsc::UnboundedReceiver<MockSocket>,
}

/// One accepted websocket, already past the engine handshake
pub struct MockSocket {
    /// Request path and query
    pub path: String,
    /// `Authorization` header, if sent
    pub authorization: Option<String>,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<Option<String>>,
}

impl MockSocketIoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (sockets_tx, sockets_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sockets_tx = sockets_tx.clone();
                tokio::spawn(async move {
                    Self::handle_connection(stream, sockets_tx).await;
                });
            }
        });

        Self {
            addr,
            sockets: sockets_rx,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn accept(&mut self) -> MockSocket {
        timeout(Duration::from_secs(5), self.sockets.recv())
            .await
            .expect("timed out waiting for websocket")
            .expect("server stopped")
    }

    pub fn try_accept(&mut self) -> Option<MockSocket> {
        self.sockets.try_recv().ok()
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        sockets_tx: mpsc::UnboundedSender<MockSocket>,
    ) {
        let captured: Arc<Mutex<(String, Option<String>)>> = Arc::default();
        let capture = Arc::clone(&captured);

        let callback = move |request: &Request,
                             response: Response|
              -> std::result::Result<Response, ErrorResponse> {
            let path = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default();
            let authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *capture.lock() = (path, authorization);
            Ok(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();
        if write.send(Message::Text(MOCK_HANDSHAKE.to_string())).await.is_err() {
            return;
        }

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Option<String>>();

        let (path, authorization) = captured.lock().clone();
        let _ = sockets_tx.send(MockSocket {
            path,
            authorization,
            incoming: incoming_rx,
            outgoing: outgoing_tx,
        });

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = incoming_tx.send(text);
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    }
                }
                out = outgoing_rx.recv() => {
                    match out {
                        Some(Some(text)) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        // None asks for a hard close
                        Some(None) | None => {
                            let _ = write.close().await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl MockSocket {
    /// Send one raw text frame
    pub fn send(&self, frame: &str) {
        let _ = self.outgoing.send(Some(frame.to_string()));
    }

    /// Emit a Socket.IO event
    pub fn emit(&self, name: &str, payload: Value) {
        self.send(&format!("42{}", Value::Array(vec![Value::String(name.to_string()), payload])));
    }

    /// Close the websocket without a Socket.IO disconnect
    pub fn drop_socket(&self) {
        let _ = self.outgoing.send(None);
    }

    /// Next text frame from the client
    pub async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(5), self.incoming.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame that is not a latency `ping` event
    pub async fn recv_skipping_pings(&mut self) -> Option<String> {
        loop {
            let frame = self.recv().await?;
            if !frame.starts_with(r#"42["ping""#) {
                return Some(frame);
            }
        }
    }
}
