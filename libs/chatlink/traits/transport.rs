use crate::error::{ChatLinkError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// A named event travelling over the channel, in either direction
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub name: String,
    pub payload: Value,
}

impl EventFrame {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Parameters for opening a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Server URL as configured (the transport decides the final endpoint)
    pub url: String,
    /// Bearer token; `None` opens an anonymous channel
    pub token: Option<String>,
}

/// Manager side of an open channel
///
/// Owned exclusively by the connection manager. Dropping the handle closes
/// the channel: the transport observes the closed outbound queue and shuts
/// the underlying socket down.
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: mpsc::UnboundedSender<EventFrame>,
    inbound: mpsc::UnboundedReceiver<EventFrame>,
}

/// Transport side of an open channel
///
/// The transport pushes decoded inbound events (including the lifecycle
/// events `connect`, `connect_error` and `disconnect`) into `inbound_tx` and
/// drains frames queued by the manager from `outbound_rx`.
#[derive(Debug)]
pub struct ChannelPeer {
    pub inbound_tx: mpsc::UnboundedSender<EventFrame>,
    pub outbound_rx: mpsc::UnboundedReceiver<EventFrame>,
}

impl ChannelHandle {
    /// Create a connected handle/peer pair
    pub fn pair() -> (ChannelHandle, ChannelPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        (
            ChannelHandle {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            ChannelPeer {
                inbound_tx,
                outbound_rx,
            },
        )
    }

    /// Queue an event for the transport; never blocks
    pub fn send(&self, frame: EventFrame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|e| ChatLinkError::ChannelSend(format!("channel closed, dropped '{}'", e.0.name)))
    }

    /// Receive the next inbound event; `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.inbound.recv().await
    }
}

/// Trait for opening channels to the backend
///
/// Implement this to plug a different wire protocol (or an in-memory test
/// double) under the connection manager.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new channel
    ///
    /// Returning `Ok` means the socket is up; the manager still waits for a
    /// `connect` event on the handle before treating the channel as
    /// connected. Errors are treated as connect failures.
    async fn open(&self, request: OpenRequest) -> Result<ChannelHandle>;
}
