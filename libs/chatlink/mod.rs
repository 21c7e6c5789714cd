//! # ChatLink
//!
//! Realtime connection manager for a streaming chat backend.
//!
//! ## Features
//!
//! - **Single-owner state machine**: one driver task owns the connection state
//! - **Backoff reconnects**: exponential delays, bounded attempts, server intent respected
//! - **Stream assembly**: interleaved assistant replies reassembled per message id
//! - **Latency probing**: periodic ping/pong while connected
//! - **Pluggable transport**: Socket.IO over websocket by default

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    assembler, builder, codec, config, connection_info, keepalive, latency, manager, protocol,
    router, ws_transport,
    builder::{states, ConnectionManagerBuilder},
    assembler::{Assembly, MessageStreamAssembler, StreamingMessage},
    config::ManagerConfig,
    connection_info::{ConnectionInfo, ConnectionStatus},
    latency::LatencyProbe,
    manager::ConnectionManager,
    protocol::{ClientEvent, CompletedMessage, DisconnectReason, FileAttachment, OutboundEvent},
    router::{Dispatch, EventRouter},
    ws_transport::WsTransport,
};
