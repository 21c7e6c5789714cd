//! # ChatLink core
//!
//! The connection manager and the pieces it drives.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatlink::{ClientEvent, ConnectionManager, Session};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut manager = ConnectionManager::builder()
//!         .url("https://chat.example.com")
//!         .session(Session::authenticated("jwt"))
//!         .build()
//!         .unwrap();
//!
//!     manager.connect();
//!
//!     while let Some(event) = manager.next_event().await {
//!         match event {
//!             ClientEvent::Status(info) => println!("status: {}", info.status),
//!             ClientEvent::MessageCompleted(message) => println!("{}", message.full_text),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod assembler;
pub mod builder;
pub mod codec;
pub mod config;
pub mod connection_info;
pub mod keepalive;
pub mod latency;
pub mod manager;
pub mod protocol;
pub mod router;
pub mod ws_transport;

// Re-export main types
pub use assembler::{Assembly, MessageStreamAssembler, StreamingMessage};
pub use builder::{states, ConnectionManagerBuilder};
pub use config::ManagerConfig;
pub use connection_info::{ConnectionInfo, ConnectionStatus};
pub use latency::LatencyProbe;
pub use manager::ConnectionManager;
pub use protocol::{ClientEvent, CompletedMessage, DisconnectReason, FileAttachment, OutboundEvent};
pub use router::{Dispatch, EventRouter};
pub use ws_transport::WsTransport;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new connection manager builder
///
/// # Example
/// ```ignore
/// let manager = chatlink::builder()
///     .url("http://localhost:3001")
///     .session_source(auth.subscribe())
///     .build()?;
/// ```
pub fn builder() -> ConnectionManagerBuilder<builder::states::NoUrl> {
    ConnectionManagerBuilder::new()
}

impl ConnectionManager {
    /// Create a new builder
    pub fn builder() -> ConnectionManagerBuilder<builder::states::NoUrl> {
        ConnectionManagerBuilder::new()
    }
}
