//! # ChatLink Traits
//!
//! Core traits and types shared across the connection manager:
//!
//! - **Transport**: Open a channel to the backend
//! - **ReconnectPolicy**: Backoff delay and retry eligibility
//! - **EventHandler**: Handle one named inbound event
//! - **Session**: Credentials published by the auth collaborator
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatlink::traits::*;
//!
//! struct LoopbackTransport;
//!
//! #[async_trait]
//! impl Transport for LoopbackTransport {
//!     async fn open(&self, request: OpenRequest) -> Result<ChannelHandle> {
//!         let (handle, peer) = ChannelHandle::pair();
//!         // hand `peer` to whatever plays the server
//!         Ok(handle)
//!     }
//! }
//! ```

pub mod error;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use error::{ChatLinkError, Result};
pub use reconnect::{ExponentialBackoff, ReconnectPolicy};
pub use router::EventHandler;
pub use session::Session;
pub use transport::{ChannelHandle, ChannelPeer, EventFrame, OpenRequest, Transport};
