//! Chat event vocabulary
//!
//! Names and payload shapes of the events exchanged with the chat backend,
//! plus the [`ClientEvent`] stream surfaced to consumers.

use crate::connection_info::ConnectionInfo;
use crate::traits::*;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Inbound event names
pub mod inbound {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const MESSAGE_STREAM: &str = "message_stream";
    pub const TYPING: &str = "typing";
    pub const ERROR: &str = "error";
    pub const AUTH_ERROR: &str = "auth_error";
    pub const RATE_LIMIT: &str = "rate_limit";
    pub const PONG: &str = "pong";
}

/// Outbound event names
pub mod outbound {
    pub const SEND_MESSAGE: &str = "send_message";
    pub const TYPING: &str = "typing";
    pub const PING: &str = "ping";
}

// =============================================================================
// Disconnect reasons
// =============================================================================

/// Why a channel closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the namespace on purpose
    ServerDisconnect,
    /// This client closed the channel
    ClientDisconnect,
    /// The server stopped answering keep-alive
    PingTimeout,
    /// The socket closed
    TransportClose,
    /// The socket failed
    TransportError,
    /// The server sent an undecodable frame
    ParseError,
    Other(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::ParseError => "parse error",
            DisconnectReason::Other(reason) => reason,
        }
    }

    pub fn parse(reason: &str) -> Self {
        match reason {
            "io server disconnect" => DisconnectReason::ServerDisconnect,
            "io client disconnect" => DisconnectReason::ClientDisconnect,
            "ping timeout" => DisconnectReason::PingTimeout,
            "transport close" => DisconnectReason::TransportClose,
            "transport error" => DisconnectReason::TransportError,
            "parse error" => DisconnectReason::ParseError,
            other => DisconnectReason::Other(other.to_string()),
        }
    }

    /// Server intent is authoritative: these closes are never retried
    #[inline]
    pub fn is_server_initiated(&self) -> bool {
        matches!(self, DisconnectReason::ServerDisconnect)
    }

    /// Frame carrying this reason as a `disconnect` event
    pub fn into_frame(self) -> EventFrame {
        EventFrame::new(inbound::DISCONNECT, Value::String(self.as_str().to_string()))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outbound payloads
// =============================================================================

/// File metadata attached to a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub content: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileAttachment>>,
    /// ISO-8601
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    pub is_typing: bool,
    /// ISO-8601
    pub timestamp: String,
}

/// Events produced by this client
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    SendMessage(SendMessagePayload),
    Typing(TypingPayload),
    /// Epoch milliseconds
    Ping(i64),
    /// Any other event, forwarded verbatim
    Custom { name: String, payload: Value },
}

impl OutboundEvent {
    pub fn send_message(
        content: impl Into<String>,
        conversation_id: impl Into<String>,
        files: Option<Vec<FileAttachment>>,
    ) -> Self {
        OutboundEvent::SendMessage(SendMessagePayload {
            content: content.into(),
            conversation_id: conversation_id.into(),
            files,
            timestamp: iso_timestamp(),
        })
    }

    pub fn typing(conversation_id: impl Into<String>, is_typing: bool) -> Self {
        OutboundEvent::Typing(TypingPayload {
            conversation_id: conversation_id.into(),
            is_typing,
            timestamp: iso_timestamp(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            OutboundEvent::SendMessage(_) => outbound::SEND_MESSAGE,
            OutboundEvent::Typing(_) => outbound::TYPING,
            OutboundEvent::Ping(_) => outbound::PING,
            OutboundEvent::Custom { name, .. } => name,
        }
    }

    pub fn into_frame(self) -> Result<EventFrame> {
        let frame = match self {
            OutboundEvent::SendMessage(payload) => {
                EventFrame::new(outbound::SEND_MESSAGE, serde_json::to_value(payload)?)
            }
            OutboundEvent::Typing(payload) => {
                EventFrame::new(outbound::TYPING, serde_json::to_value(payload)?)
            }
            OutboundEvent::Ping(timestamp) => EventFrame::new(outbound::PING, Value::from(timestamp)),
            OutboundEvent::Custom { name, payload } => EventFrame::new(name, payload),
        };
        Ok(frame)
    }
}

/// Current UTC time as ISO-8601 with millisecond precision
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current UTC time in epoch milliseconds
pub fn epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Inbound payloads
// =============================================================================

/// One `message_stream` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub chunk: String,
    #[serde(default)]
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub is_typing: bool,
}

/// Extract a human-readable message from an error-ish payload
///
/// Accepts a bare string or an object with `message` / `error` fields;
/// anything else is rendered as JSON.
pub fn payload_message(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

/// Extract the timestamp echoed by a `pong`
///
/// Accepts a bare number or `{ "timestamp": number }`.
pub fn pong_timestamp(payload: &Value) -> Result<i64> {
    let value = match payload {
        Value::Object(map) => map.get("timestamp").unwrap_or(&Value::Null),
        other => other,
    };

    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| ChatLinkError::ParseError(format!("pong without timestamp: {}", payload)))
}

// =============================================================================
// Consumer events
// =============================================================================

/// A fully assembled assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub full_text: String,
}

/// Events surfaced by the connection manager to its consumers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection snapshot; one per state transition, plus latency updates
    Status(ConnectionInfo),
    /// A chunk accepted for a message still streaming
    MessageDelta {
        message_id: String,
        conversation_id: String,
        chunk: String,
    },
    /// A streamed message finished; emitted exactly once per message id
    MessageCompleted(CompletedMessage),
    /// Remote typing indicator changed
    Typing { is_typing: bool },
    /// Server reported an error
    ServerError(Value),
    /// Server rejected the credentials; re-authenticate then `connect()`
    AuthError(String),
    /// Advisory: the server is throttling this client
    RateLimited(Value),
}
