//! Engine.IO v4 / Socket.IO v5 text framing
//!
//! ```text
//! "0{...}"          engine OPEN (handshake: sid, pingInterval, pingTimeout)
//! "1"               engine CLOSE
//! "2" / "3"         engine PING / PONG
//! "6"               engine NOOP
//! "4<socket.io>"    engine MESSAGE carrying a Socket.IO packet:
//!     "0[/ns,]{...}"        CONNECT (client auth / server ack)
//!     "1[/ns,]"             DISCONNECT
//!     "2[/ns,][id][...]"    EVENT   ["name", payload]
//!     "4[/ns,]{...}"        CONNECT_ERROR
//! ```
//!
//! Only text frames are handled; binary attachments are not part of the chat
//! protocol.

use crate::traits::*;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Engine.IO handshake sent by the server in the OPEN packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Handshake {
    /// Longest silence tolerated before the server is considered gone
    pub fn keepalive_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// A decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect {
        namespace: Option<String>,
        data: Option<Value>,
    },
    Disconnect {
        namespace: Option<String>,
    },
    Event {
        namespace: Option<String>,
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    ConnectError {
        namespace: Option<String>,
        data: Value,
    },
}

impl Packet {
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Packet::Event {
            namespace: None,
            ack_id: None,
            name: name.into(),
            payload,
        }
    }

    /// Namespace CONNECT carrying the bearer token, if any
    pub fn connect_with_token(token: Option<&str>) -> Self {
        Packet::Connect {
            namespace: None,
            data: token.map(|t| serde_json::json!({ "token": t })),
        }
    }
}

/// Decode one text frame
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let engine_type = chars
        .next()
        .ok_or_else(|| ChatLinkError::Protocol("empty frame".to_string()))?;
    let rest = chars.as_str();

    match engine_type {
        '0' => {
            let handshake: Handshake = serde_json::from_str(rest)
                .map_err(|e| ChatLinkError::Protocol(format!("bad handshake: {}", e)))?;
            Ok(Packet::Open(handshake))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(rest),
        '6' => Ok(Packet::Noop),
        other => Err(ChatLinkError::Protocol(format!(
            "unsupported engine packet type '{}'",
            other
        ))),
    }
}

fn decode_socket_packet(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let packet_type = chars
        .next()
        .ok_or_else(|| ChatLinkError::Protocol("empty socket.io packet".to_string()))?;
    let (namespace, rest) = split_namespace(chars.as_str());

    match packet_type {
        '0' => Ok(Packet::Connect {
            namespace,
            data: parse_optional_json(rest)?,
        }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let ack_id = if digits > 0 {
                Some(rest[..digits].parse::<u64>().map_err(|e| {
                    ChatLinkError::Protocol(format!("bad ack id: {}", e))
                })?)
            } else {
                None
            };
            let (name, payload) = parse_event_body(&rest[digits..])?;
            Ok(Packet::Event {
                namespace,
                ack_id,
                name,
                payload,
            })
        }
        '4' => Ok(Packet::ConnectError {
            namespace,
            data: parse_optional_json(rest)?.unwrap_or(Value::Null),
        }),
        other => Err(ChatLinkError::Protocol(format!(
            "unsupported socket.io packet type '{}'",
            other
        ))),
    }
}

/// Split a leading `/namespace,` off a packet body
fn split_namespace(body: &str) -> (Option<String>, &str) {
    if !body.starts_with('/') {
        return (None, body);
    }

    match body.find(',') {
        Some(idx) => (Some(body[..idx].to_string()), &body[idx + 1..]),
        None => (Some(body.to_string()), ""),
    }
}

fn parse_optional_json(body: &str) -> Result<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| ChatLinkError::Protocol(format!("bad packet data: {}", e)))
}

fn parse_event_body(body: &str) -> Result<(String, Value)> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ChatLinkError::Protocol(format!("bad event data: {}", e)))?;

    let mut items = match value {
        Value::Array(items) => items,
        _ => return Err(ChatLinkError::Protocol("event data is not an array".to_string())),
    };

    if items.is_empty() {
        return Err(ChatLinkError::Protocol("event without name".to_string()));
    }

    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return Err(ChatLinkError::Protocol("event name is not a string".to_string())),
    };

    let payload = match items.len() {
        0 => Value::Null,
        1 => items.remove(0),
        _ => Value::Array(items),
    };

    Ok((name, payload))
}

/// Encode one packet as a text frame
pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(_) => "0".to_string(),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Noop => "6".to_string(),
        Packet::Connect { namespace, data } => {
            let mut out = format!("40{}", namespace_prefix(namespace));
            if let Some(data) = data {
                out.push_str(&data.to_string());
            }
            out
        }
        Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
        Packet::Event {
            namespace,
            ack_id,
            name,
            payload,
        } => {
            let body = if payload.is_null() {
                Value::Array(vec![Value::String(name.clone())])
            } else {
                Value::Array(vec![Value::String(name.clone()), payload.clone()])
            };
            let ack = ack_id.map(|id| id.to_string()).unwrap_or_default();
            format!("42{}{}{}", namespace_prefix(namespace), ack, body)
        }
        Packet::ConnectError { namespace, data } => {
            format!("44{}{}", namespace_prefix(namespace), data)
        }
    }
}

fn namespace_prefix(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) if ns != "/" => format!("{},", ns),
        _ => String::new(),
    }
}
