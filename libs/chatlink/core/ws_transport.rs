//! Socket.IO over WebSocket
//!
//! [`WsTransport`] opens the Engine.IO websocket endpoint and spawns one I/O
//! task per channel. The task speaks the framing in [`codec`](crate::codec),
//! answers keep-alive pings, and turns the Socket.IO lifecycle into the
//! `connect` / `connect_error` / `disconnect` events the manager routes.

use crate::codec::{self, Packet};
use crate::keepalive::KeepAlive;
use crate::protocol::{inbound, DisconnectReason};
use crate::traits::*;
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{http, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Engine.IO query appended to every endpoint
const ENGINE_QUERY: &str = "EIO=4&transport=websocket";

/// Production transport: Socket.IO v5 over a websocket
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, request: OpenRequest) -> Result<ChannelHandle> {
        let endpoint = endpoint_url(&request.url)?;

        let mut ws_request = endpoint.as_str().into_client_request().map_err(|e| {
            ChatLinkError::Configuration(format!("invalid server url '{}': {}", endpoint, e))
        })?;

        if let Some(token) = request.token.as_deref() {
            match format!("Bearer {}", token).parse::<http::header::HeaderValue>() {
                Ok(value) => {
                    ws_request
                        .headers_mut()
                        .insert(http::header::AUTHORIZATION, value);
                }
                Err(_) => {
                    warn!("Token is not a valid header value, sending it in the connect packet only");
                }
            }
        }

        debug!("Opening websocket to {}", endpoint);
        let (ws_stream, _) = connect_async(ws_request)
            .await
            .map_err(|e| ChatLinkError::WebSocket(e.to_string()))?;

        let (handle, peer) = ChannelHandle::pair();
        tokio::spawn(run_socket(ws_stream, peer, request.token));

        Ok(handle)
    }
}

/// Rewrite a server URL into its Engine.IO websocket endpoint
///
/// `http` becomes `ws`, `https` becomes `wss`; the `/socket.io/` path and
/// the engine query are appended unless already present.
pub fn endpoint_url(url: &str) -> Result<String> {
    let url = url.trim();

    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| ChatLinkError::Configuration(format!("server url without scheme: '{}'", url)))?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChatLinkError::Configuration(format!(
                "unsupported url scheme '{}'",
                other
            )))
        }
    };

    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut path = path.trim_end_matches('/').to_string();
    if path.is_empty() {
        return Err(ChatLinkError::Configuration(format!("server url without host: '{}'", url)));
    }
    if !path.ends_with("/socket.io") {
        path.push_str("/socket.io");
    }

    let query = match query.filter(|q| !q.is_empty()) {
        Some(q) if q.contains("EIO=") => q.to_string(),
        Some(q) => format!("{}&{}", q, ENGINE_QUERY),
        None => ENGINE_QUERY.to_string(),
    };

    Ok(format!("{}://{}/?{}", scheme, path, query))
}

// =============================================================================
// Socket I/O task
// =============================================================================

/// Drive one websocket until it closes
///
/// Exits when the socket closes, the keep-alive window lapses, or the
/// manager drops its handle. Every exit except the last is reported to the
/// manager as a `disconnect` event.
async fn run_socket(ws_stream: WsStream, peer: ChannelPeer, token: Option<String>) {
    let ChannelPeer {
        inbound_tx,
        mut outbound_rx,
    } = peer;
    let (mut write, mut read) = ws_stream.split();
    let mut keepalive = KeepAlive::new();

    let reason = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reason) = on_frame(
                            &text,
                            &mut write,
                            &mut keepalive,
                            &inbound_tx,
                            token.as_deref(),
                        ).await {
                            break Some(reason);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Server closed the websocket: {:?}", frame);
                        break Some(DisconnectReason::TransportClose);
                    }
                    Some(Ok(other)) => {
                        debug!("Ignoring non-text websocket message ({} bytes)", other.len());
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break Some(DisconnectReason::TransportError);
                    }
                    None => {
                        warn!("WebSocket stream closed");
                        break Some(DisconnectReason::TransportClose);
                    }
                }
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        let text = codec::encode(&Packet::event(frame.name, frame.payload));
                        if let Err(e) = write.send(Message::Text(text)).await {
                            error!("Failed to send event: {}", e);
                            break Some(DisconnectReason::TransportError);
                        }
                    }
                    None => {
                        debug!("Channel handle dropped, leaving namespace");
                        let leave = codec::encode(&Packet::Disconnect { namespace: None });
                        let _ = write.send(Message::Text(leave)).await;
                        break None;
                    }
                }
            }

            _ = keepalive.expired() => {
                warn!("No ping from server within the keep-alive window");
                break Some(DisconnectReason::PingTimeout);
            }
        }
    };

    let _ = write.close().await;

    if let Some(reason) = reason {
        info!("Socket closed: {}", reason);
        let _ = inbound_tx.send(reason.into_frame());
    }
}

/// Handle one decoded text frame; `Some` ends the socket
async fn on_frame(
    text: &str,
    write: &mut WsSink,
    keepalive: &mut KeepAlive,
    inbound_tx: &mpsc::UnboundedSender<EventFrame>,
    token: Option<&str>,
) -> Option<DisconnectReason> {
    let packet = match codec::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropping undecodable frame: {}", e);
            return None;
        }
    };

    let reply = match packet {
        Packet::Open(handshake) => {
            debug!(
                "Engine open (sid: {}, ping interval: {}ms, ping timeout: {}ms)",
                handshake.sid, handshake.ping_interval, handshake.ping_timeout
            );
            keepalive.arm(handshake.keepalive_window());
            Some(Packet::connect_with_token(token))
        }
        Packet::Ping => {
            keepalive.record_ping();
            Some(Packet::Pong)
        }
        Packet::Pong | Packet::Noop => None,
        Packet::Close => return Some(DisconnectReason::TransportClose),
        Packet::Connect { .. } => {
            let _ = inbound_tx.send(EventFrame::new(inbound::CONNECT, serde_json::Value::Null));
            None
        }
        Packet::ConnectError { data, .. } => {
            let _ = inbound_tx.send(EventFrame::new(inbound::CONNECT_ERROR, data));
            None
        }
        Packet::Disconnect { .. } => return Some(DisconnectReason::ServerDisconnect),
        Packet::Event { name, payload, .. } => {
            let _ = inbound_tx.send(EventFrame::new(name, payload));
            None
        }
    };

    if let Some(reply) = reply {
        if let Err(e) = write.send(Message::Text(codec::encode(&reply))).await {
            error!("Failed to answer server: {}", e);
            return Some(DisconnectReason::TransportError);
        }
    }

    None
}
