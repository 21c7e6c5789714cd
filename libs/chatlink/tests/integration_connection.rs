//! Integration tests for the connection lifecycle
//!
//! These tests drive the manager through an in-memory transport and verify
//! state transitions, session handling and outbound events.

mod common;

use chatlink::*;
use common::*;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test(start_paused = true)]
async fn test_connect_lifecycle() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport)
        .session(Session::authenticated("jwt-1"))
        .build()
        .unwrap();

    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    manager.connect();

    let connecting = next_status(&mut manager).await;
    assert_eq!(connecting.status, ConnectionStatus::Connecting);

    let _peer = server.accept_and_ack().await;
    let connected = next_status(&mut manager).await;
    assert_eq!(connected.status, ConnectionStatus::Connected);
    assert_eq!(connected.retry_attempts, 0);
    assert_eq!(connected.max_retries, 3);
    assert!(connected.last_connected_at.is_some());
    assert!(connected.latency_ms.is_none());

    assert!(manager.is_connected());
    assert_eq!(manager.info(), connected);

    let opens = server.opens();
    assert_eq!(opens[0].request.url, TEST_URL);
    assert_eq!(opens[0].request.token.as_deref(), Some("jwt-1"));
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_session_opens_without_token() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    assert_eq!(server.opens()[0].request.token, None);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_noop_while_active() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();
    manager.connect();

    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    manager.connect();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(server.open_count(), 1);
    assert!(statuses(&drain_events(&mut manager)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_when_idle_publishes_nothing() {
    let (transport, _server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();

    manager.disconnect();
    manager.disconnect();
    settle().await;

    assert!(drain_events(&mut manager).is_empty());
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_channel() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    manager.disconnect();
    let info = wait_for_status(&mut manager, ConnectionStatus::Disconnected).await;
    assert!(info.latency_ms.is_none());
    assert!(peer.is_closed());

    // Reconnect works after a manual disconnect
    manager.connect();
    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_session_change_while_connected_keeps_channel() {
    let (transport, mut server) = memory_transport();
    let (session_tx, session_rx) = watch::channel(Session::authenticated("old"));

    let mut manager = test_manager(transport)
        .session_source(session_rx)
        .build()
        .unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    session_tx.send(Session::authenticated("new")).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!peer.is_closed());
    assert_eq!(server.open_count(), 1);
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    // The next open picks up the new credentials
    peer.disconnect("transport close");
    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    let opens = server.opens();
    assert_eq!(opens[0].request.token.as_deref(), Some("old"));
    assert_eq!(opens[1].request.token.as_deref(), Some("new"));
}

#[tokio::test(start_paused = true)]
async fn test_session_change_while_disconnected_connects() {
    let (transport, mut server) = memory_transport();
    let (session_tx, session_rx) = watch::channel(Session::anonymous());

    let mut manager = test_manager(transport)
        .session_source(session_rx)
        .build()
        .unwrap();

    settle().await;
    assert_eq!(server.open_count(), 0);

    session_tx.send(Session::authenticated("fresh")).unwrap();
    wait_for_status(&mut manager, ConnectionStatus::Connecting).await;

    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    assert_eq!(server.opens()[0].request.token.as_deref(), Some("fresh"));
}

#[tokio::test(start_paused = true)]
async fn test_session_change_after_auth_error_reconnects() {
    let (transport, mut server) = memory_transport();
    let (session_tx, session_rx) = watch::channel(Session::authenticated("expired"));

    let mut manager = test_manager(transport)
        .session_source(session_rx)
        .build()
        .unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    peer.emit("auth_error", json!({ "message": "Token expired" }));
    wait_for_status(&mut manager, ConnectionStatus::Error).await;

    session_tx.send(Session::authenticated("renewed")).unwrap();
    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    assert_eq!(server.opens()[1].request.token.as_deref(), Some("renewed"));
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_source_is_harmless() {
    let (transport, mut server) = memory_transport();
    let (session_tx, session_rx) = watch::channel(Session::authenticated("kept"));

    let mut manager = test_manager(transport)
        .session_source(session_rx)
        .build()
        .unwrap();
    drop(session_tx);
    settle().await;

    manager.connect();
    let _peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;
    assert_eq!(server.opens()[0].request.token.as_deref(), Some("kept"));
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_enters_error_without_retry() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    peer.emit("auth_error", json!({ "message": "Token expired" }));

    let info = next_status(&mut manager).await;
    assert_eq!(info.status, ConnectionStatus::Error);
    assert_eq!(info.last_error.as_deref(), Some("Token expired"));

    let event = next_matching(&mut manager, |e| matches!(e, ClientEvent::AuthError(_))).await;
    assert_eq!(event, ClientEvent::AuthError("Token expired".to_string()));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(peer.is_closed());
    assert_eq!(server.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_emit_while_disconnected_is_dropped() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();

    manager.send_message("lost", "conv-1", None);
    manager.connect();

    let mut peer = server.accept().await;
    // Still connecting: dropped as well
    manager.send_typing("conv-1", true);
    settle().await;
    peer.ack();
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    manager.send_message("kept", "conv-1", None);
    let frame = peer.next_frame().await.unwrap();
    assert_eq!(frame.name, "send_message");
    assert_eq!(frame.payload["content"], "kept");
    assert!(peer.try_frame().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_outbound_payload_shapes() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let mut peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    manager.send_message(
        "see attached",
        "conv-9",
        Some(vec![FileAttachment {
            name: "notes.txt".to_string(),
            size: 42,
            mime_type: "text/plain".to_string(),
        }]),
    );
    let frame = peer.next_frame().await.unwrap();
    assert_eq!(frame.name, "send_message");
    assert_eq!(frame.payload["content"], "see attached");
    assert_eq!(frame.payload["conversationId"], "conv-9");
    assert_eq!(frame.payload["files"][0]["type"], "text/plain");
    assert!(frame.payload["timestamp"].as_str().unwrap().ends_with('Z'));

    manager.send_message("plain", "conv-9", None);
    let frame = peer.next_frame().await.unwrap();
    assert!(frame.payload.get("files").is_none());

    manager.send_typing("conv-9", false);
    let frame = peer.next_frame().await.unwrap();
    assert_eq!(frame.name, "typing");
    assert_eq!(frame.payload["conversationId"], "conv-9");
    assert_eq!(frame.payload["isTyping"], false);

    manager.emit("mark_read", json!({ "messageId": "m-1" }));
    let frame = peer.next_frame().await.unwrap();
    assert_eq!(frame, EventFrame::new("mark_read", json!({ "messageId": "m-1" })));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_advisory() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    peer.emit("rate_limit", json!({ "retryAfter": 5 }));
    let event = next_matching(&mut manager, |e| matches!(e, ClientEvent::RateLimited(_))).await;
    assert_eq!(event, ClientEvent::RateLimited(json!({ "retryAfter": 5 })));

    settle().await;
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert!(!peer.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_server_error_is_forwarded() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    peer.emit("error", json!({ "message": "conversation not found" }));
    let event = next_matching(&mut manager, |e| matches!(e, ClientEvent::ServerError(_))).await;
    assert_eq!(
        event,
        ClientEvent::ServerError(json!({ "message": "conversation not found" }))
    );
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_channel() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    manager.shutdown().await;
    assert!(peer.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_drop_tears_down() {
    let (transport, mut server) = memory_transport();
    let mut manager = test_manager(transport).build().unwrap();
    manager.connect();

    let peer = server.accept_and_ack().await;
    wait_for_status(&mut manager, ConnectionStatus::Connected).await;

    drop(manager);
    settle().await;
    assert!(peer.is_closed());
}
