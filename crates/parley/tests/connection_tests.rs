//! End-to-end tests for the connection manager against a loopback server.

mod common;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use common::{TestServer, next_entry, test_config, wait_for_state};
use parley::config::ClientConfig;
use parley::connection::{AgentConnection, ConnectionState, NOT_CONNECTED_NOTICE};
use parley::error::ClientError;
use parley::transcript::Sender;
use parley_protocol::{AgentFrame, FrameKind};

#[tokio::test]
async fn test_send_while_open_transmits_verbatim_and_logs() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    connection.send("hello").await;

    let frame = remote.next().await.unwrap().unwrap();
    assert_eq!(frame.to_text().unwrap(), "hello");

    let entries = connection.transcript().snapshot().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sender, Sender::User);
    assert_eq!(entries[0].kind, FrameKind::Status);
    assert_eq!(entries[0].content, "hello");
}

#[tokio::test]
async fn test_sends_append_in_call_order() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    for text in ["one", "two", "three"] {
        connection.send(text).await;
    }

    for expected in ["one", "two", "three"] {
        let frame = remote.next().await.unwrap().unwrap();
        assert_eq!(frame.to_text().unwrap(), expected);
    }

    let entries = connection.transcript().snapshot().await;
    let contents: Vec<&str> = entries.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
    assert!(entries.iter().all(|m| m.sender == Sender::User));
}

#[tokio::test]
async fn test_scenario_send_then_reply() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    let mut feed = connection.transcript().subscribe();

    connection.send("hello").await;
    assert_eq!(remote.next().await.unwrap().unwrap().to_text().unwrap(), "hello");

    let reply = serde_json::to_string(&AgentFrame::status("hi back")).unwrap();
    remote.send(WsMessage::text(reply)).await.unwrap();

    let first = next_entry(&mut feed).await;
    assert_eq!((first.sender, first.kind, first.content.as_str()),
        (Sender::User, FrameKind::Status, "hello"));

    let second = next_entry(&mut feed).await;
    assert_eq!((second.sender, second.kind, second.content.as_str()),
        (Sender::Agent, FrameKind::Status, "hi back"));

    let entries = connection.transcript().snapshot().await;
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_inbound_image_payload_is_not_mutated() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    let mut feed = connection.transcript().subscribe();
    let payload = "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQAAAQ==";
    let frame = serde_json::to_string(&AgentFrame::image(payload)).unwrap();
    remote.send(WsMessage::text(frame)).await.unwrap();

    let entry = next_entry(&mut feed).await;
    assert_eq!(entry.sender, Sender::Agent);
    assert_eq!(entry.kind, FrameKind::Image);
    assert_eq!(entry.content, payload);
}

#[tokio::test]
async fn test_unrecognized_frame_kind_passes_through() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    let mut feed = connection.transcript().subscribe();
    remote
        .send(WsMessage::text(r#"{"type":"progress","content":"step 2 of 5"}"#))
        .await
        .unwrap();

    let entry = next_entry(&mut feed).await;
    assert_eq!(entry.kind, FrameKind::Other("progress".to_string()));
    assert_eq!(entry.content, "step 2 of 5");
}

#[tokio::test]
async fn test_malformed_frame_is_dropped_and_session_survives() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    let mut feed = connection.transcript().subscribe();
    remote
        .send(WsMessage::text("definitely not a frame"))
        .await
        .unwrap();
    remote
        .send(WsMessage::text(r#"{"type":"status","content":"still here"}"#))
        .await
        .unwrap();

    // Only the well-formed frame lands in the transcript.
    let entry = next_entry(&mut feed).await;
    assert_eq!(entry.content, "still here");
    assert_eq!(connection.transcript().len().await, 1);
    assert_eq!(connection.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_send_while_connecting_appends_error_notice() {
    // A listener that never completes the WebSocket handshake keeps the
    // client parked at Connecting.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let mut config = test_config(&url);
    config.connection.connect_timeout_secs = None;

    let connection = AgentConnection::open(&config).unwrap();
    assert_eq!(connection.state(), ConnectionState::Connecting);

    connection.send("hello").await;

    let entries = connection.transcript().snapshot().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sender, Sender::Agent);
    assert_eq!(entries[0].kind, FrameKind::Status);
    assert_eq!(entries[0].content, NOT_CONNECTED_NOTICE);
    assert_eq!(connection.state(), ConnectionState::Connecting);
    drop(listener);
}

#[tokio::test]
async fn test_send_after_close_never_transmits() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    connection.close().await;
    wait_for_state(&connection, ConnectionState::Closed).await;

    connection.send("too late").await;

    let entries = connection.transcript().snapshot().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sender, Sender::Agent);
    assert_eq!(entries[0].content, NOT_CONNECTED_NOTICE);

    // The server only ever observes the close handshake, never a text frame.
    let mut saw_text = false;
    while let Some(Ok(frame)) = remote.next().await {
        if frame.is_text() {
            saw_text = true;
        }
    }
    assert!(!saw_text);
}

#[tokio::test]
async fn test_close_twice_is_idempotent() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let _remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    connection.close().await;
    connection.close().await;
    wait_for_state(&connection, ConnectionState::Closed).await;

    connection.close().await;
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_server_close_moves_state_to_closed() {
    let server = TestServer::bind().await;
    let connection = AgentConnection::open(&test_config(&server.url)).unwrap();
    let mut remote = server.accept().await;
    wait_for_state(&connection, ConnectionState::Open).await;

    remote.close(None).await.unwrap();
    wait_for_state(&connection, ConnectionState::Closed).await;
}

#[tokio::test]
async fn test_connection_refused_moves_state_to_closed() {
    // Grab a port the kernel just released; nothing is listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connection = AgentConnection::open(&test_config(&format!("ws://{addr}"))).unwrap();
    wait_for_state(&connection, ConnectionState::Closed).await;
}

#[tokio::test]
async fn test_invalid_endpoint_is_rejected_up_front() {
    let config = ClientConfig {
        agent_url: "not a url".to_string(),
        ..ClientConfig::default()
    };

    let err = AgentConnection::open(&config).err().expect("open must fail");
    match err {
        ClientError::InvalidEndpoint { url, .. } => assert_eq!(url, "not a url"),
        other => panic!("expected InvalidEndpoint, got {other:?}"),
    }
}
