//! Test utilities and common setup.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{WebSocketStream, accept_async};

use parley::config::{ClientConfig, ConnectionConfig};
use parley::connection::{AgentConnection, ConnectionState};
use parley::transcript::Message;

/// A throwaway loopback WebSocket server that accepts one connection.
pub struct TestServer {
    pub url: String,
    accept: tokio::task::JoinHandle<WebSocketStream<TcpStream>>,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        });
        Self { url, accept }
    }

    /// Wait for the client's handshake and hand back the server side.
    pub async fn accept(self) -> WebSocketStream<TcpStream> {
        self.accept.await.unwrap()
    }
}

/// Client config pointed at `url`, sized for tests.
pub fn test_config(url: &str) -> ClientConfig {
    ClientConfig {
        agent_url: url.to_string(),
        connection: ConnectionConfig {
            connect_timeout_secs: Some(5),
            ..ConnectionConfig::default()
        },
        ..ClientConfig::default()
    }
}

/// Block until the connection reaches `target`, failing the test on timeout.
pub async fn wait_for_state(connection: &AgentConnection, target: ConnectionState) {
    let mut rx = connection.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| *state == target))
        .await
        .expect("timed out waiting for connection state")
        .expect("state watch closed");
}

/// Next transcript entry from a subscription, with a test-sized timeout.
pub async fn next_entry(feed: &mut broadcast::Receiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("timed out waiting for transcript entry")
        .expect("transcript feed closed")
}
