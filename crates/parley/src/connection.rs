//! WebSocket connection management.
//!
//! One [`AgentConnection`] owns one socket for the lifetime of a chat
//! session. Opening spawns a session task that performs the handshake and
//! then drives all I/O from a single select loop; every inbound socket event
//! is routed through one dispatch function. Connection loss is terminal:
//! there is no reconnect, and a closed session only ever reports
//! [`ConnectionState::Closed`].

use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use parley_protocol::AgentFrame;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transcript::{Message, Transcript};

/// Content of the entry synthesized when sending while not connected.
/// Attributed to the agent for display purposes; it never crossed the wire.
pub const NOT_CONNECTED_NOTICE: &str = "Error: Not connected to the server.";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Lifecycle of the single socket a session owns.
///
/// Closed is terminal. A session that loses its connection stays closed; the
/// operator starts a new session to talk to the agent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Commands queued from the handle to the session task.
enum Outbound {
    Text(String),
    Shutdown,
}

/// Apply a state change if it is a legal transition, ignore it otherwise.
/// Legal: Connecting -> Open, Connecting -> Closed, Open -> Closed.
fn transition(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state.send_if_modified(|current| {
        let allowed = matches!(
            (*current, next),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Connecting, ConnectionState::Closed)
                | (ConnectionState::Open, ConnectionState::Closed)
        );
        if allowed {
            debug!("connection state: {current} -> {next}");
            *current = next;
        }
        allowed
    });
}

/// Handle to one chat session's socket.
///
/// Constructed only through [`open`](AgentConnection::open), so a handle can
/// never own more than one connection. Dropping the handle aborts the
/// session task and releases the socket on every exit path, including
/// teardown racing an in-flight handshake.
pub struct AgentConnection {
    transcript: Transcript,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    outbound_tx: mpsc::Sender<Outbound>,
    session: JoinHandle<()>,
}

impl AgentConnection {
    /// Start a session against the configured endpoint.
    ///
    /// Validates that the endpoint is a well-formed WebSocket URL, then
    /// returns immediately with the state at [`ConnectionState::Connecting`];
    /// the spawned session task moves it to Open or Closed as the handshake
    /// resolves. Must be called from within a tokio runtime.
    pub fn open(config: &ClientConfig) -> ClientResult<Self> {
        let request = config
            .agent_url
            .as_str()
            .into_client_request()
            .map_err(|err| ClientError::InvalidEndpoint {
                url: config.agent_url.clone(),
                message: err.to_string(),
            })?;

        let transcript = Transcript::new(config.connection.event_buffer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.connection.outbound_buffer);

        let connect_timeout = config.connection.connect_timeout_secs.map(Duration::from_secs);

        info!("connecting to agent at {}", config.agent_url);
        let session = tokio::spawn(run_session(
            request,
            connect_timeout,
            transcript.clone(),
            state_tx.clone(),
            outbound_rx,
        ));

        Ok(Self {
            transcript,
            state_tx,
            state_rx,
            outbound_tx,
            session,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection-state changes (the status indicator's feed).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The session's conversation record.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send one line of operator input.
    ///
    /// While the connection is open this appends a user entry to the
    /// transcript and transmits the text verbatim as a single frame. In any
    /// other state nothing is transmitted; a synthetic agent-attributed
    /// error entry is appended instead. Never fails.
    pub async fn send(&self, text: impl Into<String>) {
        let text = text.into();

        if self.state() != ConnectionState::Open {
            self.transcript
                .push(Message::agent_status(NOT_CONNECTED_NOTICE))
                .await;
            return;
        }

        self.transcript.push(Message::user_status(text.clone())).await;

        if self.outbound_tx.send(Outbound::Text(text)).await.is_err() {
            // The session ended between the state check and the queue
            // write; the state watch already reflects Closed.
            warn!("dropped outbound frame: session is gone");
        }
    }

    /// Request graceful teardown: close frame, then socket release.
    ///
    /// Safe to call any number of times and in any state; once the session
    /// is gone this is a no-op.
    pub async fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Shutdown).await;
    }
}

impl Drop for AgentConnection {
    fn drop(&mut self) {
        self.session.abort();
        transition(&self.state_tx, ConnectionState::Closed);
    }
}

/// Drive one socket from handshake to teardown.
async fn run_session(
    request: Request,
    connect_timeout: Option<Duration>,
    transcript: Transcript,
    state: watch::Sender<ConnectionState>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    let connect = connect_async(request);
    tokio::pin!(connect);

    let socket = tokio::select! {
        result = &mut connect => match result {
            Ok((socket, _response)) => socket,
            Err(err) => {
                warn!("websocket handshake failed: {err}");
                transition(&state, ConnectionState::Closed);
                return;
            }
        },
        _ = handshake_deadline(connect_timeout) => {
            warn!("websocket handshake timed out");
            transition(&state, ConnectionState::Closed);
            return;
        }
        _ = outbound_rx.recv() => {
            // Teardown requested while the handshake was still in flight;
            // dropping the pending connect releases the socket.
            debug!("session shut down during handshake");
            transition(&state, ConnectionState::Closed);
            return;
        }
    };

    transition(&state, ConnectionState::Open);
    info!("connected to agent");

    let (mut sink, mut source) = socket.split();

    loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = sink.send(WsMessage::text(text)).await {
                        warn!("failed to transmit frame: {err}");
                        break;
                    }
                }
                Some(Outbound::Shutdown) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            event = source.next() => match event {
                Some(Ok(frame)) => {
                    if !dispatch_frame(frame, &transcript, &mut sink).await {
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!("websocket error: {err}");
                    break;
                }
                None => {
                    debug!("websocket stream ended");
                    break;
                }
            },
        }
    }

    transition(&state, ConnectionState::Closed);
    info!("disconnected from agent");
}

/// With no configured deadline the handshake may pend forever, matching the
/// wire protocol's own (absent) timeout policy.
async fn handshake_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending::<()>().await,
    }
}

/// Apply one inbound socket event. Returns false when the session must end.
async fn dispatch_frame(frame: WsMessage, transcript: &Transcript, sink: &mut WsSink) -> bool {
    match frame {
        WsMessage::Text(text) => {
            match AgentFrame::parse(text.as_str()) {
                Ok(frame) => transcript.push(Message::from_frame(frame)).await,
                // No recovery value can be synthesized from a frame that
                // does not decode; drop it and keep the session alive.
                Err(err) => warn!("dropping inbound frame: {err}"),
            }
            true
        }
        WsMessage::Binary(_) => {
            debug!("ignoring unexpected binary frame");
            true
        }
        WsMessage::Ping(payload) => {
            if let Err(err) = sink.send(WsMessage::Pong(payload)).await {
                warn!("failed to answer ping: {err}");
                return false;
            }
            true
        }
        WsMessage::Pong(_) => true,
        WsMessage::Close(_) => {
            debug!("agent closed the connection");
            false
        }
        WsMessage::Frame(_) => true,
    }
}
