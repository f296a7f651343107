//! Parley client library.
//!
//! Owns the realtime message-synchronization core for a chat session with a
//! remote agent: one persistent WebSocket connection ([`AgentConnection`]),
//! an append-only conversation record ([`Transcript`]), and the wiring
//! between the two. The presentation layer stays outside this crate's
//! concern; it subscribes to the transcript, watches the connection state,
//! and calls [`AgentConnection::send`].

pub mod config;
pub mod connection;
pub mod error;
pub mod transcript;

pub use config::ClientConfig;
pub use connection::{AgentConnection, ConnectionState, NOT_CONNECTED_NOTICE};
pub use error::{ClientError, ClientResult};
pub use transcript::{Message, Sender, Transcript};
