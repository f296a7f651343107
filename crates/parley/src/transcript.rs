//! Append-only conversation record.
//!
//! The transcript is the single ordered log the presentation layer renders
//! from. Entries are appended by the connection task (inbound agent frames)
//! and by [`send`](crate::AgentConnection::send) (operator input plus the
//! locally synthesized not-connected notice); nothing ever edits, removes,
//! or reorders an entry. Order is purely client-observed: entries appear in
//! the order their triggering events were dispatched, never by any
//! server-side timestamp.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use parley_protocol::{AgentFrame, FrameKind};

/// Default capacity of the appended-entry broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// One immutable entry in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable identity for presentation-layer keying.
    pub id: Uuid,

    /// Who produced this entry.
    pub sender: Sender,

    /// Payload discriminator; for agent entries this is the wire frame kind,
    /// carried through unchanged.
    pub kind: FrameKind,

    /// Text payload for status entries, an image resource reference for
    /// image entries.
    pub content: String,

    /// Client-observed creation time, unix milliseconds. Informational only;
    /// ordering comes from transcript position.
    pub observed_at: i64,
}

impl Message {
    fn new(sender: Sender, kind: FrameKind, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            kind,
            content,
            observed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// An operator-authored text entry.
    pub fn user_status(content: impl Into<String>) -> Self {
        Self::new(Sender::User, FrameKind::Status, content.into())
    }

    /// An agent-attributed text entry (also used for locally synthesized
    /// notices such as the not-connected error).
    pub fn agent_status(content: impl Into<String>) -> Self {
        Self::new(Sender::Agent, FrameKind::Status, content.into())
    }

    /// An agent entry decoded from an inbound wire frame.
    pub fn from_frame(frame: AgentFrame) -> Self {
        Self::new(Sender::Agent, frame.kind, frame.content)
    }
}

struct TranscriptInner {
    entries: RwLock<Vec<Message>>,
    appended_tx: broadcast::Sender<Message>,
}

/// Shared handle to the conversation record.
///
/// Cloning is cheap; all clones observe the same log. Readers either take a
/// [`snapshot`](Transcript::snapshot) or follow appends live via
/// [`subscribe`](Transcript::subscribe); a subscriber that lags behind the
/// broadcast buffer re-syncs with a fresh snapshot.
#[derive(Clone)]
pub struct Transcript {
    inner: Arc<TranscriptInner>,
}

impl Transcript {
    /// Create an empty transcript with the given broadcast buffer capacity.
    pub fn new(event_buffer: usize) -> Self {
        let (appended_tx, _) = broadcast::channel(event_buffer);
        Self {
            inner: Arc::new(TranscriptInner {
                entries: RwLock::new(Vec::new()),
                appended_tx,
            }),
        }
    }

    /// Append one entry. Insertion order is preserved; there is no
    /// deduplication and no size bound.
    pub async fn push(&self, message: Message) {
        let mut entries = self.inner.entries.write().await;
        entries.push(message.clone());
        // Nobody listening is fine; the log itself is the source of truth.
        let _ = self.inner.appended_tx.send(message);
    }

    /// The current ordered sequence, cloned for rendering. Reflects every
    /// append that completed before this call returns.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.entries.read().await.clone()
    }

    /// Number of entries appended so far.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    /// Follow appends live, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inner.appended_tx.subscribe()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}
