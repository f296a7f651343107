//! Inbound frame decoding.
//!
//! The agent backend sends UTF-8 text frames encoding a JSON object with two
//! fields: `type` (kind discriminator) and `content` (payload). Kinds other
//! than `status` and `image` are preserved as-is so newer backends can ship
//! additional kinds without breaking older clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding wire traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame payload did not decode into the expected structure.
    #[error("malformed agent frame: {0}")]
    MalformedFrame(String),
}

/// Frame kind discriminator.
///
/// `status` carries free text, `image` carries a renderable resource
/// reference (a URL or a data URI). Any other value round-trips through
/// [`FrameKind::Other`] without special handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Status,
    Image,
    #[serde(untagged)]
    Other(String),
}

impl FrameKind {
    /// The wire representation of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Image => "image",
            Self::Other(kind) => kind,
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound frame from the agent backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFrame {
    /// Kind discriminator.
    #[serde(rename = "type")]
    pub kind: FrameKind,

    /// Free text for `status`, an image resource reference for `image`.
    pub content: String,
}

impl AgentFrame {
    /// Decode one inbound text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|err| ProtocolError::MalformedFrame(err.to_string()))
    }

    /// Build a status frame.
    pub fn status(content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Status,
            content: content.into(),
        }
    }

    /// Build an image frame.
    pub fn image(content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Image,
            content: content.into(),
        }
    }
}
