//! Wire protocol types for the Parley chat client.
//!
//! Defines the frames exchanged with an agent backend over a single
//! persistent WebSocket connection:
//!
//! ```text
//! Operator terminal --[WS: raw text lines]--------> Agent backend
//! Operator terminal <--[WS: JSON agent frames]----- Agent backend
//! ```
//!
//! The two directions are asymmetric. Outbound traffic is unframed: the
//! operator's input is transmitted verbatim as one text frame, with no
//! envelope. Inbound traffic is JSON: every text frame decodes to an
//! [`AgentFrame`] carrying a kind discriminator and a string payload.

pub mod frames;

pub use frames::{AgentFrame, FrameKind, ProtocolError};
