//! Channel message definitions for Shellgate.
//!
//! A session carries exactly two kinds of messages: shell output flowing to
//! the peer, and keystroke input flowing to the shell. Both payloads are raw
//! bytes; the daemon never interprets them. Messages are serialized using
//! MessagePack.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Wire tag for shell output messages (daemon → peer).
pub const TAG_OUTPUT: &str = "output";

/// Wire tag for keystroke input messages (peer → daemon).
pub const TAG_INPUT: &str = "input";

/// A message carried over a session's channel.
///
/// The enum tag serializes as the message's wire tag, so an output message
/// appears on the wire as `{"type": "output", "data": <bytes>}` in
/// MessagePack encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ChannelMessage {
    /// Raw bytes the shell process emitted on its pseudo-terminal.
    Output(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Raw keystroke bytes destined for the shell's pseudo-terminal input.
    Input(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl ChannelMessage {
    /// Returns the message's wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ChannelMessage::Output(_) => TAG_OUTPUT,
            ChannelMessage::Input(_) => TAG_INPUT,
        }
    }

    /// Returns the payload bytes.
    pub fn payload(&self) -> &[u8] {
        match self {
            ChannelMessage::Output(data) | ChannelMessage::Input(data) => data,
        }
    }

    /// Serialize the message to MessagePack bytes.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize a message from MessagePack bytes.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}
