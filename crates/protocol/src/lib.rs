//! # Shellgate Protocol Library
//!
//! This crate defines the wire messages exchanged between the Shellgate
//! daemon and a remote terminal peer.
//!
//! ## Overview
//!
//! A terminal session is a duplex byte stream multiplexed over a single
//! message channel. Exactly two message tags exist:
//!
//! - `"output"` — raw bytes the shell process wrote to its pseudo-terminal,
//!   flowing daemon → peer
//! - `"input"` — raw keystroke bytes typed on the remote side, flowing
//!   peer → daemon
//!
//! Messages are serialized with MessagePack and carried one per transport
//! frame. Byte order within a direction is preserved by the transport; no
//! ordering is defined between the two directions.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::ChannelMessage;
//!
//! let message = ChannelMessage::Input(b"echo hi\n".to_vec());
//! let bytes = message.to_msgpack().unwrap();
//!
//! let decoded = ChannelMessage::from_msgpack(&bytes).unwrap();
//! assert_eq!(decoded, message);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Channel message definitions and codec
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{ChannelMessage, TAG_INPUT, TAG_OUTPUT};
