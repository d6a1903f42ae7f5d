//! Session management module.
//!
//! This module provides PTY spawning and the single-session lifecycle: the
//! gateway owns at most one live session and bridges its shell process to
//! the connected peer's channel.

pub mod gateway;
pub mod pty;

pub use gateway::SessionGateway;
pub use pty::{PtySession, SessionError, SessionId, ShellSettings};
