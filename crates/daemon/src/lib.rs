//! # Shellgate Daemon Library
//!
//! This crate provides the daemon (server) functionality for Shellgate,
//! letting a single remote peer drive an interactive shell on the host
//! machine.
//!
//! ## Overview
//!
//! The daemon is a headless service. It accepts one peer connection at a
//! time, spawns a shell attached to a pseudo-terminal, and relays bytes in
//! both directions:
//!
//! - everything the shell writes to its terminal streams to the peer as
//!   `"output"` messages, verbatim and in order
//! - every `"input"` message from the peer is written to the shell's
//!   terminal input, verbatim and in order
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                 Shellgate Daemon                   │
//! ├────────────────────────────────────────────────────┤
//! │                                                    │
//! │  ┌──────────────────┐      ┌────────────────────┐  │
//! │  │ Terminal Server  │─────▶│  Session Gateway   │  │
//! │  │   (WebSocket)    │◀─────│ (one live session) │  │
//! │  └──────────────────┘      └─────────┬──────────┘  │
//! │                                      │             │
//! │                            ┌─────────▼──────────┐  │
//! │                            │    PTY Session     │  │
//! │                            │  (shell process)   │  │
//! │                            └────────────────────┘  │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use daemon::config::Config;
//! use daemon::network::TerminalServer;
//! use daemon::session::SessionGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let gateway = Arc::new(SessionGateway::new(config.shell_settings()));
//!     let server = TerminalServer::bind(&config.network.listen_addr, Arc::clone(&gateway)).await?;
//!
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY spawning and single-session lifecycle
//! - [`network`]: Channel abstraction and WebSocket transport

pub mod config;
pub mod network;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export session types for convenience
pub use session::{PtySession, SessionError, SessionGateway, SessionId, ShellSettings};

// Re-export network types for convenience
pub use network::{ChannelHandle, TerminalServer, TransportError};
