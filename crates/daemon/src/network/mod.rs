//! Transport attachment for the session gateway.
//!
//! The gateway consumes a message-channel abstraction, not a socket: a
//! cloneable [`ChannelHandle`] through which the session queues outbound
//! messages without blocking, while the transport delivers inbound messages
//! and the channel-closed event to the gateway. The [`ws`] module provides
//! the concrete WebSocket listener.

pub mod ws;

use protocol::ChannelMessage;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use ws::TerminalServer;

/// Errors raised while attaching or operating the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No listener could be attached at startup.
    #[error("transport not attached: {0}")]
    NotAttached(String),

    /// A peer connection could not be accepted.
    #[error("connection accept failed: {0}")]
    Accept(String),
}

/// The sending half of a connection's message channel.
///
/// Sends are fire-and-forget and never block: messages land in an unbounded
/// queue drained by the transport's outbound pump in order. The handle also
/// carries the connection's identity, which the gateway uses to tell stale
/// channels from the active one.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    /// Connection identity.
    id: Uuid,

    /// Outbound queue toward the peer.
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl ChannelHandle {
    /// Creates a channel, returning the handle and the receiving half the
    /// transport drains toward the peer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    /// Returns the channel's connection identity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queues a message toward the peer.
    ///
    /// Returns `false` when the channel is closed because the peer is gone;
    /// the caller stops relaying, and teardown is the disconnect handler's
    /// job.
    pub fn send(&self, message: ChannelMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Returns whether the peer side of the channel is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (channel, mut rx) = ChannelHandle::new();

        for i in 0..10u8 {
            assert!(channel.send(ChannelMessage::Output(vec![i])));
        }

        for i in 0..10u8 {
            let message = rx.recv().await.unwrap();
            assert_eq!(message, ChannelMessage::Output(vec![i]));
        }
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (channel, rx) = ChannelHandle::new();
        assert!(!channel.is_closed());

        drop(rx);
        assert!(channel.is_closed());
        assert!(!channel.send(ChannelMessage::Output(b"late".to_vec())));
    }

    #[test]
    fn test_channel_ids_are_unique() {
        let (a, _rx_a) = ChannelHandle::new();
        let (b, _rx_b) = ChannelHandle::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_clones_share_identity() {
        let (channel, _rx) = ChannelHandle::new();
        assert_eq!(channel.id(), channel.clone().id());
    }
}
