//! WebSocket transport listener.
//!
//! Accepts peer connections, performs the WebSocket handshake, and glues
//! each connection's frames to the gateway: inbound binary frames decode to
//! channel messages, outbound channel messages encode to binary frames, one
//! message per frame.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use protocol::ChannelMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::{ChannelHandle, TransportError};
use crate::session::SessionGateway;

/// WebSocket listener bridging remote peers to the session gateway.
pub struct TerminalServer {
    /// The bound TCP listener.
    listener: TcpListener,

    /// Gateway receiving connection and message events.
    gateway: Arc<SessionGateway>,

    /// The address the listener is bound to.
    local_addr: SocketAddr,
}

impl TerminalServer {
    /// Binds the listener on `addr`.
    ///
    /// Binding is the transport attachment check: failure here is a
    /// configuration error surfaced once at startup, never per event.
    pub async fn bind(addr: &str, gateway: Arc<SessionGateway>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::NotAttached(format!("{addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::NotAttached(e.to_string()))?;

        Ok(Self {
            listener,
            gateway,
            local_addr,
        })
    }

    /// Returns the bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts peer connections until the daemon shuts down.
    ///
    /// Accept failures are transient (file-descriptor pressure, resets
    /// during handshake) and never tear the listener down.
    pub async fn serve(self) -> Result<(), TransportError> {
        tracing::info!(addr = %self.local_addr, "waiting for peer connections");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let gateway = Arc::clone(&self.gateway);
                    tokio::spawn(async move {
                        if let Err(e) = handle_peer(stream, peer, gateway).await {
                            tracing::warn!(%peer, error = %e, "peer connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

/// Runs one peer connection to completion.
///
/// The connection produces exactly one `on_connect` up front and exactly one
/// `on_disconnect` when the socket goes away, however it goes away.
async fn handle_peer(
    stream: TcpStream,
    peer: SocketAddr,
    gateway: Arc<SessionGateway>,
) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| TransportError::Accept(e.to_string()))?;
    tracing::info!(%peer, "peer connected");

    let (sink, mut inbound) = ws.split();
    let (channel, outbound_rx) = ChannelHandle::new();
    let channel_id = channel.id();

    if let Err(e) = gateway.on_connect(channel).await {
        // Nothing was registered; dropping the socket informs the peer.
        tracing::error!(%peer, error = %e, "failed to start session for peer");
        return Ok(());
    }

    let outbound = tokio::spawn(pump_outbound(sink, outbound_rx));

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Binary(bytes)) => match ChannelMessage::from_msgpack(&bytes) {
                Ok(message) => gateway.on_message(channel_id, message).await,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "undecodable frame from peer; dropping");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(_)) => {
                tracing::debug!(%peer, "ignoring text frame from peer");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%peer, error = %e, "websocket read error");
                break;
            }
        }
    }

    tracing::info!(%peer, "peer disconnected");
    gateway.on_disconnect(channel_id).await;
    outbound.abort();

    Ok(())
}

/// Drains a channel's outbound queue into the websocket, in order.
async fn pump_outbound(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
) {
    while let Some(message) = rx.recv().await {
        let bytes = match message.to_msgpack() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound message; dropping");
                continue;
            }
        };

        if sink.send(Message::Binary(bytes)).await.is_err() {
            // Peer socket is gone; the inbound loop observes the same and
            // reports the disconnect.
            break;
        }
    }
}
