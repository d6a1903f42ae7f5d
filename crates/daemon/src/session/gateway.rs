//! Session gateway: connection lifecycle handling for the single session.
//!
//! The gateway accepts connection events from the transport and maintains at
//! most one live PTY session. A new connection tears down the previous
//! session's shell before activating its own, so a reconnecting peer never
//! leaks an orphaned process.

use protocol::ChannelMessage;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::pty::{PtySession, SessionError, SessionId, ShellSettings};
use crate::network::ChannelHandle;

/// Owner of the single active session.
///
/// All connection, disconnection, and inbound-message events funnel through
/// the gateway, which updates the current-session slot atomically with
/// respect to those events. Session-level faults are contained here; they
/// never propagate to the transport or the host.
pub struct SessionGateway {
    /// Settings applied to every spawned shell.
    settings: ShellSettings,

    /// The current session, if one is live.
    active: Mutex<Option<PtySession>>,
}

impl SessionGateway {
    /// Creates a gateway with the given shell settings.
    pub fn new(settings: ShellSettings) -> Self {
        Self {
            settings,
            active: Mutex::new(None),
        }
    }

    /// Handles a new peer connection.
    ///
    /// Any live session is torn down first, then a fresh shell is spawned
    /// and bound to `channel`. Spawning is immediate, not lazy. On spawn
    /// failure the error is returned and no session is left registered as
    /// active.
    pub async fn on_connect(&self, channel: ChannelHandle) -> Result<SessionId, SessionError> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            tracing::warn!(
                session_id = %previous.id(),
                "new connection while a session is live; terminating previous shell"
            );
            if let Err(e) = previous.terminate().await {
                tracing::warn!(
                    session_id = %previous.id(),
                    error = %e,
                    "failed to terminate replaced session"
                );
            }
        }

        let session = PtySession::spawn(&self.settings, channel)?;
        if let Err(e) = session.start_output_relay() {
            tracing::error!(session_id = %session.id(), error = %e, "failed to start output relay");
            if let Err(e) = session.terminate().await {
                tracing::warn!(session_id = %session.id(), error = %e, "failed to terminate half-started session");
            }
            return Err(e);
        }

        let session_id = session.id().clone();
        tracing::info!(
            session_id = %session_id,
            pid = ?session.pid(),
            shell = %self.settings.shell,
            "session started"
        );

        *active = Some(session);
        Ok(session_id)
    }

    /// Handles a peer disconnect reported by the transport.
    ///
    /// The associated shell process is terminated so the host does not
    /// accumulate orphans. Only the active session's own channel may tear it
    /// down: a late disconnect from a connection that has already been
    /// replaced is ignored.
    pub async fn on_disconnect(&self, channel_id: Uuid) {
        let mut active = self.active.lock().await;

        let is_current = active
            .as_ref()
            .map(|s| s.channel_id() == channel_id)
            .unwrap_or(false);
        if !is_current {
            tracing::debug!(%channel_id, "disconnect for inactive channel; ignoring");
            return;
        }

        if let Some(session) = active.take() {
            tracing::info!(session_id = %session.id(), "peer disconnected; terminating shell");
            if let Err(e) = session.terminate().await {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %e,
                    "failed to terminate session on disconnect"
                );
            }
        }
    }

    /// Forwards an inbound channel message to the active session.
    ///
    /// Input payloads go to the session's write path. Messages from stale
    /// channels, unexpected tags, and input racing teardown are dropped
    /// silently; none of these are faults.
    pub async fn on_message(&self, channel_id: Uuid, message: ChannelMessage) {
        let active = self.active.lock().await;

        match active.as_ref() {
            Some(session) if session.channel_id() == channel_id => match message {
                ChannelMessage::Input(data) => session.write(&data).await,
                other => {
                    tracing::debug!(
                        session_id = %session.id(),
                        tag = other.tag(),
                        "unexpected message tag from peer; dropping"
                    );
                }
            },
            _ => {
                tracing::trace!(%channel_id, "message for inactive channel; dropping");
            }
        }
    }

    /// Returns the id of the active session, if one is live.
    pub async fn active_session(&self) -> Option<SessionId> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|s| s.is_running())
            .map(|s| s.id().clone())
    }

    /// Terminates the active session, if any. Called on daemon shutdown.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.take() {
            tracing::info!(session_id = %session.id(), "shutting down; terminating shell");
            if let Err(e) = session.terminate().await {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %e,
                    "failed to terminate session on shutdown"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_gateway() -> SessionGateway {
        SessionGateway::new(ShellSettings {
            shell: "/bin/sh".to_string(),
            term: "xterm-color".to_string(),
        })
    }

    async fn wait_for_marker(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<ChannelMessage>,
        marker: &str,
    ) -> bool {
        let mut collected = Vec::new();
        for _ in 0..50 {
            match timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(ChannelMessage::Output(data))) => {
                    collected.extend_from_slice(&data);
                    if String::from_utf8_lossy(&collected).contains(marker) {
                        return true;
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {}
            }
        }
        false
    }

    #[tokio::test]
    async fn test_connect_creates_session() {
        let gateway = test_gateway();
        let (channel, _rx) = ChannelHandle::new();

        let session_id = gateway.on_connect(channel).await.unwrap();
        assert_eq!(gateway.active_session().await, Some(session_id));

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_spawn_failure_leaves_no_session() {
        let gateway = SessionGateway::new(ShellSettings {
            shell: "/nonexistent/shell/xyz".to_string(),
            term: "xterm-color".to_string(),
        });
        let (channel, _rx) = ChannelHandle::new();

        let result = gateway.on_connect(channel).await;
        assert!(matches!(result, Err(SessionError::SpawnFailed(_))));
        assert_eq!(gateway.active_session().await, None);
    }

    #[tokio::test]
    async fn test_second_connect_replaces_session() {
        let gateway = test_gateway();

        let (channel1, _rx1) = ChannelHandle::new();
        let first_id = gateway.on_connect(channel1).await.unwrap();

        let (channel2, _rx2) = ChannelHandle::new();
        let second_id = gateway.on_connect(channel2).await.unwrap();

        // Exactly one live session remains, and it is the new one.
        assert_ne!(first_id, second_id);
        assert_eq!(gateway.active_session().await, Some(second_id));

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_terminates_session() {
        let gateway = test_gateway();
        let (channel, _rx) = ChannelHandle::new();
        let channel_id = channel.id();

        gateway.on_connect(channel).await.unwrap();
        gateway.on_disconnect(channel_id).await;

        assert_eq!(gateway.active_session().await, None);
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_ignored() {
        let gateway = test_gateway();

        let (channel1, _rx1) = ChannelHandle::new();
        let stale_id = channel1.id();
        gateway.on_connect(channel1).await.unwrap();

        let (channel2, _rx2) = ChannelHandle::new();
        let second_id = gateway.on_connect(channel2).await.unwrap();

        // The replaced connection's disconnect must not kill the new session.
        gateway.on_disconnect(stale_id).await;
        assert_eq!(gateway.active_session().await, Some(second_id));

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_input_relay_round_trip() {
        let gateway = test_gateway();
        let (channel, mut rx) = ChannelHandle::new();
        let channel_id = channel.id();

        gateway.on_connect(channel).await.unwrap();
        gateway
            .on_message(
                channel_id,
                ChannelMessage::Input(b"echo gateway_echo_marker\n".to_vec()),
            )
            .await;

        assert!(
            wait_for_marker(&mut rx, "gateway_echo_marker").await,
            "did not receive echoed output"
        );

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_message_from_stale_channel_is_dropped() {
        let gateway = test_gateway();

        let (channel1, mut rx1) = ChannelHandle::new();
        let stale_id = channel1.id();
        gateway.on_connect(channel1).await.unwrap();

        let (channel2, _rx2) = ChannelHandle::new();
        gateway.on_connect(channel2).await.unwrap();

        // Input on the abandoned channel reaches no shell.
        gateway
            .on_message(
                stale_id,
                ChannelMessage::Input(b"echo stale_channel_marker\n".to_vec()),
            )
            .await;
        assert!(!wait_for_marker(&mut rx1, "stale_channel_marker").await);

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_message_with_no_session_is_dropped() {
        let gateway = test_gateway();

        // Must be a silent no-op, not a fault.
        gateway
            .on_message(Uuid::new_v4(), ChannelMessage::Input(b"hello\n".to_vec()))
            .await;
        assert_eq!(gateway.active_session().await, None);
    }

    #[tokio::test]
    async fn test_output_tag_from_peer_is_dropped() {
        let gateway = test_gateway();
        let (channel, _rx) = ChannelHandle::new();
        let channel_id = channel.id();

        gateway.on_connect(channel).await.unwrap();

        // A peer must not be able to inject into the output path.
        gateway
            .on_message(channel_id, ChannelMessage::Output(b"bogus".to_vec()))
            .await;
        assert!(gateway.active_session().await.is_some());

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_shell_exit_then_reconnect() {
        let gateway = test_gateway();
        let (channel, _rx) = ChannelHandle::new();
        let channel_id = channel.id();

        gateway.on_connect(channel).await.unwrap();
        gateway
            .on_message(channel_id, ChannelMessage::Input(b"exit 0\n".to_vec()))
            .await;

        let mut exited = false;
        for _ in 0..50 {
            if gateway.active_session().await.is_none() {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(exited, "gateway did not observe shell exit");

        // Input after exit is a no-op, and a fresh connect succeeds.
        gateway
            .on_message(channel_id, ChannelMessage::Input(b"echo ignored\n".to_vec()))
            .await;

        let (channel2, mut rx2) = ChannelHandle::new();
        let channel2_id = channel2.id();
        gateway.on_connect(channel2).await.unwrap();
        gateway
            .on_message(
                channel2_id,
                ChannelMessage::Input(b"echo fresh_session_marker\n".to_vec()),
            )
            .await;
        assert!(wait_for_marker(&mut rx2, "fresh_session_marker").await);

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_without_session() {
        let gateway = test_gateway();
        // Shutdown with nothing active must not fault.
        gateway.shutdown().await;
        assert_eq!(gateway.active_session().await, None);
    }
}
