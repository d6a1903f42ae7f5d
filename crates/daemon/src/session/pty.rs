//! PTY session bridging.
//!
//! This module provides the core PTY spawning and I/O functionality.
//! A session owns one shell process attached to a pseudo-terminal and one
//! channel handle, and relays bytes between them until either side goes
//! away.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use protocol::ChannelMessage;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::network::ChannelHandle;

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The shell process failed to start.
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    /// The shell process could not be terminated.
    #[error("failed to terminate shell: {0}")]
    KillFailed(String),
}

/// Buffer size for reading from the PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Fixed terminal geometry. Resize negotiation is not part of the bridge;
/// every session gets this size.
const PTY_COLS: u16 = 80;
const PTY_ROWS: u16 = 24;

/// Settings applied to every spawned shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSettings {
    /// Shell executable to spawn.
    pub shell: String,

    /// Value exported as `TERM`, telling the shell which terminal
    /// capabilities (such as color support) it may use.
    pub term: String,
}

/// A PTY session bound to one peer channel.
///
/// The session spawns the shell on construction and, once
/// [`start_output_relay`](Self::start_output_relay) is called, runs two
/// independent relay duties: shell output → channel messages, and channel
/// input → shell. Neither relay can block the other. The session becomes
/// terminated when the shell exits or [`terminate`](Self::terminate) is
/// called; terminated is absorbing.
pub struct PtySession {
    /// Unique session identifier.
    id: SessionId,

    /// The PTY master handle. Held for the lifetime of the session (dropping
    /// it closes the terminal device) and used to clone the output reader.
    master: std::sync::Mutex<Box<dyn MasterPty + Send>>,

    /// The writer for the PTY input side.
    writer: Arc<Mutex<Box<dyn Write + Send>>>,

    /// The child shell process.
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,

    /// Outbound half of the peer's message channel.
    channel: ChannelHandle,

    /// Flag indicating whether the session is still running.
    running: Arc<AtomicBool>,

    /// Process ID of the shell.
    pid: Option<u32>,
}

impl PtySession {
    /// Spawns a new shell attached to a pseudo-terminal.
    ///
    /// The child starts in the user's home directory and inherits the
    /// daemon's environment as it is at spawn time, with `TERM` set from
    /// `settings`. The session transitions to running as soon as the spawn
    /// returns a handle; a spawn failure is terminal for the session.
    pub fn spawn(settings: &ShellSettings, channel: ChannelHandle) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        // The builder snapshots the daemon's environment at construction.
        let mut cmd = CommandBuilder::new(&settings.shell);
        cmd.env("TERM", &settings.term);
        if let Some(home) = dirs::home_dir() {
            cmd.cwd(home);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let pid = child.process_id();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        Ok(PtySession {
            id,
            master: std::sync::Mutex::new(pair.master),
            writer: Arc::new(Mutex::new(writer)),
            child: Arc::new(Mutex::new(child)),
            channel,
            running: Arc::new(AtomicBool::new(true)),
            pid,
        })
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the identity of the channel this session is bound to.
    pub fn channel_id(&self) -> Uuid {
        self.channel.id()
    }

    /// Returns whether the session is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Writes keystroke bytes to the shell's pseudo-terminal input.
    ///
    /// Fire and forget: no acknowledgement is produced, and input arriving
    /// after the session terminated is dropped rather than faulted, since
    /// teardown races with in-flight messages.
    pub async fn write(&self, data: &[u8]) {
        if !self.is_running() {
            tracing::trace!(
                session_id = %self.id,
                bytes = data.len(),
                "dropping input for terminated session"
            );
            return;
        }

        let mut writer = self.writer.lock().await;
        let result = writer.write_all(data).and_then(|()| writer.flush());
        if let Err(e) = result {
            // The shell side of the PTY is gone; the session is over.
            tracing::debug!(session_id = %self.id, error = %e, "PTY write failed");
            self.running.store(false, Ordering::SeqCst);
        }
    }

    /// Starts the output relay task.
    ///
    /// The task reads from the PTY and forwards every chunk, verbatim and in
    /// emission order, as an "output" message on the session's channel. It
    /// runs until the shell exits, the channel closes, or the session is
    /// terminated. Reads happen on the blocking pool so the relay never
    /// stalls the runtime or the input path.
    pub fn start_output_relay(&self) -> Result<(), SessionError> {
        let reader = {
            let master = self.master.lock().unwrap();
            master
                .try_clone_reader()
                .map_err(|e| SessionError::SpawnFailed(e.to_string()))?
        };
        let reader = Arc::new(std::sync::Mutex::new(reader));

        let channel = self.channel.clone();
        let running = Arc::clone(&self.running);
        let child = Arc::clone(&self.child);
        let session_id = self.id.clone();

        tokio::spawn(async move {
            loop {
                if !running.load(Ordering::SeqCst) {
                    tracing::debug!(session_id = %session_id, "output relay stopping: session terminated");
                    break;
                }

                let reader_clone = Arc::clone(&reader);
                let result = tokio::task::spawn_blocking(move || {
                    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                    let mut reader = reader_clone.lock().unwrap();
                    match reader.read(&mut buffer) {
                        Ok(0) => Ok(None), // EOF
                        Ok(n) => {
                            buffer.truncate(n);
                            Ok(Some(buffer))
                        }
                        Err(e) => Err(e),
                    }
                })
                .await;

                match result {
                    Ok(Ok(Some(data))) => {
                        if !channel.send(ChannelMessage::Output(data)) {
                            // Peer side of the channel is gone. The shell is
                            // torn down by the disconnect handler, not here.
                            tracing::debug!(session_id = %session_id, "output relay stopping: channel closed");
                            break;
                        }
                    }
                    Ok(Ok(None)) => {
                        tracing::info!(session_id = %session_id, "PTY EOF - shell exited");
                        running.store(false, Ordering::SeqCst);
                        reap_child(&session_id, &child).await;
                        break;
                    }
                    Ok(Err(e)) => {
                        // On some platforms a closing PTY reports EIO rather
                        // than EOF.
                        if running.swap(false, Ordering::SeqCst) {
                            tracing::debug!(session_id = %session_id, error = %e, "PTY read failed; shell likely exited");
                        }
                        reap_child(&session_id, &child).await;
                        break;
                    }
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "output relay read task panicked");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Terminates the shell process and marks the session terminated.
    ///
    /// Idempotent: terminating an already-terminated session is a no-op.
    pub async fn terminate(&self) -> Result<(), SessionError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let mut child = self.child.lock().await;
        child
            .kill()
            .map_err(|e| SessionError::KillFailed(e.to_string()))?;
        let status = child
            .wait()
            .map_err(|e| SessionError::KillFailed(e.to_string()))?;

        tracing::info!(
            session_id = %self.id,
            exit_code = status.exit_code(),
            "session terminated"
        );

        Ok(())
    }
}

/// Waits on the child after the PTY closed so the process table entry is
/// released.
async fn reap_child(session_id: &str, child: &Arc<Mutex<Box<dyn Child + Send + Sync>>>) {
    let mut child = child.lock().await;
    match child.wait() {
        Ok(status) => {
            tracing::info!(
                session_id = %session_id,
                exit_code = status.exit_code(),
                "shell process reaped"
            );
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to reap shell process");
        }
    }
}
