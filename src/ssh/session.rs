use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{SftpError, SshError};
use crate::security_log;
use crate::sftp::{SftpChannel, TransferProgress};

use super::RemoteSession;
use super::channel::InteractiveChannel;
use super::handler::ClientHandler;

/// Result of executing a command, including output and exit code
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// One authenticated SSH connection.
///
/// Channels of every kind are opened on demand; the session itself lives
/// until [`close`](TransportSession::close) or drop.
pub struct TransportSession {
    handle: Arc<Mutex<Handle<ClientHandler>>>,
    host: Arc<str>,
    port: u16,
    chunk_size: usize,
    probe_timeout: Duration,
    closed: AtomicBool,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl TransportSession {
    pub fn new(
        handle: Handle<ClientHandler>,
        host: &str,
        port: u16,
        chunk_size: usize,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            handle: Arc::new(Mutex::new(handle)),
            host: Arc::from(host),
            port,
            chunk_size,
            probe_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_ref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), SshError> {
        if self.is_closed() {
            Err(SshError::Closed(format!("{}:{}", self.host, self.port)))
        } else {
            Ok(())
        }
    }

    /// Open a shell channel with a PTY so the remote side behaves like a
    /// login terminal (banners, prompts), and start its pump task.
    pub async fn open_shell(&self) -> Result<InteractiveChannel, SshError> {
        self.ensure_open()?;

        let handle = self.handle.lock().await;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("Failed to open channel: {}", e)))?;
        drop(handle);

        channel
            .request_pty(false, "xterm", 200, 50, 0, 0, &[])
            .await
            .map_err(|e| SshError::Channel(format!("PTY request failed: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::Channel(format!("Shell request failed: {}", e)))?;

        Ok(InteractiveChannel::spawn(channel))
    }

    /// Execute a single command on its own exec channel and collect stdout,
    /// stderr and the exit code.
    pub async fn open_exec(
        &self,
        command: &str,
        limit: Duration,
    ) -> Result<CommandResult, SshError> {
        self.ensure_open()?;

        let timeout_result = timeout(limit, async {
            let handle = self.handle.lock().await;
            let mut channel = handle
                .channel_open_session()
                .await
                .map_err(|e| SshError::Channel(format!("Failed to open channel: {}", e)))?;
            drop(handle);

            channel
                .exec(true, command)
                .await
                .map_err(|e| SshError::Channel(format!("Failed to exec '{}': {}", command, e)))?;

            let mut stdout = String::new();
            let mut stderr = String::new();
            let mut exit_code: i32 = 0;

            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.push_str(&String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExtendedData { data, .. }) => {
                        stderr.push_str(&String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit_code = exit_status as i32;
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                        break;
                    }
                    Some(_) => {}
                }
            }

            Ok(CommandResult {
                stdout,
                stderr,
                exit_code,
            })
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(SshError::Channel(format!(
                "Command '{}' timed out after {} seconds",
                command,
                limit.as_secs()
            ))),
        }
    }

    /// Open an SFTP subsystem channel on this session.
    pub async fn open_transfer(&self) -> Result<SftpChannel, SftpError> {
        if self.is_closed() {
            return Err(SftpError::ConnectionFailed(format!(
                "Session to {}:{} is closed",
                self.host, self.port
            )));
        }

        let handle = self.handle.lock().await;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SftpError::ConnectionFailed(format!("Failed to open channel: {}", e)))?;
        drop(handle);

        channel
            .request_subsystem(false, "sftp")
            .await
            .map_err(|e| {
                SftpError::ConnectionFailed(format!("Failed to request SFTP subsystem: {}", e))
            })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| {
                SftpError::ConnectionFailed(format!("Failed to initialize SFTP session: {}", e))
            })?;

        security_log::log_sftp_open(&self.host, self.port);
        Ok(SftpChannel::new(sftp, self.chunk_size))
    }

    /// Disconnect. Only the first call talks to the server.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.handle.lock().await;
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "deployment session closed", "en")
            .await
        {
            tracing::debug!("Disconnect from {}:{} failed: {}", self.host, self.port, e);
        }
        security_log::log_ssh_disconnect(&self.host, self.port);
    }
}

impl RemoteSession for TransportSession {
    async fn open_shell(&self) -> Result<InteractiveChannel, SshError> {
        TransportSession::open_shell(self).await
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &TransferProgress,
    ) -> Result<u64, SftpError> {
        let sftp = self.open_transfer().await?;
        sftp.upload(local, remote, progress).await
    }

    async fn probe(&self) -> Result<(), SshError> {
        let result = self.open_exec("true", self.probe_timeout).await?;
        tracing::trace!(
            "Liveness probe on {}:{} exited with {}",
            self.host,
            self.port,
            result.exit_code
        );
        Ok(())
    }

    async fn close(&self) {
        TransportSession::close(self).await
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        security_log::log_ssh_disconnect(&self.host, self.port);
        let handle = self.handle.clone();
        let host = self.host.to_string();
        let port = self.port;
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    let handle_guard = handle.lock().await;
                    let _ = handle_guard
                        .disconnect(Disconnect::ByApplication, "session dropped", "en")
                        .await;
                    tracing::debug!("SSH session cleanup: disconnected {}:{}", host, port);
                });
            }
            Err(_) => {
                tracing::debug!("SSH session dropped without a Tokio runtime; disconnect skipped");
            }
        }
    }
}
