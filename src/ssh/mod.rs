//! SSH module
//!
//! Transport sessions, the interactive shell channel and the long-lived
//! session cache. The [`Connector`] and [`RemoteSession`] traits are the seam
//! between the deployment logic and russh.

pub mod cache;
pub mod channel;
pub mod client;
pub mod handler;
pub mod session;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{SftpError, SshError};
use crate::sftp::TransferProgress;

pub use cache::{SessionCache, SessionKey};
pub use channel::InteractiveChannel;
pub use client::SshTransport;
pub use session::{CommandResult, TransportSession};

/// Where and as whom to connect.
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
}

impl ConnectTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: SecretString::new(password.into().into_boxed_str()),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Clone for ConnectTarget {
    fn clone(&self) -> Self {
        Self::new(
            self.host.clone(),
            self.port,
            self.user.clone(),
            self.password.expose_secret().to_string(),
        )
    }
}

impl std::fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens authenticated sessions.
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    /// Connect and authenticate. Never returns a half-open session.
    fn connect(
        &self,
        target: &ConnectTarget,
    ) -> impl Future<Output = Result<Arc<Self::Session>, SshError>> + Send;
}

/// One authenticated connection able to host several channels.
pub trait RemoteSession: Send + Sync + 'static {
    /// Open an interactive shell channel, ready for writes.
    fn open_shell(&self) -> impl Future<Output = Result<InteractiveChannel, SshError>> + Send;

    /// Push a local file to an absolute remote path over a fresh transfer
    /// channel, reporting to `progress`.
    fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &TransferProgress,
    ) -> impl Future<Output = Result<u64, SftpError>> + Send;

    /// Cheap no-op round trip. `Ok` means the session is usable.
    fn probe(&self) -> impl Future<Output = Result<(), SshError>> + Send;

    /// Release the connection. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
