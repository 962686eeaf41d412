use std::sync::Arc;

use russh::client::{self, Config};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{Settings, SshSettings};
use crate::error::SshError;
use crate::security_log;

use super::handler::ClientHandler;
use super::session::TransportSession;
use super::{ConnectTarget, Connector};

/// Opens password-authenticated SSH sessions
pub struct SshTransport {
    config: Arc<Config>,
    settings: SshSettings,
    chunk_size: usize,
}

impl SshTransport {
    pub fn new(settings: &Settings) -> Self {
        // Idle deployments are kept open for their startup log; only
        // keepalive decides when a peer is gone.
        let config = Config {
            inactivity_timeout: None,
            keepalive_interval: settings.ssh.keepalive_interval(),
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            settings: settings.ssh.clone(),
            chunk_size: settings.transfer.chunk_size,
        }
    }

    /// Connect and authenticate. One connect timeout covers the TCP connect,
    /// the handshake and authentication together.
    pub async fn connect_session(
        &self,
        target: &ConnectTarget,
    ) -> Result<TransportSession, SshError> {
        let addr = target.address();

        let connecting = async {
            let stream = TcpStream::connect(&addr).await.map_err(|e| {
                SshError::ConnectionFailed {
                    host: target.host.clone(),
                    port: target.port,
                    reason: e.to_string(),
                }
            })?;
            self.establish_session(target, stream).await
        };

        match timeout(self.settings.connect_timeout(), connecting).await {
            Ok(result) => result,
            Err(_) => Err(SshError::Timeout(target.address())),
        }
    }

    async fn establish_session(
        &self,
        target: &ConnectTarget,
        stream: TcpStream,
    ) -> Result<TransportSession, SshError> {
        let handler = ClientHandler::new(target.host.clone(), target.port);

        let mut handle = client::connect_stream(self.config.clone(), stream, handler)
            .await
            .map_err(|e| SshError::ConnectionFailed {
                host: target.host.clone(),
                port: target.port,
                reason: e.to_string(),
            })?;

        self.authenticate(&mut handle, target).await?;

        tracing::info!("Connected to {}@{}", target.user, target.address());
        Ok(TransportSession::new(
            handle,
            &target.host,
            target.port,
            self.chunk_size,
            self.settings.probe_timeout(),
        ))
    }

    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        target: &ConnectTarget,
    ) -> Result<(), SshError> {
        security_log::log_auth_attempt(&target.host, target.port, &target.user);

        // Use expose_secret() only at the point of authentication
        let auth_result = match handle
            .authenticate_password(&target.user, target.password.expose_secret())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                security_log::log_auth_failure(&target.host, target.port, &target.user, &reason);
                return Err(SshError::AuthenticationFailed(reason));
            }
        };

        if !auth_result.success() {
            let reason = "Authentication rejected by server";
            security_log::log_auth_failure(&target.host, target.port, &target.user, reason);
            return Err(SshError::AuthenticationFailed(reason.to_string()));
        }

        security_log::log_auth_success(&target.host, target.port, &target.user);
        Ok(())
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl Connector for SshTransport {
    type Session = TransportSession;

    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<TransportSession>, SshError> {
        self.connect_session(target).await.map(Arc::new)
    }
}
