//! Live SSH server fixtures

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, timeout};

use autodeploy::config::Settings;
use autodeploy::ssh::{ConnectTarget, SshTransport};

// Tests share one server account; run them one at a time
static TEST_LOCK: Mutex<()> = Mutex::const_new(());

pub async fn acquire_test_lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().await
}

/// Connection details of the test SSH server
#[derive(Debug, Clone)]
pub struct TestSshServer {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl TestSshServer {
    /// Read the server from `AUTODEPLOY_TEST_SSH_*`. `None` when no host is set.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("AUTODEPLOY_TEST_SSH_HOST").ok()?;
        let port = std::env::var("AUTODEPLOY_TEST_SSH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(22);
        let username =
            std::env::var("AUTODEPLOY_TEST_SSH_USER").unwrap_or_else(|_| "testuser".to_string());
        let password = std::env::var("AUTODEPLOY_TEST_SSH_PASSWORD")
            .unwrap_or_else(|_| "testpass123".to_string());
        Some(Self {
            host,
            port,
            username,
            password,
        })
    }

    pub fn target(&self) -> ConnectTarget {
        ConnectTarget::new(
            self.host.clone(),
            self.port,
            self.username.clone(),
            self.password.clone(),
        )
    }

    pub fn target_with_password(&self, password: &str) -> ConnectTarget {
        ConnectTarget::new(self.host.clone(), self.port, self.username.clone(), password)
    }
}

/// Check if a test server is configured
pub fn is_server_configured() -> bool {
    TestSshServer::from_env().is_some()
}

/// Wait for SSH server to be ready
pub async fn wait_for_ssh_ready(host: &str, port: u16) -> Result<(), String> {
    let addr = format!("{}:{}", host, port);
    let max_attempts = 30;

    for attempt in 1..=max_attempts {
        match timeout(Duration::from_secs(2), TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => return Ok(()),
            _ => {
                if attempt == max_attempts {
                    return Err(format!(
                        "SSH server not ready after {} attempts",
                        max_attempts
                    ));
                }
                sleep(Duration::from_millis(200)).await;
            }
        }
    }

    Err("SSH server not ready".to_string())
}

/// Test environment around a live server
pub struct SshTestEnvironment {
    pub server: TestSshServer,
    pub settings: Settings,
}

impl SshTestEnvironment {
    pub async fn new() -> Result<Self, String> {
        let server = TestSshServer::from_env().ok_or("No test SSH server configured")?;
        wait_for_ssh_ready(&server.host, server.port).await?;

        let mut settings = Settings::default();
        settings.ssh.connect_timeout_secs = 10;
        settings.ssh.probe_timeout_secs = 5;
        Ok(Self { server, settings })
    }

    pub fn transport(&self) -> SshTransport {
        SshTransport::new(&self.settings)
    }
}

/// Macro to skip tests when no server is configured
#[macro_export]
macro_rules! skip_if_no_server {
    () => {
        if !super::fixtures::is_server_configured() {
            eprintln!("Skipping test: AUTODEPLOY_TEST_SSH_HOST not set");
            return;
        }
    };
}
