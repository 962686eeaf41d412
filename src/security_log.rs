//! Security event logging for audit trails.
//!
//! Provides structured logging functions for security-relevant events such as
//! authentication attempts, unverified host keys and cached session eviction.
//!
//! All security events are logged with `target: "security"` to allow filtering
//! in production environments.
//!
//! # Example
//!
//! Filter security events only:
//! ```bash
//! RUST_LOG=security=info autodeploy deploy.json
//! ```

use tracing::{info, warn};

/// Log an SSH authentication attempt.
///
/// Called before attempting to authenticate with a remote host.
pub fn log_auth_attempt(host: &str, port: u16, username: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = "password",
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(host: &str, port: u16, username: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = "password",
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(host: &str, port: u16, username: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = "password",
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log that a server host key was accepted without verification.
///
/// Host identity is not checked for deployment targets; this keeps a trail of
/// every key that was trusted that way.
pub fn log_host_key_unverified(host: &str, port: u16, fingerprint: &str) {
    warn!(
        target: "security",
        event = "host_key_unverified",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        "Accepted host key without verification"
    );
}

/// Log an SFTP channel opened on an existing session.
pub fn log_sftp_open(host: &str, port: u16) {
    info!(
        target: "security",
        event = "sftp_open",
        host = %host,
        port = port,
        "SFTP channel opened"
    );
}

/// Log when a cached session fails its liveness probe and is evicted.
pub fn log_session_evicted(host: &str, port: u16, username: &str, reason: &str) {
    info!(
        target: "security",
        event = "session_evicted",
        host = %host,
        port = port,
        username = %username,
        reason = %reason,
        "Cached SSH session evicted"
    );
}

/// Log an SSH session disconnect.
pub fn log_ssh_disconnect(host: &str, port: u16) {
    info!(
        target: "security",
        event = "ssh_disconnect",
        host = %host,
        port = port,
        "SSH session disconnected"
    );
}
