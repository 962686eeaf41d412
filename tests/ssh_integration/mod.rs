//! SSH integration tests
//!
//! These tests need a reachable SSH server that accepts password logins.
//! They are skipped unless it is configured through the environment.
//!
//! ## Running the tests
//!
//! ```bash
//! export AUTODEPLOY_TEST_SSH_HOST=127.0.0.1
//! export AUTODEPLOY_TEST_SSH_PORT=2222
//! export AUTODEPLOY_TEST_SSH_USER=testuser
//! export AUTODEPLOY_TEST_SSH_PASSWORD=testpass123
//! cargo test --test ssh_integration
//! ```

#[macro_use]
pub mod fixtures;

mod cache_tests;
mod sftp_tests;
mod transport_tests;
