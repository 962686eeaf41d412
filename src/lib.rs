//! autodeploy library
//!
//! This module exposes the deployment core for use in integration tests
//! and the command-line binary.

pub mod config;
pub mod deploy;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod security_log;
pub mod sftp;
pub mod sink;
pub mod ssh;
