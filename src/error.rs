use std::path::PathBuf;
use thiserror::Error;

/// Settings file errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write settings file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create config directory: {0}")]
    CreateDir(std::io::Error),
}

/// Deployment descriptor errors. None of these are retried.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Descriptor file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read descriptor '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Descriptor '{0}' is empty")]
    Empty(PathBuf),

    #[error("Unsupported descriptor type '{0}'")]
    UnsupportedFormat(String),

    #[error("Failed to parse descriptor: {0}")]
    Parse(String),

    #[error("No remote host is configured in the descriptor")]
    NoTargets,

    #[error("Missing value for '{0}'")]
    MissingField(&'static str),

    #[error("Value of 'port' is not a number: {0}")]
    InvalidPort(String),
}

/// SSH-related errors
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed to {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Timeout connecting to {0}")]
    Timeout(String),

    #[error("Session to {0} is closed")]
    Closed(String),

    #[error("russh error: {0}")]
    Russh(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Russh(err.to_string())
    }
}

/// SFTP-related errors
#[derive(Error, Debug)]
pub enum SftpError {
    #[error("SFTP connection failed: {0}")]
    ConnectionFailed(String),

    #[error("File operation failed: {0}")]
    FileOperation(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Local I/O error: {0}")]
    LocalIo(String),
}

/// Anything that ends a deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Sftp(#[from] SftpError),

    #[error("Deployment was closed")]
    Closed,
}
