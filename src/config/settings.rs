use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Tool-wide settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub remote: RemoteLayout,
}

impl Settings {
    /// Load from the default location, creating the file if it does not exist
    pub fn load() -> Result<Self, SettingsError> {
        let path = super::paths::settings_file().ok_or_else(|| SettingsError::ReadFile {
            path: PathBuf::from("settings.toml"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine settings file path",
            ),
        })?;

        if !path.exists() {
            let settings = Self::default();
            super::paths::ensure_config_dir().map_err(SettingsError::CreateDir)?;
            settings.save_to(&path)?;
            return Ok(settings);
        }

        Self::load_from(&path)
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(SettingsError::Parse)
    }

    /// Save to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;
        std::fs::write(path, content).map_err(|e| SettingsError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn default_connect_timeout() -> u64 {
    300
}

fn default_keepalive() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshSettings {
    /// Covers TCP connect and the SSH handshake plus authentication
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 0 disables keepalive
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl SshSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        // Treat 0 as "no keepalive" to avoid immediate timeout
        if self.keepalive_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keepalive_interval_secs))
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_reap_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl CacheSettings {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            reap_interval_secs: default_reap_interval(),
        }
    }
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_chunk_size() -> usize {
    32 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferSettings {
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl TransferSettings {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_backup_dir() -> String {
    "/www/backup/AutoDeployment/".to_string()
}

fn default_staging_dir() -> String {
    "/tmp/AutoDeployment/".to_string()
}

/// Remote directories used by structured deployments.
/// Both are used as plain string prefixes and should end with `/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteLayout {
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            staging_dir: default_staging_dir(),
        }
    }
}
