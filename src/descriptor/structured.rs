//! Structured descriptor: one record per target, JSON or TOML.
//!
//! Only the first record is deployed. The upload lands in a timestamped
//! staging file, the live artifact and its same-named sibling are moved into a
//! timestamped backup, then the staged file replaces the live one.

use std::path::Path;

use serde::Deserialize;

use crate::config::RemoteLayout;
use crate::error::DescriptorError;
use crate::ssh::ConnectTarget;

use super::plan::{
    DISABLE_HISTORY, DeploymentPlan, STARTED_MARKER, Upload, file_name, resolve_local,
    split_suffix,
};
use super::{DescriptorKind, StructuredFormat};

/// Raw record as written by the user. Every field is optional here so that
/// validation can name exactly what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentTarget {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<PortValue>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "localFile", alias = "local_file")]
    pub local_file: Option<String>,
    #[serde(default, rename = "remoteFile", alias = "remote_file")]
    pub remote_file: Option<String>,
    #[serde(default, rename = "startCMD", alias = "startCmd", alias = "start_cmd")]
    pub start_cmd: Option<String>,
    #[serde(default, rename = "stopCMD", alias = "stopCmd", alias = "stop_cmd")]
    pub stop_cmd: Option<String>,
    #[serde(default, rename = "logCMD", alias = "logCmd", alias = "log_cmd")]
    pub log_cmd: Option<String>,
}

/// Port as written: a number, or a string holding one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    pub fn parse(&self) -> Result<u16, DescriptorError> {
        match self {
            PortValue::Number(n) => {
                u16::try_from(*n).map_err(|_| DescriptorError::InvalidPort(n.to_string()))
            }
            PortValue::Text(s) => s
                .trim()
                .parse::<u16>()
                .map_err(|_| DescriptorError::InvalidPort(s.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Many(Vec<DeploymentTarget>),
    One(Box<DeploymentTarget>),
}

#[derive(Debug, Default, Deserialize)]
struct TomlDocument {
    #[serde(default)]
    targets: Vec<DeploymentTarget>,
}

/// Parse every record of a document.
pub fn parse(text: &str, format: StructuredFormat) -> Result<Vec<DeploymentTarget>, DescriptorError> {
    match format {
        StructuredFormat::Json => {
            let doc: JsonDocument =
                serde_json::from_str(text).map_err(|e| DescriptorError::Parse(e.to_string()))?;
            Ok(match doc {
                JsonDocument::Many(targets) => targets,
                JsonDocument::One(target) => vec![*target],
            })
        }
        StructuredFormat::Toml => {
            let doc: TomlDocument =
                toml::from_str(text).map_err(|e| DescriptorError::Parse(e.to_string()))?;
            Ok(doc.targets)
        }
    }
}

/// Parse a document and plan a deployment of its first record.
pub fn plan_document(
    text: &str,
    format: StructuredFormat,
    project_root: &Path,
    layout: &RemoteLayout,
    timestamp: &str,
) -> Result<DeploymentPlan, DescriptorError> {
    let target = parse(text, format)?
        .into_iter()
        .next()
        .ok_or(DescriptorError::NoTargets)?;
    plan(target, format, project_root, layout, timestamp)
}

fn required(value: Option<&String>, field: &'static str) -> Result<String, DescriptorError> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DescriptorError::MissingField(field)),
    }
}

fn optional(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validate a record and compute its command sequence.
pub fn plan(
    target: DeploymentTarget,
    format: StructuredFormat,
    project_root: &Path,
    layout: &RemoteLayout,
    timestamp: &str,
) -> Result<DeploymentPlan, DescriptorError> {
    let host = required(target.host.as_ref(), "host")?;
    let port = target
        .port
        .as_ref()
        .ok_or(DescriptorError::MissingField("port"))?
        .parse()?;
    let user = required(target.user.as_ref(), "user")?;
    let password = required(target.password.as_ref(), "password")?;
    let remote_file = required(target.remote_file.as_ref(), "remoteFile")?;

    let local_file = optional(target.local_file.as_ref());
    let stop_cmd = optional(target.stop_cmd.as_ref());
    let start_cmd = optional(target.start_cmd.as_ref());
    let log_cmd = optional(target.log_cmd.as_ref());

    let mut warnings = Vec::new();
    let mut uploads = Vec::new();
    let mut commands = vec![DISABLE_HISTORY.to_string()];

    if let Some(cmd) = stop_cmd {
        commands.push(cmd);
    }

    match local_file {
        Some(local_file) => {
            let staged = format!(
                "{}{}.{}",
                layout.staging_dir,
                timestamp,
                file_name(&local_file)
            );
            uploads.push(Upload {
                local: resolve_local(project_root, &local_file),
                declared: local_file,
                remote: staged.clone(),
            });
            commands.extend(backup_commands(&remote_file, &layout.backup_dir, timestamp));
            commands.push(format!("mv -f {} {}", staged, remote_file));
        }
        None => warnings.push(
            "No value for localFile, nothing will be uploaded but the deployment continues"
                .to_string(),
        ),
    }

    match (start_cmd, log_cmd) {
        (Some(start), Some(log)) => {
            commands.push(format!("{} && {} && {}", start, STARTED_MARKER, log))
        }
        (Some(start), None) => commands.push(start),
        (None, Some(log)) => {
            warnings.push("No value for startCMD".to_string());
            commands.push(log);
        }
        (None, None) => warnings.push("No value for startCMD".to_string()),
    }

    Ok(DeploymentPlan {
        name: optional(target.name.as_ref()),
        kind: DescriptorKind::Structured(format),
        target: ConnectTarget::new(host, port, user, password),
        uploads,
        commands,
        warnings,
    })
}

/// Commands that move the live artifact, and the sibling sharing its stem,
/// out of the way.
pub fn backup_commands(remote_file: &str, backup_dir: &str, timestamp: &str) -> Vec<String> {
    let name = file_name(remote_file);
    let mut commands = vec![
        format!("mkdir -p {}", backup_dir),
        format!("mv -f {} {}", remote_file, backup_path(backup_dir, timestamp, name)),
    ];

    let (stem, suffix) = split_suffix(name);
    if let Some(suffix) = suffix {
        let sibling = &remote_file[..remote_file.len() - suffix.len()];
        commands.push(format!(
            "mv -f {} {}",
            sibling,
            backup_path(backup_dir, timestamp, stem)
        ));
    }
    commands
}

/// `{backupDir}{timestamp}{name}`
pub fn backup_path(backup_dir: &str, timestamp: &str, name: &str) -> String {
    format!("{}{}{}", backup_dir, timestamp, name)
}
