//! Format-agnostic deployment plan.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::ssh::ConnectTarget;

use super::DescriptorKind;

/// Sent once, before anything else, so the session leaves nothing in the
/// remote shell history.
pub const DISABLE_HISTORY: &str = "set +o history";

/// Echoed between the start and log commands of a structured deployment.
pub const STARTED_MARKER: &str = "echo 'Deployment finished, streaming startup log'";

/// One file to push before any command is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Path as written in the descriptor
    pub declared: String,
    /// Declared path resolved against the project root
    pub local: PathBuf,
    /// Absolute remote destination
    pub remote: String,
}

/// Everything a run needs, independent of the descriptor it came from.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub name: Option<String>,
    pub kind: DescriptorKind,
    pub target: ConnectTarget,
    pub uploads: Vec<Upload>,
    /// Written to the shell in order. The first goes out as soon as the
    /// shell opens, the rest once every upload has finished.
    pub commands: Vec<String>,
    /// Non-fatal findings to show the user before connecting
    pub warnings: Vec<String>,
}

/// `YYYY.MM.DD.HH.mm.ss`, used in staging and backup names.
pub fn timestamp(now: DateTime<Local>) -> String {
    now.format("%Y.%m.%d.%H.%M.%S").to_string()
}

/// Last `/`-separated component of a descriptor path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolve a descriptor-relative local path against the project root.
///
/// Descriptors write local paths as `/target/app.jar`, meaning relative to the
/// project, so a leading separator does not make them absolute.
pub fn resolve_local(project_root: &Path, declared: &str) -> PathBuf {
    let relative = declared.trim_start_matches(['/', '\\']);
    project_root.join(relative)
}

/// Split a file name into stem and suffix (suffix includes the dot).
/// Dot-files and names without a dot have no suffix.
pub fn split_suffix(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx..])),
        _ => (name, None),
    }
}
