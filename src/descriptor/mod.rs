//! Deployment descriptors.
//!
//! A descriptor is either a structured document (`.json`, `.toml`) or an
//! annotated shell script (`.sh`). Both resolve to the same
//! [`DeploymentPlan`], so the orchestrator never looks at the source format.

pub mod plan;
pub mod script;
pub mod structured;

use std::path::Path;

use chrono::{DateTime, Local};

use crate::config::RemoteLayout;
use crate::error::DescriptorError;

pub use plan::{DeploymentPlan, Upload};
pub use script::ScriptDescriptor;
pub use structured::DeploymentTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredFormat {
    Json,
    Toml,
}

/// Descriptor variant, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Structured(StructuredFormat),
    Script,
}

impl DescriptorKind {
    pub fn from_path(path: &Path) -> Result<Self, DescriptorError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(Self::Structured(StructuredFormat::Json)),
            "toml" => Ok(Self::Structured(StructuredFormat::Toml)),
            "sh" => Ok(Self::Script),
            _ => Err(DescriptorError::UnsupportedFormat(ext)),
        }
    }
}

/// Read, validate and plan a descriptor file.
///
/// `now` fixes the timestamp used in staging and backup names.
pub fn load_plan(
    path: &Path,
    project_root: &Path,
    layout: &RemoteLayout,
    now: DateTime<Local>,
) -> Result<DeploymentPlan, DescriptorError> {
    if !path.is_file() {
        return Err(DescriptorError::NotFound(path.to_path_buf()));
    }
    let kind = DescriptorKind::from_path(path)?;

    let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    if text.trim().is_empty() {
        return Err(DescriptorError::Empty(path.to_path_buf()));
    }

    match kind {
        DescriptorKind::Structured(format) => structured::plan_document(
            &text,
            format,
            project_root,
            layout,
            &plan::timestamp(now),
        ),
        DescriptorKind::Script => script::plan_script(&text, project_root),
    }
}
