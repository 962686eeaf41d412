//! Script descriptor: a shell script whose comment header carries the
//! connection settings.
//!
//! ```sh
//! # host = 10.0.0.5
//! # port = 22
//! # username = deploy
//! # password = secret
//! # remoteDir = /srv/app/
//! # localFile = /target/app.jar
//! systemctl restart app
//! ```
//!
//! Every line whose trimmed form does not start with `#` is part of the body,
//! which is sent to the shell as one block after all uploads finish.

use std::path::Path;

use crate::error::DescriptorError;
use crate::ssh::ConnectTarget;

use super::DescriptorKind;
use super::plan::{DISABLE_HISTORY, DeploymentPlan, Upload, file_name, resolve_local};

const HOST: &str = "# host =";
const PORT: &str = "# port =";
const USERNAME: &str = "# username =";
const PASSWORD: &str = "# password =";
const REMOTE_DIR: &str = "# remoteDir =";
const LOCAL_FILE: &str = "# localFile =";

/// Header values and body of a script descriptor, unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub remote_dir: Option<String>,
    pub local_files: Vec<String>,
    pub body: String,
}

/// All values for a header key, in file order.
fn find_all(lines: &[&str], prefix: &str) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter_map(|line| line.strip_prefix(prefix))
        .map(|value| value.trim().to_string())
        .collect()
}

fn find_first(lines: &[&str], prefix: &str) -> Option<String> {
    find_all(lines, prefix).into_iter().next()
}

/// Non-comment lines in file order, newline separated.
pub fn command_body(text: &str) -> String {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse(text: &str) -> ScriptDescriptor {
    let lines: Vec<&str> = text.split('\n').collect();
    ScriptDescriptor {
        host: find_first(&lines, HOST),
        port: find_first(&lines, PORT),
        username: find_first(&lines, USERNAME),
        password: find_first(&lines, PASSWORD),
        remote_dir: find_first(&lines, REMOTE_DIR),
        local_files: find_all(&lines, LOCAL_FILE)
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect(),
        body: command_body(text),
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DescriptorError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(DescriptorError::MissingField(field))
}

/// Parse and validate a script, then build its plan.
pub fn plan_script(text: &str, project_root: &Path) -> Result<DeploymentPlan, DescriptorError> {
    if text.trim().is_empty() {
        return Err(DescriptorError::Parse("script is empty".to_string()));
    }
    plan(parse(text), project_root)
}

pub fn plan(script: ScriptDescriptor, project_root: &Path) -> Result<DeploymentPlan, DescriptorError> {
    let host = required(script.host, "host")?;
    let port_text = required(script.port, "port")?;
    let port = port_text
        .parse::<u16>()
        .map_err(|_| DescriptorError::InvalidPort(port_text.clone()))?;
    let username = required(script.username, "username")?;
    let password = required(script.password, "password")?;
    let remote_dir = required(script.remote_dir, "remoteDir")?;

    let mut warnings = Vec::new();
    if script.local_files.is_empty() {
        warnings.push(
            "No value for localFile, nothing will be uploaded but the deployment continues"
                .to_string(),
        );
    }
    // Kept verbatim: the directory is joined by plain concatenation.
    if !script.local_files.is_empty() && !remote_dir.ends_with('/') {
        warnings.push(format!(
            "remoteDir '{}' does not end with '/', file names are appended to it as-is",
            remote_dir
        ));
    }

    let uploads = script
        .local_files
        .into_iter()
        .map(|declared| Upload {
            local: resolve_local(project_root, &declared),
            remote: format!("{}{}", remote_dir, file_name(&declared)),
            declared,
        })
        .collect();

    Ok(DeploymentPlan {
        name: None,
        kind: DescriptorKind::Script,
        target: ConnectTarget::new(host, port, username, password),
        uploads,
        commands: vec![DISABLE_HISTORY.to_string(), script.body],
        warnings,
    })
}
