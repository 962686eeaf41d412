//! autodeploy - push an artifact over SSH and stream its startup log
//!
//! Usage:
//!   autodeploy deploy.json                  # structured descriptor
//!   autodeploy deploy.sh --project-root .   # script descriptor
//!   autodeploy deploy.toml --keep-alive-secs 120

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use autodeploy::config::Settings;
use autodeploy::deploy::{Deployment, RunState};
use autodeploy::sink::{LogSink, StdoutSink};
use autodeploy::ssh::SshTransport;

#[derive(Parser)]
#[command(name = "autodeploy")]
#[command(about = "Deploy an artifact to a remote host over SSH", long_about = None)]
struct Cli {
    /// Deployment descriptor (.json, .toml or .sh)
    descriptor: PathBuf,

    /// Directory that local paths in the descriptor are relative to
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Settings file to use instead of the per-user settings.toml
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Close the deployment after streaming for this many seconds
    #[arg(long)]
    keep_alive_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = autodeploy::config::paths::ensure_log_dir().ok();
    let _guard = autodeploy::logging::init_logging(log_dir);

    tracing::info!("Starting autodeploy");
    if let Some(dir) = autodeploy::config::paths::log_dir() {
        tracing::info!("Logging to {}", dir.display());
    }

    let settings = match &cli.settings {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load().context("Failed to load settings")?,
    };

    let transport = Arc::new(SshTransport::new(&settings));
    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink);
    let deployment = Deployment::new(
        transport,
        cli.descriptor,
        cli.project_root,
        settings,
        sink,
    );

    let state = deployment
        .spawn()
        .await
        .context("Deployment task panicked")?;

    if state == RunState::Streaming {
        wait_for_stop(cli.keep_alive_secs).await;
    }
    deployment.close().await;

    match state {
        RunState::Failed => anyhow::bail!("deployment failed"),
        _ => Ok(()),
    }
}

/// Block until Ctrl-C, or until the keep-alive window runs out.
async fn wait_for_stop(keep_alive_secs: Option<u64>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let expiry = async {
        match keep_alive_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, closing deployment");
        }
        _ = expiry => {
            tracing::info!("Keep-alive window elapsed, closing deployment");
        }
    }
}
