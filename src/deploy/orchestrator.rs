//! Deployment run driver.
//!
//! A [`Deployment`] walks one descriptor through
//! `Validating -> Connecting -> Uploading -> Sequencing -> Streaming`.
//! [`close`](Deployment::close) may be called from any task at any point;
//! the driver notices at its next step and stops.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::descriptor::{self, DeploymentPlan};
use crate::error::DeployError;
use crate::sftp::TransferProgress;
use crate::sink::LogSink;
use crate::ssh::{Connector, InteractiveChannel, RemoteSession};

use super::state::RunState;

pub struct Deployment<C: Connector> {
    connector: Arc<C>,
    descriptor: PathBuf,
    project_root: PathBuf,
    settings: Settings,
    sink: Arc<dyn LogSink>,
    state: Mutex<RunState>,
    session: Mutex<Option<Arc<C::Session>>>,
    channel: Mutex<Option<Arc<InteractiveChannel>>>,
    closed: AtomicBool,
}

impl<C: Connector> std::fmt::Debug for Deployment<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("descriptor", &self.descriptor)
            .field("project_root", &self.project_root)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Deployment<C> {
    pub fn new(
        connector: Arc<C>,
        descriptor: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
        settings: Settings,
        sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            descriptor: descriptor.into(),
            project_root: project_root.into(),
            settings,
            sink,
            state: Mutex::new(RunState::Idle),
            session: Mutex::new(None),
            channel: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run on a separate task so the caller never waits on the network.
    /// The handle resolves to the state the driver finished in.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<RunState> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    /// Drive the run to `Streaming`, or to `Failed` on the first error.
    /// Only the first call does anything; later calls return the current
    /// state.
    pub async fn run(&self) -> RunState {
        {
            let mut state = self.state.lock();
            if *state != RunState::Idle {
                return *state;
            }
            *state = RunState::Validating;
        }

        match self.drive().await {
            Ok(()) => {
                self.set_state(RunState::Streaming);
            }
            Err(DeployError::Closed) => {
                tracing::debug!("Deployment closed while running");
            }
            Err(e) => {
                tracing::warn!("Deployment of {} failed: {}", self.descriptor.display(), e);
                self.sink.writeln(&format!("Deployment failed: {}", e));
                self.shutdown(RunState::Failed).await;
            }
        }
        self.state()
    }

    async fn drive(&self) -> Result<(), DeployError> {
        let plan = descriptor::load_plan(
            &self.descriptor,
            &self.project_root,
            &self.settings.remote,
            Local::now(),
        )?;
        for warning in &plan.warnings {
            self.sink.writeln(warning);
        }
        if let Some(name) = &plan.name {
            self.sink.writeln(&format!("Deploying {}", name));
        }

        self.advance(RunState::Connecting)?;
        self.sink
            .writeln(&format!("Connecting to {}", plan.target.address()));
        let session = self.connector.connect(&plan.target).await?;
        *self.session.lock() = Some(session.clone());
        self.ensure_open().await?;

        let channel = Arc::new(session.open_shell().await?);
        *self.channel.lock() = Some(channel.clone());
        self.ensure_open().await?;

        // Reader first so banners show up before any command
        channel.attach_reader(self.sink.clone());

        let mut commands = plan.commands.iter();
        if let Some(first) = commands.next() {
            channel.write(first).await?;
        }

        self.advance(RunState::Uploading)?;
        self.upload_all(&plan, session.as_ref()).await?;

        self.advance(RunState::Sequencing)?;
        for command in commands {
            self.ensure_open().await?;
            channel.write(command).await?;
        }
        Ok(())
    }

    async fn upload_all(
        &self,
        plan: &DeploymentPlan,
        session: &C::Session,
    ) -> Result<(), DeployError> {
        for upload in &plan.uploads {
            self.ensure_open().await?;
            self.sink
                .writeln(&format!("Uploading {}", upload.declared));
            self.sink.writeln(&format!("local: {}", upload.local.display()));
            self.sink.writeln(&format!("remote: {}", upload.remote));

            let progress = TransferProgress::with_interval(
                self.sink.clone(),
                self.settings.transfer.progress_interval(),
            );
            let result = session
                .upload(&upload.local, &upload.remote, &progress)
                .await;
            progress.end();
            let bytes = result?;

            tracing::info!("Uploaded {} ({} bytes)", upload.remote, bytes);
            self.sink
                .writeln(&format!("Upload finished: {} ({} bytes)", upload.declared, bytes));
        }
        Ok(())
    }

    /// Tear down the shell channel and the session. Idempotent and safe to
    /// call while [`run`](Self::run) is still in progress.
    pub async fn close(&self) {
        self.shutdown(RunState::Closed).await;
    }

    async fn shutdown(&self, terminal: RunState) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = terminal;
        self.release().await;
        tracing::debug!("Deployment {} is {}", self.descriptor.display(), terminal);
    }

    async fn release(&self) {
        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            channel.close().await;
        }
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// A close that raced with the driver may have run before the latest
    /// resource was stored, so release again before bailing out.
    async fn ensure_open(&self) -> Result<(), DeployError> {
        if self.is_closed() {
            self.release().await;
            return Err(DeployError::Closed);
        }
        Ok(())
    }

    fn advance(&self, next: RunState) -> Result<(), DeployError> {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return Err(DeployError::Closed);
        }
        *state = next;
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }
}
