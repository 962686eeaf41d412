//! Common test utilities
//!
//! An in-process transport that records everything a deployment does, and a
//! throwaway project directory for descriptors and artifacts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

use autodeploy::error::{SftpError, SshError};
use autodeploy::sftp::TransferProgress;
use autodeploy::ssh::channel::ChannelCommand;
use autodeploy::ssh::{ConnectTarget, Connector, InteractiveChannel, RemoteSession};

/// Test environment with an isolated project directory
pub struct TestEnvironment {
    pub project_root: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let project_root = TempDir::new().expect("Failed to create temp dir");
        Self { project_root }
    }

    pub fn root(&self) -> &Path {
        self.project_root.path()
    }

    /// Write `contents` to `relative` under the project root, creating
    /// parent directories.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// Something the mock transport observed, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect { session: usize, address: String },
    Write(String),
    Upload { local: PathBuf, remote: String, bytes: u64 },
    ShellClosed,
    SessionClosed(usize),
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub struct MockConnector {
    journal: Journal,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    fail_uploads: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::new(Mutex::new(Vec::new())),
            sessions: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
        })
    }

    /// Sessions connected from now on reject every upload.
    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Make every following connect fail authentication.
    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().clone()
    }

    /// Only the commands written to shells.
    pub fn writes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Wait until every shell pump has recorded what was sent to it.
    pub async fn settle(&self) {
        for session in self.sessions() {
            session.drained().await;
        }
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<MockSession>, SshError> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        self.journal.lock().push(Event::Connect {
            session: id,
            address: target.address(),
        });
        let session = Arc::new(MockSession::new(id, self.journal.clone()));
        if self.fail_uploads.load(Ordering::SeqCst) {
            session.fail_uploads();
        }
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

pub struct MockSession {
    pub id: usize,
    journal: Journal,
    alive: AtomicBool,
    fail_uploads: AtomicBool,
    probes: AtomicUsize,
    closes: AtomicUsize,
    shell_closes: Arc<AtomicUsize>,
    shell_tx: Mutex<Option<mpsc::Sender<ChannelCommand>>>,
}

impl MockSession {
    fn new(id: usize, journal: Journal) -> Self {
        Self {
            id,
            journal,
            alive: AtomicBool::new(true),
            fail_uploads: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            shell_closes: Arc::new(AtomicUsize::new(0)),
            shell_tx: Mutex::new(None),
        }
    }

    /// Make liveness probes fail from now on.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn shell_close_count(&self) -> usize {
        self.shell_closes.load(Ordering::SeqCst)
    }

    /// Resolve once the shell pump has taken every queued command.
    pub async fn drained(&self) {
        let tx = self.shell_tx.lock().clone();
        let Some(tx) = tx else {
            return;
        };
        while !tx.is_closed() && tx.capacity() < tx.max_capacity() {
            tokio::task::yield_now().await;
        }
    }
}

impl RemoteSession for MockSession {
    async fn open_shell(&self) -> Result<InteractiveChannel, SshError> {
        let (command_tx, mut command_rx) = mpsc::channel::<ChannelCommand>(64);
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(64);

        let journal = self.journal.clone();
        let shell_closes = self.shell_closes.clone();
        tokio::spawn(async move {
            let _ = output_tx.send(b"Welcome to the mock host\r\n".to_vec()).await;
            while let Some(command) = command_rx.recv().await {
                match command {
                    ChannelCommand::Data(bytes) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        let line = text.strip_suffix('\n').unwrap_or(text.as_str()).to_string();
                        journal.lock().push(Event::Write(line));
                    }
                    ChannelCommand::Close => {
                        shell_closes.fetch_add(1, Ordering::SeqCst);
                        journal.lock().push(Event::ShellClosed);
                        break;
                    }
                }
            }
        });

        *self.shell_tx.lock() = Some(command_tx.clone());
        Ok(InteractiveChannel::new(command_tx, output_rx))
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &TransferProgress,
    ) -> Result<u64, SftpError> {
        // Commands written before the upload must be recorded before it
        self.drained().await;

        let bytes = tokio::fs::read(local).await.map_err(|e| {
            SftpError::LocalIo(format!(
                "Failed to read local file {}: {}",
                local.display(),
                e
            ))
        })?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(SftpError::Transfer(format!(
                "Failed to open remote file {}",
                remote
            )));
        }

        let total = bytes.len() as u64;
        progress.init(total);
        progress.count(total);
        progress.end();

        self.journal.lock().push(Event::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            bytes: total,
        });
        Ok(total)
    }

    async fn probe(&self) -> Result<(), SshError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SshError::Channel("probe failed".to_string()))
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(Event::SessionClosed(self.id));
    }
}
