//! Interactive shell channel.
//!
//! The russh channel is owned by a pump task; callers talk to it through a
//! command queue and receive its output through a byte queue. One reader task
//! per channel turns that output into lines for a [`LogSink`].
//!
//! Closing is cooperative: the closed flag is raised first so that writers and
//! the reader stop at their next check, then the pump is told to shut the
//! remote channel down.

use std::sync::Arc;

use parking_lot::Mutex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::SshError;
use crate::sink::LogSink;

/// Commands that can be sent to the channel task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    Data(Vec<u8>),
    Close,
}

pub struct InteractiveChannel {
    command_tx: mpsc::Sender<ChannelCommand>,
    output_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    closed: watch::Sender<bool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for InteractiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveChannel")
            .field("command_tx", &"<channel>")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl InteractiveChannel {
    /// Build a channel from its two queues. The other ends belong to whatever
    /// drives the remote shell.
    pub fn new(
        command_tx: mpsc::Sender<ChannelCommand>,
        output_rx: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            command_tx,
            output_rx: Mutex::new(Some(output_rx)),
            closed,
            reader: Mutex::new(None),
        }
    }

    /// Wrap a russh session channel that already has a shell running, and
    /// spawn the task that owns it.
    pub fn spawn(mut channel: Channel<Msg>) -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<ChannelCommand>(256);
        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { data }) => {
                                if output_tx.send(data.to_vec()).await.is_err() {
                                    tracing::trace!("shell output dropped, no reader");
                                }
                            }
                            Some(ChannelMsg::ExtendedData { data, .. }) => {
                                if output_tx.send(data.to_vec()).await.is_err() {
                                    tracing::trace!("shell output dropped, no reader");
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                tracing::debug!("Shell exit status: {}", exit_status);
                            }
                            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                                tracing::debug!("Remote shell closed");
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(ChannelCommand::Data(data)) => {
                                if let Err(e) = channel.data(&data[..]).await {
                                    tracing::error!("Failed to send data: {}", e);
                                }
                            }
                            Some(ChannelCommand::Close) | None => {
                                let _ = channel.eof().await;
                                if let Err(e) = channel.close().await {
                                    tracing::debug!("Shell channel close failed: {}", e);
                                }
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self::new(command_tx, output_rx)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Send one command line. Writes after [`close`](Self::close) are
    /// silently dropped.
    pub async fn write(&self, command: &str) -> Result<(), SshError> {
        if self.is_closed() {
            tracing::trace!("dropping write to closed shell channel");
            return Ok(());
        }

        let mut data = Vec::with_capacity(command.len() + 1);
        data.extend_from_slice(command.as_bytes());
        data.push(b'\n');

        match self.command_tx.send(ChannelCommand::Data(data)).await {
            Ok(()) => Ok(()),
            Err(_) if self.is_closed() => Ok(()),
            Err(e) => {
                tracing::debug!("Shell write failed: {}", e);
                Err(SshError::Channel(
                    "remote shell is no longer running".to_string(),
                ))
            }
        }
    }

    /// Start the single background reader that forwards remote output to
    /// `sink` line by line. Returns `false` if a reader is already attached.
    pub fn attach_reader(&self, sink: Arc<dyn LogSink>) -> bool {
        let Some(mut output_rx) = self.output_rx.lock().take() else {
            return false;
        };
        let mut closed_rx = self.closed.subscribe();

        let handle = tokio::spawn(async move {
            let mut lines = LineSplitter::default();
            loop {
                if *closed_rx.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    changed = closed_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    chunk = output_rx.recv() => {
                        match chunk {
                            Some(bytes) => {
                                for line in lines.push(&bytes) {
                                    sink.writeln(&line);
                                }
                            }
                            None => {
                                if let Some(rest) = lines.finish() {
                                    sink.writeln(&rest);
                                }
                                break;
                            }
                        }
                    }
                }
            }
            tracing::debug!("Shell reader stopped");
        });

        *self.reader.lock() = Some(handle);
        true
    }

    /// Raise the closed flag, then shut the remote channel down. Idempotent.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        if self.command_tx.send(ChannelCommand::Close).await.is_err() {
            tracing::debug!("Shell task already finished");
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                tracing::warn!("Shell reader ended abnormally: {}", e);
            }
        }
    }
}

/// Splits a byte stream on `\n` and decodes each line as UTF-8.
///
/// Splitting happens before decoding so multi-byte characters cut across
/// chunks stay intact.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left without a trailing newline.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}
