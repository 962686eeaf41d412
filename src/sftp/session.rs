//! SFTP channel for pushing deployment artifacts

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SftpError;

use super::progress::TransferProgress;

/// One file-transfer channel, opened per transfer or directory operation and
/// dropped afterwards.
pub struct SftpChannel {
    sftp: RusshSftpSession,
    chunk_size: usize,
}

impl std::fmt::Debug for SftpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpChannel")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

/// A remote directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upload,
    Download,
}

impl SftpChannel {
    pub fn new(sftp: RusshSftpSession, chunk_size: usize) -> Self {
        Self {
            sftp,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Create `dir` and any missing ancestors.
    pub async fn ensure_dir(&self, dir: &str) -> Result<(), SftpError> {
        for prefix in ancestor_dirs(dir) {
            let exists = self.sftp.try_exists(prefix.clone()).await.map_err(|e| {
                SftpError::FileOperation(format!("Failed to check directory {}: {}", prefix, e))
            })?;
            if exists {
                continue;
            }
            tracing::debug!("creating remote directory {}", prefix);
            self.sftp.create_dir(prefix.clone()).await.map_err(|e| {
                SftpError::FileOperation(format!("Failed to create directory {}: {}", prefix, e))
            })?;
        }
        Ok(())
    }

    /// Upload a local file to an absolute remote path, creating the remote
    /// directory first. Every chunk written is reported to `progress`.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        progress: &TransferProgress,
    ) -> Result<u64, SftpError> {
        let mut local = tokio::fs::File::open(local_path).await.map_err(|e| {
            SftpError::LocalIo(format!(
                "Failed to read local file {}: {}",
                local_path.display(),
                e
            ))
        })?;
        let total = local
            .metadata()
            .await
            .map_err(|e| {
                SftpError::LocalIo(format!(
                    "Failed to stat local file {}: {}",
                    local_path.display(),
                    e
                ))
            })?
            .len();

        let label = local_path.display().to_string();
        self.write_remote(&mut local, total, &label, remote_path, progress)
            .await
    }

    /// Upload whatever `reader` yields to `remote_path`. `total` is the
    /// expected length, or 0 when unknown.
    pub async fn upload_stream<R>(
        &self,
        reader: &mut R,
        total: u64,
        remote_path: &str,
        progress: &TransferProgress,
    ) -> Result<u64, SftpError>
    where
        R: AsyncRead + Unpin,
    {
        self.write_remote(reader, total, "<stream>", remote_path, progress)
            .await
    }

    async fn write_remote<R>(
        &self,
        reader: &mut R,
        total: u64,
        source: &str,
        remote_path: &str,
        progress: &TransferProgress,
    ) -> Result<u64, SftpError>
    where
        R: AsyncRead + Unpin,
    {
        if let Some((parent, _)) = remote_path.rsplit_once('/') {
            if !parent.is_empty() {
                self.ensure_dir(parent).await?;
            }
        }

        let mut remote = self
            .sftp
            .open_with_flags(
                remote_path.to_string(),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .await
            .map_err(|e| {
                SftpError::Transfer(format!("Failed to open remote file {}: {}", remote_path, e))
            })?;

        progress.init(total);
        let copied = copy_chunks(
            reader,
            &mut remote,
            self.chunk_size,
            total,
            progress,
            Direction::Upload,
            source,
            remote_path,
        )
        .await;
        let sent = match copied {
            Ok(sent) => sent,
            Err(e) => {
                progress.stop();
                let _ = remote.shutdown().await;
                return Err(e);
            }
        };

        remote.flush().await.map_err(|e| {
            SftpError::Transfer(format!("Failed to flush {}: {}", remote_path, e))
        })?;
        remote.shutdown().await.map_err(|e| {
            SftpError::Transfer(format!("Failed to close {}: {}", remote_path, e))
        })?;
        progress.end();

        Ok(sent)
    }

    /// Download a remote file, creating the local parent directory. The
    /// local copy is readable by the owner only.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: &TransferProgress,
    ) -> Result<u64, SftpError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SftpError::LocalIo(format!(
                    "Failed to create local directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let total = self
            .sftp
            .metadata(remote_path.to_string())
            .await
            .map_err(|e| {
                SftpError::FileOperation(format!(
                    "Failed to get metadata for {}: {}",
                    remote_path, e
                ))
            })?
            .size
            .unwrap_or(0);

        let mut remote = self.sftp.open(remote_path.to_string()).await.map_err(|e| {
            SftpError::Transfer(format!("Failed to open remote file {}: {}", remote_path, e))
        })?;

        let mut local = {
            let mut options = OpenOptions::new();
            options.create(true).write(true).truncate(true);
            #[cfg(unix)]
            {
                options.mode(0o600);
            }
            options.open(local_path).await.map_err(|e| {
                SftpError::LocalIo(format!(
                    "Failed to write local file {}: {}",
                    local_path.display(),
                    e
                ))
            })?
        };

        progress.init(total);
        let target = local_path.display().to_string();
        let received = match copy_chunks(
            &mut remote,
            &mut local,
            self.chunk_size,
            total,
            progress,
            Direction::Download,
            remote_path,
            &target,
        )
        .await
        {
            Ok(received) => received,
            Err(e) => {
                progress.stop();
                return Err(e);
            }
        };

        local.flush().await.map_err(|e| {
            SftpError::LocalIo(format!("Failed to flush {}: {}", target, e))
        })?;
        progress.end();

        Ok(received)
    }

    /// List a remote directory, without the `.` and `..` entries.
    pub async fn list_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, SftpError> {
        let read_dir = self.sftp.read_dir(dir.to_string()).await.map_err(|e| {
            SftpError::FileOperation(format!("Failed to read directory {}: {}", dir, e))
        })?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let metadata = entry.metadata();
            let modified = metadata
                .mtime
                .and_then(|mtime| Utc.timestamp_opt(mtime as i64, 0).single());

            entries.push(RemoteEntry {
                path: join_remote(dir, &name),
                name,
                is_dir: metadata.is_dir(),
                is_symlink: metadata.is_symlink(),
                size: metadata.size.unwrap_or(0),
                modified,
            });
        }
        Ok(entries)
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.sftp.remove_file(path.to_string()).await.map_err(|e| {
            SftpError::FileOperation(format!("Failed to remove file {}: {}", path, e))
        })
    }

    /// Remove a directory (must be empty)
    pub async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp.remove_dir(path.to_string()).await.map_err(|e| {
            SftpError::FileOperation(format!("Failed to remove directory {}: {}", path, e))
        })
    }
}

/// Copy `reader` to `writer` in chunks, reporting each chunk to `progress`.
/// A refused count aborts the copy with an error.
#[allow(clippy::too_many_arguments)]
async fn copy_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    total: u64,
    progress: &TransferProgress,
    direction: Direction,
    from: &str,
    to: &str,
) -> Result<u64, SftpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut copied: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| match direction {
            Direction::Upload => {
                SftpError::LocalIo(format!("Failed to read local file {}: {}", from, e))
            }
            Direction::Download => {
                SftpError::Transfer(format!("Failed to download {} to {}: {}", from, to, e))
            }
        })?;
        if n == 0 {
            return Ok(copied);
        }
        writer.write_all(&buf[..n]).await.map_err(|e| match direction {
            Direction::Upload => {
                SftpError::Transfer(format!("Failed to upload {} to {}: {}", from, to, e))
            }
            Direction::Download => {
                SftpError::LocalIo(format!("Failed to write local file {}: {}", to, e))
            }
        })?;
        copied += n as u64;
        if !progress.count(n as u64) {
            return Err(SftpError::Transfer(format!(
                "transfer aborted after {} of {} bytes",
                copied, total
            )));
        }
    }
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Every directory from the root down to `dir`, e.g. `/a/b` gives
/// `["/a", "/a/b"]`.
pub fn ancestor_dirs(dir: &str) -> Vec<String> {
    let absolute = dir.starts_with('/');
    let mut current = String::new();
    let mut result = Vec::new();
    for part in dir.split('/').filter(|p| !p.is_empty()) {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        result.push(current.clone());
    }
    result
}
