//! File-transfer channel tests against a live server

use std::sync::Arc;
use std::time::Duration;

use autodeploy::error::SftpError;
use autodeploy::sftp::TransferProgress;
use autodeploy::sink::BufferSink;
use autodeploy::ssh::TransportSession;

use super::fixtures::SshTestEnvironment;

async fn connect(env: &SshTestEnvironment) -> TransportSession {
    env.transport()
        .connect_session(&env.server.target())
        .await
        .expect("connect should succeed")
}

fn scratch_dir(name: &str) -> String {
    format!("/tmp/autodeploy-it-{}-{}", name, std::process::id())
}

async fn cleanup(session: &TransportSession, dir: &str) {
    let _ = session
        .open_exec(&format!("rm -rf {}", dir), Duration::from_secs(5))
        .await;
}

/// Test that a streamed upload comes back byte for byte on download
#[tokio::test]
async fn test_stream_upload_then_download() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = connect(&env).await;
    let dir = scratch_dir("download");
    let remote = format!("{}/payload.bin", dir);

    let contents: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    let sftp = session.open_transfer().await.expect("sftp should open");
    let progress = TransferProgress::new(Arc::new(BufferSink::new()));
    let mut reader: &[u8] = &contents;
    let sent = sftp
        .upload_stream(&mut reader, contents.len() as u64, &remote, &progress)
        .await
        .expect("stream upload should succeed");
    assert_eq!(sent, contents.len() as u64);

    let local_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let local = local_dir.path().join("nested").join("payload.bin");
    let progress = TransferProgress::new(Arc::new(BufferSink::new()));
    let received = sftp
        .download(&remote, &local, &progress)
        .await
        .expect("download should succeed");

    assert_eq!(received, contents.len() as u64);
    assert_eq!(std::fs::read(&local).expect("downloaded file"), contents);
    assert!(progress.snapshot().is_done);
    assert!(!progress.is_ticking());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&local).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    cleanup(&session, &dir).await;
    session.close().await;
}

/// Test that a missing remote file is a file operation error
#[tokio::test]
async fn test_download_missing_file_fails() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = connect(&env).await;
    let sftp = session.open_transfer().await.expect("sftp should open");

    let local_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let progress = TransferProgress::new(Arc::new(BufferSink::new()));
    let result = sftp
        .download(
            &format!("{}/absent.bin", scratch_dir("missing")),
            &local_dir.path().join("absent.bin"),
            &progress,
        )
        .await;

    assert!(matches!(result, Err(SftpError::FileOperation(_))));
    session.close().await;
}

/// Test listing a directory and removing what it contains
#[tokio::test]
async fn test_list_and_remove() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = connect(&env).await;
    let dir = scratch_dir("list");
    let sftp = session.open_transfer().await.expect("sftp should open");

    sftp.ensure_dir(&format!("{}/sub", dir))
        .await
        .expect("directories should be created");
    let progress = TransferProgress::new(Arc::new(BufferSink::new()));
    let mut reader: &[u8] = b"hello";
    sftp.upload_stream(&mut reader, 5, &format!("{}/a.txt", dir), &progress)
        .await
        .expect("upload should succeed");

    let mut entries = sftp.list_dir(&dir).await.expect("listing should succeed");
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "sub"]);

    assert!(!entries[0].is_dir);
    assert_eq!(entries[0].size, 5);
    assert_eq!(entries[0].path, format!("{}/a.txt", dir));
    assert!(entries[1].is_dir);

    // A directory with contents cannot be removed
    assert!(sftp.remove_dir(&dir).await.is_err());

    sftp.remove_file(&format!("{}/a.txt", dir))
        .await
        .expect("file removal should succeed");
    sftp.remove_dir(&format!("{}/sub", dir))
        .await
        .expect("empty directory removal should succeed");
    assert!(
        sftp.list_dir(&dir)
            .await
            .expect("listing should succeed")
            .is_empty()
    );

    sftp.remove_dir(&dir)
        .await
        .expect("empty directory removal should succeed");
    assert!(sftp.list_dir(&dir).await.is_err());
    assert!(matches!(
        sftp.remove_file(&format!("{}/a.txt", dir)).await,
        Err(SftpError::FileOperation(_))
    ));

    session.close().await;
}
