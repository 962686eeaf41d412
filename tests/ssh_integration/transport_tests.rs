//! Transport session tests against a live server

use std::sync::Arc;
use std::time::Duration;

use autodeploy::error::SshError;
use autodeploy::sftp::TransferProgress;
use autodeploy::sink::BufferSink;
use autodeploy::ssh::RemoteSession;

use super::fixtures::SshTestEnvironment;

/// Test successful connection with password authentication
#[tokio::test]
async fn test_password_auth_success() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");

    let session = env
        .transport()
        .connect_session(&env.server.target())
        .await
        .expect("Password auth should succeed");

    assert!(session.probe().await.is_ok());

    let result = session
        .open_exec("echo hello", Duration::from_secs(5))
        .await
        .expect("exec should succeed");
    assert_eq!(result.stdout.trim(), "hello");
    assert_eq!(result.exit_code, 0);

    session.close().await;
    session.close().await;
    assert!(session.is_closed());
    assert!(matches!(
        session.open_exec("true", Duration::from_secs(5)).await,
        Err(SshError::Closed(_))
    ));
}

/// Test that a wrong password is rejected
#[tokio::test]
async fn test_wrong_password_fails() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");

    let result = env
        .transport()
        .connect_session(&env.server.target_with_password("wrong-password"))
        .await;

    assert!(
        matches!(result, Err(SshError::AuthenticationFailed(_))),
        "Wrong password should fail authentication: {:?}",
        result.map(|_| ())
    );
}

/// Test that shell output reaches the attached reader
#[tokio::test]
async fn test_shell_output_streams_to_sink() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = env
        .transport()
        .connect_session(&env.server.target())
        .await
        .expect("connect should succeed");

    let channel = session.open_shell().await.expect("shell should open");
    let sink = Arc::new(BufferSink::new());
    assert!(channel.attach_reader(sink.clone()));

    channel
        .write("echo autodeploy-marker-$((40+2))")
        .await
        .expect("write should succeed");

    let seen = tokio::time::timeout(Duration::from_secs(10), async {
        while !sink.contents().contains("autodeploy-marker-42") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(seen.is_ok(), "shell output never arrived: {}", sink.contents());

    channel.close().await;
    channel.write("echo late").await.expect("late writes are dropped");
    session.close().await;
}

/// Test uploading into a directory that does not exist yet
#[tokio::test]
async fn test_upload_creates_remote_directories() {
    skip_if_no_server!();
    let _guard = super::fixtures::acquire_test_lock().await;

    let env = SshTestEnvironment::new()
        .await
        .expect("Failed to create test environment");
    let session = env
        .transport()
        .connect_session(&env.server.target())
        .await
        .expect("connect should succeed");

    let local_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let local = local_dir.path().join("artifact.bin");
    let contents = vec![7u8; 100 * 1024];
    std::fs::write(&local, &contents).expect("Failed to write artifact");

    let remote_dir = format!("/tmp/autodeploy-it-{}", std::process::id());
    let remote = format!("{}/nested/artifact.bin", remote_dir);

    let progress = TransferProgress::new(Arc::new(BufferSink::new()));
    let sent = session
        .upload(&local, &remote, &progress)
        .await
        .expect("upload should succeed");
    assert_eq!(sent, contents.len() as u64);

    let state = progress.snapshot();
    assert!(state.is_done);
    assert_eq!(state.bytes_sent, contents.len() as u64);
    assert!(!progress.is_ticking());

    let size = session
        .open_exec(&format!("wc -c < {}", remote), Duration::from_secs(5))
        .await
        .expect("exec should succeed");
    assert_eq!(size.stdout.trim(), contents.len().to_string());

    let _ = session
        .open_exec(&format!("rm -rf {}", remote_dir), Duration::from_secs(5))
        .await;
    session.close().await;
}
