//! Package startup handshake against small shell scripts
#![cfg(unix)]

use sprocket_core::TaskId;
use sprocket_execution::PackageManager;
use sprocket_ipc::IpcError;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

fn write_package(dir: &Path, name: &str, script: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_package_answers_with_port() {
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "mailer", "echo starting\necho '#4567'\nsleep 1");

    let manager = PackageManager::new(dir.path(), Duration::from_secs(2));
    let port = manager.start("mailer", TaskId(9), 3300).await.unwrap();
    assert_eq!(port, 4567);
    assert_eq!(manager.port_of("mailer").await, Some(4567));
}

#[tokio::test]
async fn test_package_receives_task_and_port() {
    let dir = tempfile::tempdir().unwrap();
    let args = dir.path().join("args.txt");
    write_package(
        dir.path(),
        "echoer",
        &format!("echo \"$@\" > {}\necho '#5000'", args.display()),
    );

    let manager = PackageManager::new(dir.path(), Duration::from_secs(2));
    manager.start("echoer", TaskId(77), 3301).await.unwrap();

    let recorded = fs::read_to_string(&args).unwrap();
    assert_eq!(recorded.trim(), "-t=77 -p=3301");
}

#[tokio::test]
async fn test_stderr_becomes_the_error() {
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "broken", "echo 'missing licence' >&2\nexit 1");

    let manager = PackageManager::new(dir.path(), Duration::from_secs(2));
    let err = manager.start("broken", TaskId(1), 3302).await.unwrap_err();
    match err {
        IpcError::HandshakeFailed(message) => assert_eq!(message, "missing licence"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(manager.port_of("broken").await, None);
}

#[tokio::test]
async fn test_silent_package_times_out() {
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "mute", "exec sleep 3");

    let manager = PackageManager::new(dir.path(), Duration::from_millis(200));
    let err = manager.start("mute", TaskId(1), 3303).await.unwrap_err();
    assert!(matches!(err, IpcError::Timeout));
}

#[tokio::test]
async fn test_second_start_reuses_running_package() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("starts");
    write_package(
        dir.path(),
        "once",
        &format!("echo x >> {}\necho '#4600'\nsleep 1", counter.display()),
    );

    let manager = PackageManager::new(dir.path(), Duration::from_secs(2));
    let first = manager.start("once", TaskId(1), 3304).await.unwrap();
    let second = manager.start("once", TaskId(2), 3305).await.unwrap();

    assert_eq!(first, second);
    let starts = fs::read_to_string(&counter).unwrap();
    assert_eq!(starts.lines().count(), 1);
}
