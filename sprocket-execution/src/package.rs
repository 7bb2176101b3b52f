//! Auxiliary package processes
//!
//! A package is an executable in the packages directory that serves a task
//! over the command channel. It is started with `-t=<task id>` and
//! `-p=<task local port>` and answers with a single stdout line `#<port>`
//! naming the port it listens on. Errors go to stderr.

use sprocket_core::TaskId;
use sprocket_ipc::IpcError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Parse a handshake line of the form `#<port>`
pub fn parse_handshake(line: &str) -> Option<u16> {
    line.trim().strip_prefix('#')?.trim().parse().ok()
}

/// Starts packages and remembers the ports of those that answered
pub struct PackageManager {
    dir: PathBuf,
    timeout: Duration,
    started: Mutex<HashMap<String, u16>>,
}

impl PackageManager {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
            started: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Port of an already running package
    pub async fn port_of(&self, name: &str) -> Option<u16> {
        self.started.lock().await.get(name).copied()
    }

    /// Start `name` for a task, or return the port it already answered with
    pub async fn start(&self, name: &str, task_id: TaskId, local_port: u16) -> Result<u16, IpcError> {
        // Held for the whole handshake so a package is never started twice
        let mut started = self.started.lock().await;
        if let Some(port) = started.get(name) {
            debug!("Package {} already running on {}", name, port);
            return Ok(*port);
        }

        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(IpcError::HandshakeFailed(format!("invalid package name '{}'", name)));
        }

        let path = self.dir.join(name);
        let mut child = Command::new(&path)
            .arg(format!("-t={}", task_id))
            .arg(format!("-p={}", local_port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IpcError::HandshakeFailed(format!("failed to start {}: {}", path.display(), e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // The sender is taken on the first valid line; later output is ignored
        let (tx, rx) = oneshot::channel::<u16>();
        if let Some(stdout) = stdout {
            let package = name.to_string();
            tokio::spawn(async move {
                let mut handshake = Some(tx);
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match (parse_handshake(&line), handshake.take()) {
                        (Some(port), Some(tx)) => {
                            let _ = tx.send(port);
                        }
                        (_, pending) => {
                            handshake = pending;
                            debug!(package = %package, "{}", line);
                        }
                    }
                }
            });
        }

        let errors = Arc::new(Mutex::new(String::new()));
        let stderr_reader = stderr.map(|mut stderr| {
            let errors = errors.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 1024];
                while let Ok(n) = stderr.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    errors.lock().await.push_str(&String::from_utf8_lossy(&chunk[..n]));
                }
            })
        });

        let package = name.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Package {} exited with {}", package, status),
                Err(e) => warn!("Failed to reap package {}: {}", package, e),
            }
        });

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        if matches!(outcome, Ok(Err(_))) {
            // Stdout closed without a port; let stderr drain before reporting
            if let Some(reader) = stderr_reader {
                let _ = tokio::time::timeout(self.timeout, reader).await;
            }
        }
        let collected = errors.lock().await.trim().to_string();

        match outcome {
            Ok(Ok(port)) => {
                info!("Package {} listening on {}", name, port);
                started.insert(name.to_string(), port);
                Ok(port)
            }
            Ok(Err(_)) if collected.is_empty() => Err(IpcError::HandshakeFailed("no answer".to_string())),
            Ok(Err(_)) => Err(IpcError::HandshakeFailed(collected)),
            Err(_) if collected.is_empty() => Err(IpcError::Timeout),
            Err(_) => Err(IpcError::HandshakeFailed(collected)),
        }
    }
}
