//! Spawning task children and handing them their job

use async_trait::async_trait;
use sprocket_core::{Bytecode, Header};
use sprocket_ipc::encode_handoff;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;

/// A launched child
#[derive(Debug)]
pub struct ChildHandle {
    pub pid: Option<u32>,
    /// Resolves with the exit code once the child has been reaped
    pub exited: Option<oneshot::Receiver<Option<i32>>>,
}

impl ChildHandle {
    /// Handle with no process behind it
    pub fn detached() -> Self {
        Self { pid: None, exited: None }
    }
}

/// Starts a child process for one run
#[async_trait]
pub trait ChildLauncher: Send + Sync {
    /// Spawn the child and hand it `header` and `bytecode`
    ///
    /// Spawn and stdin failures are reported here. Anything the child does
    /// afterwards is reported through status updates.
    async fn launch(&self, header: &Header, bytecode: &Bytecode) -> Result<ChildHandle, ExecutionError>;
}

/// Launches children as OS processes fed through stdin
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Re-run the current executable in child mode
    pub fn current_exe() -> Result<Self, ExecutionError> {
        let program = std::env::current_exe()
            .map_err(|e| ExecutionError::HandoffIo(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::with_program(program, ["--child"]))
    }

    pub fn with_program<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ChildLauncher for ProcessLauncher {
    async fn launch(&self, header: &Header, bytecode: &Bytecode) -> Result<ChildHandle, ExecutionError> {
        let buffer = encode_handoff(header, bytecode).map_err(|e| ExecutionError::HandoffIo(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ExecutionError::HandoffIo(format!("failed to spawn {}: {}", self.program.display(), e))
            })?;

        let pid = child.id();
        debug!("Spawned child {:?} for task {}", pid, header.task_id);

        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.start_kill();
            return Err(ExecutionError::HandoffIo("child stdin not captured".to_string()));
        };

        let written = async {
            stdin.write_all(&buffer).await?;
            stdin.shutdown().await
        }
        .await;
        drop(stdin);

        if let Err(e) = written {
            let _ = child.start_kill();
            return Err(ExecutionError::HandoffIo(format!("failed to write handoff: {}", e)));
        }

        let (tx, rx) = oneshot::channel();
        let task_id = header.task_id;
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => {
                    info!("Child for task {} exited with {}", task_id, status);
                    status.code()
                }
                Err(e) => {
                    warn!("Failed to reap child for task {}: {}", task_id, e);
                    None
                }
            };
            let _ = tx.send(code);
        });

        Ok(ChildHandle { pid, exited: Some(rx) })
    }
}
