//! Child runtime: `sprocket --child`
//!
//! Reads the job from stdin, serves the task's control and public ports,
//! runs the program on a blocking thread and reports its lifecycle to the
//! supervisor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use sprocket_core::{Bytecode, ExecutionEnv, Executor, Header, TaskStatus};
use sprocket_execution::STOP_COMMAND;
use sprocket_ipc::{read_handoff, CmdData, CommandHandler, StatusReport};
use sprocket_js::JsExecutor;
use sprocket_server::{create_control_app, create_public_app, ChildState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Decode the job from stdin
///
/// Any decode failure is fatal for the child.
pub async fn receive() -> Result<(Header, Bytecode)> {
    read_handoff(tokio::io::stdin())
        .await
        .context("Failed to decode job from stdin")
}

/// Posts status reports to the supervisor
struct StatusReporter {
    http: reqwest::Client,
    url: String,
}

impl StatusReporter {
    fn new(server_port: u16) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: format!("http://127.0.0.1:{}/api/taskstatus", server_port),
        }
    }

    async fn report(&self, report: StatusReport) {
        debug!("Reporting {} for task {}", report.status, report.task_id);
        match self.http.post(&self.url).json(&report).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!("Supervisor rejected status report: HTTP {}", response.status()),
            Err(e) => warn!("Failed to report status: {}", e),
        }
    }
}

/// Commands accepted on the control port
struct ChildCommands {
    state: ChildState,
    stop: watch::Sender<bool>,
}

#[async_trait]
impl CommandHandler for ChildCommands {
    async fn handle(&self, request: &CmdData) -> Result<JsonValue, String> {
        match request.cmd.as_str() {
            STOP_COMMAND => {
                info!("Stop requested");
                self.stop.send_replace(true);
                Ok(json!("stopping"))
            }
            "status" => Ok(self.state.summary().await),
            other => Err(format!("unknown command {}", other)),
        }
    }
}

async fn serve_on(port: u16, app: axum::Router) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind task port {}", port))?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Task endpoint on port {} failed: {}", port, e);
        }
    });
    Ok(())
}

/// Run one job to its end, returning the final status
pub async fn run_child(header: Header, bytecode: Bytecode) -> Result<TaskStatus> {
    let task_id = header.task_id;
    let reporter = StatusReporter::new(header.server_port);
    let state = ChildState::new(header.clone());
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let commands = Arc::new(ChildCommands {
        state: state.clone(),
        stop: stop_tx,
    });
    let endpoints = async {
        serve_on(header.local_port, create_control_app(commands)).await?;
        serve_on(header.http_port, create_public_app(state.clone())).await
    };
    if let Err(e) = endpoints.await {
        reporter
            .report(StatusReport::new(task_id, TaskStatus::Failed, e.to_string()))
            .await;
        return Err(e);
    }

    state.set_status(TaskStatus::Active).await;
    reporter.report(StatusReport::new(task_id, TaskStatus::Active, "")).await;
    info!("Task {} ({}) running", task_id, header.name);

    let env = ExecutionEnv {
        task_id,
        name: header.name.clone(),
        lang: header.lang.clone(),
        data: header.data.clone(),
    };
    let execution = tokio::task::spawn_blocking(move || JsExecutor::new().run(&bytecode, &env));

    let (status, message) = tokio::select! {
        joined = execution => match joined {
            Ok(Ok(value)) => {
                if header.console && !value.is_null() {
                    println!("{}", value);
                }
                (TaskStatus::Finished, result_message(&value))
            }
            Ok(Err(e)) => (TaskStatus::Failed, e.to_string()),
            Err(e) => (TaskStatus::Failed, format!("executor panicked: {}", e)),
        },
        Ok(_) = stop_rx.wait_for(|stop| *stop) => (TaskStatus::Terminated, "stopped".to_string()),
    };

    state.set_status(status).await;
    reporter.report(StatusReport::new(task_id, status, message)).await;
    info!("Task {} ended as {}", task_id, status);
    Ok(status)
}

/// Message stored with a finished task
fn result_message(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}
