//! `sprocket run`: start one script and wait for its final status

use anyhow::{Context, Result};
use sprocket_config::SprocketConfig;
use sprocket_core::{Task, TaskStatus};
use sprocket_execution::{ObserverFrame, ObserverMessage, RunRequest, CMD_STATUS};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::build_supervisor;
use super::serve::{bind, serve_until};

const OBSERVER_ID: &str = "sprocket-run";

pub async fn run(
    config: &SprocketConfig,
    script: &str,
    lang: Option<String>,
    values: BTreeMap<String, String>,
) -> Result<()> {
    let supervisor = build_supervisor(config)?;
    let listener = bind(config).await?;

    // Subscribe before the run so the final frame cannot be missed
    let mut frames = supervisor.broadcaster().add(OBSERVER_ID).await;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_until(listener, supervisor.clone(), async move {
        let _ = stop_rx.await;
    }));

    let mut request = RunRequest::new(script);
    request.lang = lang;
    request.values = values;
    request.console = true;

    let outcome = supervisor.run_script(request).await;
    let result = match outcome {
        Ok(outcome) => {
            info!("Task {} started, public port {}", outcome.task_id, outcome.http_port);
            wait_for_end(&mut frames, outcome.task_id.as_u32()).await
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to run '{}'", script))),
    };

    let _ = stop_tx.send(());
    server.await.context("Supervisor task panicked")??;

    let task = result?;
    println!("{} {}: {}", task.title, task.status, task.message);
    if task.status != TaskStatus::Finished {
        anyhow::bail!("Task {} ended as {}", task.id, task.status);
    }
    Ok(())
}

async fn wait_for_end(frames: &mut mpsc::UnboundedReceiver<ObserverMessage>, task_id: u32) -> Result<Task> {
    while let Some(message) = frames.recv().await {
        let ObserverMessage::Text(text) = message else {
            break;
        };
        let frame: ObserverFrame = serde_json::from_str(&text).context("Malformed observer frame")?;
        if frame.cmd != CMD_STATUS {
            continue;
        }
        let Some(task) = frame.task else {
            continue;
        };
        if task.id.as_u32() != task_id {
            continue;
        }

        debug!("Task {} is {}", task.id, task.status);
        if task.is_terminal() {
            return Ok(task);
        }
    }
    anyhow::bail!("Supervisor closed before task {} ended", task_id)
}
