//! `sprocket serve`

use anyhow::{Context, Result};
use sprocket_config::SprocketConfig;
use sprocket_execution::Supervisor;
use sprocket_server::{create_supervisor_app, AppConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use super::build_supervisor;

/// Run the supervisor until Ctrl+C
pub async fn serve(config: &SprocketConfig) -> Result<()> {
    let supervisor = build_supervisor(config)?;
    let listener = bind(config).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    serve_until(listener, supervisor, shutdown_signal).await?;
    info!("Sprocket supervisor shutdown complete");
    Ok(())
}

pub async fn bind(config: &SprocketConfig) -> Result<TcpListener> {
    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind supervisor on {}", addr))?;
    info!("Supervisor listening on: {}", addr);
    Ok(listener)
}

/// Serve the supervisor app until `signal` resolves, then close observers
pub async fn serve_until<F>(listener: TcpListener, supervisor: Arc<Supervisor>, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_supervisor_app(supervisor.clone(), AppConfig::default());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            supervisor.shutdown().await;
        })
        .await
        .context("Supervisor server error")?;
    Ok(())
}
