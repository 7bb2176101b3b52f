//! Command implementations

pub mod child;
pub mod config;
pub mod run;
pub mod serve;

use anyhow::{Context, Result};
use sprocket_config::SprocketConfig;
use sprocket_core::{LangTable, TraceStore};
use sprocket_execution::{
    InMemoryScriptRegistry, JsonlTraceStore, MemoryTraceStore, PackageManager, ProcessLauncher, Supervisor,
    SupervisorConfig,
};
use sprocket_js::JsCompiler;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Wire a supervisor from configuration
pub fn build_supervisor(config: &SprocketConfig) -> Result<Arc<Supervisor>> {
    let registry = match &config.scripts.dir {
        Some(dir) => InMemoryScriptRegistry::load_dir(dir)
            .with_context(|| format!("Failed to load scripts from {:?}", dir))?,
        None => InMemoryScriptRegistry::with_builtins(),
    };

    let titles = LangTable::from_definitions(registry.definitions());

    let traces: Arc<dyn TraceStore> = match &config.storage.trace_file {
        Some(path) => {
            info!("Recording task traces to {:?}", path);
            Arc::new(JsonlTraceStore::new(path.clone()))
        }
        None => Arc::new(MemoryTraceStore::new()),
    };

    let launcher = ProcessLauncher::current_exe().context("Failed to prepare child launcher")?;

    let mut supervisor = Supervisor::new(
        SupervisorConfig::from_config(config),
        Arc::new(registry),
        Arc::new(JsCompiler),
        Arc::new(launcher),
    )
    .with_localizer(Arc::new(titles))
    .with_trace_store(traces);

    if let Some(dir) = &config.execution.packages_dir {
        supervisor = supervisor.with_packages(PackageManager::new(
            dir.clone(),
            config.execution.package_handshake_timeout,
        ));
    }

    Ok(Arc::new(supervisor))
}

/// Collect `--param` pairs, later values winning
pub fn param_map(params: &[(String, String)]) -> BTreeMap<String, String> {
    params.iter().cloned().collect()
}
