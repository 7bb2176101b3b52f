//! Task supervisor: registry, lifecycle and run coordination
//!
//! One [`Supervisor`] owns the port pool and the task registry behind a
//! single lock. A run reserves its two ports (and, in restricted mode,
//! checks the live task cap) in one critical section, then compiles and
//! launches outside the lock. Any failure after the reservation hands the
//! ports back.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sprocket_compiler::SourceCompiler;
use sprocket_config::SprocketConfig;
use sprocket_core::{
    AccessPolicy, AllowAll, Bytecode, Compiler, Header, LangTable, Localizer, ScriptDefinition,
    ScriptNode, ScriptRegistry, Task, TaskId, TaskStatus, TraceStore,
};
use sprocket_ipc::{CmdData, CommandClient, StatusReport};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::broadcast::{ObserverFrame, StatusBroadcaster};
use crate::error::ExecutionError;
use crate::launcher::ChildLauncher;
use crate::package::PackageManager;
use crate::ports::PortPool;
use crate::trace::MemoryTraceStore;

/// Command asking a task to end itself
pub const STOP_COMMAND: &str = "stop";

/// Settings the supervisor needs from the configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub base_port: u16,
    pub port_pool_size: usize,
    /// Probe-bind ports before handing them out
    pub probe_ports: bool,
    pub restricted: bool,
    pub max_tasks: usize,
    pub default_lang: String,
    /// Port children report status to
    pub server_port: u16,
    pub log_level: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_config(&SprocketConfig::default())
    }
}

impl SupervisorConfig {
    pub fn from_config(config: &SprocketConfig) -> Self {
        Self {
            base_port: config.execution.base_port,
            port_pool_size: config.execution.port_pool_size,
            probe_ports: true,
            restricted: config.execution.restricted,
            max_tasks: config.execution.max_tasks,
            default_lang: config.execution.default_lang.clone(),
            server_port: config.server.port,
            log_level: Some(config.logging.level.as_str().to_string()),
        }
    }
}

/// A request to start a script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Name of the top-level script
    pub script: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub user_id: u32,
    #[serde(default)]
    pub role_id: u32,
    /// Raw values for the script's own parameters
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Opaque payload handed to the running program
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default)]
    pub console: bool,
    /// Pass-through fields for collaborators outside the supervisor
    #[serde(default)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl RunRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_identity(mut self, user_id: u32, role_id: u32) -> Self {
        self.user_id = user_id;
        self.role_id = role_id;
        self
    }
}

/// Result of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub task_id: TaskId,
    pub http_port: u16,
}

struct Reservation {
    task_id: TaskId,
    http_port: u16,
    local_port: u16,
}

struct SupervisorState {
    pool: PortPool,
    tasks: HashMap<TaskId, Task>,
    /// Runs holding ports that are not registered yet
    pending: HashSet<TaskId>,
}

impl SupervisorState {
    fn live_count(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_terminal()).count() + self.pending.len()
    }

    fn fresh_id(&self) -> TaskId {
        loop {
            let id = TaskId::random();
            if !self.tasks.contains_key(&id) && !self.pending.contains(&id) {
                return id;
            }
        }
    }

    fn release(&mut self, reservation: &Reservation) {
        self.pool.release(reservation.http_port);
        self.pool.release(reservation.local_port);
        self.pending.remove(&reservation.task_id);
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    state: Mutex<SupervisorState>,
    registry: Arc<dyn ScriptRegistry>,
    compiler: Arc<dyn Compiler>,
    launcher: Arc<dyn ChildLauncher>,
    policy: Arc<dyn AccessPolicy>,
    localizer: Arc<dyn Localizer>,
    traces: Arc<dyn TraceStore>,
    broadcaster: Arc<StatusBroadcaster>,
    commands: CommandClient,
    packages: Option<PackageManager>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        registry: Arc<dyn ScriptRegistry>,
        compiler: Arc<dyn Compiler>,
        launcher: Arc<dyn ChildLauncher>,
    ) -> Self {
        let pool = PortPool::new(config.base_port, config.port_pool_size).with_probe(config.probe_ports);
        Self {
            config,
            state: Mutex::new(SupervisorState {
                pool,
                tasks: HashMap::new(),
                pending: HashSet::new(),
            }),
            registry,
            compiler,
            launcher,
            policy: Arc::new(AllowAll),
            localizer: Arc::new(LangTable::new()),
            traces: Arc::new(MemoryTraceStore::new()),
            broadcaster: Arc::new(StatusBroadcaster::new()),
            commands: CommandClient::new(),
            packages: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_trace_store(mut self, traces: Arc<dyn TraceStore>) -> Self {
        self.traces = traces;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<StatusBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_command_client(mut self, commands: CommandClient) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_packages(mut self, packages: PackageManager) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.broadcaster
    }

    pub fn registry(&self) -> &Arc<dyn ScriptRegistry> {
        &self.registry
    }

    /// Start a script in a new child process
    ///
    /// The task is registered in `Start` before the child is launched, so
    /// reports from a fast child always find it.
    pub async fn run_script(self: &Arc<Self>, request: RunRequest) -> Result<RunOutcome, ExecutionError> {
        let reservation = self.reserve().await?;

        let (header, bytecode) = match self.prepare(&request, &reservation) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Run of '{}' failed: {}", request.script, e);
                self.state.lock().await.release(&reservation);
                return Err(e);
            }
        };

        let outcome = RunOutcome {
            task_id: reservation.task_id,
            http_port: reservation.http_port,
        };
        {
            let mut state = self.state.lock().await;
            state.pending.remove(&reservation.task_id);
            state.tasks.insert(reservation.task_id, Task::from_header(&header));
        }

        let handle = match self.launcher.launch(&header, &bytecode).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Launch of '{}' failed: {}", request.script, e);
                self.abandon(&reservation).await;
                return Err(e);
            }
        };
        info!(
            "Started task {} ({}) on port {}",
            outcome.task_id, request.script, outcome.http_port
        );

        if let Some(exited) = handle.exited {
            let supervisor = Arc::clone(self);
            tokio::spawn(async move {
                if let Ok(code) = exited.await {
                    supervisor.child_exited(outcome.task_id, code).await;
                }
            });
        }

        Ok(outcome)
    }

    /// Drop a registered task whose launch failed
    ///
    /// A task that already reached a terminal state has released its ports
    /// and keeps its record.
    async fn abandon(&self, reservation: &Reservation) {
        let mut state = self.state.lock().await;
        let live = state
            .tasks
            .get(&reservation.task_id)
            .map(|task| !task.is_terminal())
            .unwrap_or(false);
        if live {
            state.tasks.remove(&reservation.task_id);
            state.release(reservation);
        }
    }

    /// Cap check, task id and both ports in one critical section
    async fn reserve(&self) -> Result<Reservation, ExecutionError> {
        let mut state = self.state.lock().await;

        if self.config.restricted && state.live_count() >= self.config.max_tasks {
            return Err(ExecutionError::LimitExceeded {
                limit: self.config.max_tasks,
            });
        }

        let http_port = state.pool.acquire()?;
        let local_port = match state.pool.acquire() {
            Ok(port) => port,
            Err(e) => {
                state.pool.release(http_port);
                return Err(e);
            }
        };

        let task_id = state.fresh_id();
        state.pending.insert(task_id);

        Ok(Reservation {
            task_id,
            http_port,
            local_port,
        })
    }

    /// Resolve, localize and compile a run into its header and bytecode
    fn prepare(
        &self,
        request: &RunRequest,
        reservation: &Reservation,
    ) -> Result<(Header, Bytecode), ExecutionError> {
        let def = self.runnable_script(request)?;
        let lang = request
            .lang
            .clone()
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| self.config.default_lang.clone());
        let title = self.localize(&lang, def.display_title());

        let mut header = Header::new(reservation.task_id, def.name.clone())
            .with_title(title)
            .with_lang(lang)
            .with_identity(request.user_id, request.role_id)
            .with_ports(reservation.http_port, reservation.local_port)
            .with_server_port(self.config.server_port)
            .with_data(request.data.clone());
        header.console = request.console;
        header.log_level = self.config.log_level.clone();
        header.extra = request.extra.clone();
        if self.config.restricted {
            header = header.with_restricted(self.config.max_tasks);
        }

        let source = self.compile_tree(&def, &request.values)?;
        let bytecode = self.compiler.compile(&source)?;
        Ok((header, bytecode))
    }

    fn runnable_script(&self, request: &RunRequest) -> Result<Arc<ScriptDefinition>, ExecutionError> {
        let def = self
            .registry
            .get(&request.script)
            .ok_or_else(|| ExecutionError::ScriptNotFound(request.script.clone()))?;

        if !self.policy.can_run(request.role_id, &def) {
            return Err(ExecutionError::AccessDenied {
                script: def.name.clone(),
                role_id: request.role_id,
            });
        }

        if def.unrunnable {
            return Err(ExecutionError::Unrunnable(def.name.clone()));
        }

        Ok(def)
    }

    /// Requested language, then the default language, then the key itself
    fn localize(&self, lang: &str, key: &str) -> String {
        self.localizer
            .lookup(lang, key)
            .or_else(|| self.localizer.lookup(&self.config.default_lang, key))
            .unwrap_or_else(|| key.to_string())
    }

    fn compile_tree(
        &self,
        def: &ScriptDefinition,
        values: &BTreeMap<String, String>,
    ) -> Result<String, ExecutionError> {
        let mut root = ScriptNode::new(def.name.clone()).with_children(def.tree.clone());
        root.values = values.clone();

        let source = SourceCompiler::new(self.registry.as_ref()).compile(&[root])?;
        debug!("Generated {} bytes of source for '{}'", source.len(), def.name);
        Ok(source)
    }

    /// Program text a run of `script` would execute
    pub fn generate_source(
        &self,
        script: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, ExecutionError> {
        let def = self
            .registry
            .get(script)
            .ok_or_else(|| ExecutionError::ScriptNotFound(script.to_string()))?;
        self.compile_tree(&def, values)
    }

    /// Apply a status report from a child
    ///
    /// Reports for terminal tasks are rejected and change nothing. Reaching a
    /// terminal state frees the task's ports and records its trace.
    pub async fn update_status(&self, report: StatusReport) -> Result<Task, ExecutionError> {
        let time = report.effective_time();

        let task = {
            let mut state = self.state.lock().await;
            let task = state
                .tasks
                .get_mut(&report.task_id)
                .ok_or(ExecutionError::TaskNotFound(report.task_id))?;

            if !task.status.can_transition_to(report.status) {
                return Err(ExecutionError::InvalidTransition {
                    task_id: task.id,
                    from: task.status,
                    to: report.status,
                });
            }

            task.status = report.status;
            task.message = report.message;
            if task.is_terminal() {
                task.finished_at = time;
            }
            let task = task.clone();

            if task.is_terminal() {
                state.pool.release(task.http_port);
                state.pool.release(task.local_port);
            }
            task
        };

        debug!("Task {} is now {}", task.id, task.status);

        if task.is_terminal() {
            info!("Task {} ended as {}: {}", task.id, task.status, task.message);
            if let Err(e) = self.traces.record(&task).await {
                error!("Failed to record trace for task {}: {}", task.id, e);
            }
        }

        self.broadcaster.publish(&ObserverFrame::status(&task, time)).await;
        Ok(task)
    }

    /// Mark a task whose process went away without a final report
    async fn child_exited(&self, task_id: TaskId, code: Option<i32>) {
        let live = self
            .state
            .lock()
            .await
            .tasks
            .get(&task_id)
            .map(|task| !task.is_terminal())
            .unwrap_or(false);
        if !live {
            return;
        }

        let message = match code {
            Some(code) => format!("process exited with code {}", code),
            None => "process terminated by signal".to_string(),
        };
        warn!("Task {} crashed: {}", task_id, message);

        let report = StatusReport::new(task_id, TaskStatus::Crashed, message);
        if let Err(e) = self.update_status(report).await {
            debug!("Crash report for task {} ignored: {}", task_id, e);
        }
    }

    /// All known tasks, oldest first
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.state.lock().await.tasks.values().cloned().collect();
        tasks.sort_by_key(|task| (task.started_at, task.id));
        tasks
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<Task, ExecutionError> {
        self.state
            .lock()
            .await
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(ExecutionError::TaskNotFound(task_id))
    }

    /// Number of ports currently held by tasks
    pub async fn ports_in_use(&self) -> usize {
        self.state.lock().await.pool.in_use()
    }

    /// Send a command to a running task's control endpoint
    pub async fn send_command(
        &self,
        task_id: TaskId,
        cmd: &str,
        value: JsonValue,
    ) -> Result<CmdData, ExecutionError> {
        let task = self.get_task(task_id).await?;
        if task.is_terminal() {
            return Err(ExecutionError::TaskNotRunning(task_id));
        }

        let request = CmdData::request(task_id, cmd, value);
        Ok(self.commands.send(task.local_port, &request).await?)
    }

    /// Ask a task to end itself
    pub async fn stop_task(&self, task_id: TaskId) -> Result<CmdData, ExecutionError> {
        info!("Stopping task {}", task_id);
        self.send_command(task_id, STOP_COMMAND, JsonValue::Null).await
    }

    /// Start an auxiliary package serving a running task
    ///
    /// Returns the port the package answered with. A package that already
    /// answered once is not started again.
    pub async fn start_package(&self, task_id: TaskId, name: &str) -> Result<u16, ExecutionError> {
        let packages = self
            .packages
            .as_ref()
            .ok_or(ExecutionError::PackagesDisabled)?;

        let task = self.get_task(task_id).await?;
        if task.is_terminal() {
            return Err(ExecutionError::TaskNotRunning(task_id));
        }

        Ok(packages.start(name, task_id, task.local_port).await?)
    }

    /// Close every observer connection
    pub async fn shutdown(&self) {
        self.broadcaster.shutdown_all().await;
    }
}
