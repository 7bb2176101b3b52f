//! Supervisor lifecycle tests with an in-memory launcher

use async_trait::async_trait;
use serde_json::json;
use sprocket_core::{
    AccessPolicy, Bytecode, Compiler, EngineError, Header, LangTable, ParamDef, ParamType,
    ScriptDefinition, ScriptNode, TaskId, TaskStatus,
};
use sprocket_execution::{
    ChildHandle, ChildLauncher, ExecutionError, InMemoryScriptRegistry, MemoryTraceStore,
    ObserverFrame, ObserverMessage, RunRequest, StatusBroadcaster, Supervisor, SupervisorConfig,
};
use sprocket_ipc::StatusReport;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

struct TextCompiler;

impl Compiler for TextCompiler {
    fn compile(&self, source: &str) -> Result<Bytecode, EngineError> {
        Ok(Bytecode::new("text", source.as_bytes().to_vec()))
    }
}

#[derive(Default)]
struct FakeLauncher {
    launched: Mutex<Vec<(Header, Bytecode)>>,
    exits: Mutex<Vec<oneshot::Sender<Option<i32>>>>,
    fail: bool,
}

#[async_trait]
impl ChildLauncher for FakeLauncher {
    async fn launch(&self, header: &Header, bytecode: &Bytecode) -> Result<ChildHandle, ExecutionError> {
        if self.fail {
            return Err(ExecutionError::HandoffIo("spawn refused".to_string()));
        }
        self.launched.lock().await.push((header.clone(), bytecode.clone()));

        let (tx, rx) = oneshot::channel();
        self.exits.lock().await.push(tx);
        Ok(ChildHandle {
            pid: None,
            exited: Some(rx),
        })
    }
}

struct AdminOnly;

impl AccessPolicy for AdminOnly {
    fn can_run(&self, role_id: u32, script: &ScriptDefinition) -> bool {
        script.role.is_none() || role_id == 1
    }
}

fn registry() -> Arc<InMemoryScriptRegistry> {
    let mut registry = InMemoryScriptRegistry::with_builtins();
    registry.insert(
        ScriptDefinition::new("log")
            .with_param(ParamDef::new("text", ParamType::Text).required())
            .with_body("log(text);"),
    );
    registry.insert(
        ScriptDefinition::new("hello")
            .with_title("Hello")
            .with_localized_title("fr", "Bonjour")
            .with_param(ParamDef::new("greeting", ParamType::Text).with_default("hi"))
            .with_tree(vec![ScriptNode::new("log").with_value("text", "one")]),
    );
    registry.insert(ScriptDefinition::new("fragment").unrunnable());
    let mut admin = ScriptDefinition::new("admin");
    admin.role = Some("admin".to_string());
    registry.insert(admin);
    registry.insert(ScriptDefinition::new("broken").with_tree(vec![ScriptNode::new("log")]));
    Arc::new(registry)
}

fn config(pool: usize, restricted: bool, max_tasks: usize) -> SupervisorConfig {
    SupervisorConfig {
        base_port: 43000,
        port_pool_size: pool,
        probe_ports: false,
        restricted,
        max_tasks,
        default_lang: "en".to_string(),
        server_port: 43000,
        log_level: None,
    }
}

fn supervisor(config: SupervisorConfig, launcher: Arc<FakeLauncher>) -> Arc<Supervisor> {
    let reg = registry();
    let titles = LangTable::from_definitions(reg.definitions());
    Arc::new(
        Supervisor::new(config, reg, Arc::new(TextCompiler), launcher)
            .with_policy(Arc::new(AdminOnly))
            .with_localizer(Arc::new(titles)),
    )
}

#[tokio::test]
async fn test_run_registers_task_and_hands_off_job() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(8, false, 0), launcher.clone());

    let outcome = sup
        .run_script(RunRequest::new("hello").with_lang("fr").with_identity(4, 2))
        .await
        .unwrap();

    let task = sup.get_task(outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Start);
    assert_eq!(task.title, "Bonjour");
    assert_eq!(task.http_port, outcome.http_port);
    assert_ne!(task.http_port, task.local_port);
    assert_eq!(sup.ports_in_use().await, 2);

    let launched = launcher.launched.lock().await;
    let (header, bytecode) = &launched[0];
    assert_eq!(header.task_id, outcome.task_id);
    assert_eq!(header.server_port, 43000);
    assert_eq!((header.user_id, header.role_id), (4, 2));

    let program = String::from_utf8(bytecode.payload.clone()).unwrap();
    assert!(program.contains("function hello(greeting) {\n    log(\"one\");\n}"));
    assert!(program.contains("hello(\"hi\");"));
}

#[tokio::test]
async fn test_title_falls_back_to_default_lang_then_key() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(8, false, 0), launcher);

    let outcome = sup.run_script(RunRequest::new("hello").with_lang("es")).await.unwrap();
    assert_eq!(sup.get_task(outcome.task_id).await.unwrap().title, "Hello");
}

#[tokio::test]
async fn test_pool_exhaustion_fails_second_run() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(2, false, 0), launcher);

    sup.run_script(RunRequest::new("hello")).await.unwrap();
    let err = sup.run_script(RunRequest::new("hello")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::PoolExhausted));
    assert_eq!(sup.ports_in_use().await, 2);
}

#[tokio::test]
async fn test_restricted_cap_consumes_no_port() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(8, true, 2), launcher);

    for _ in 0..2 {
        let outcome = sup.run_script(RunRequest::new("hello")).await.unwrap();
        sup.update_status(StatusReport::new(outcome.task_id, TaskStatus::Active, ""))
            .await
            .unwrap();
    }
    assert_eq!(sup.ports_in_use().await, 4);

    let err = sup.run_script(RunRequest::new("hello")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::LimitExceeded { limit: 2 }));
    assert_eq!(sup.ports_in_use().await, 4);
}

#[tokio::test]
async fn test_finished_tasks_free_a_restricted_slot() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(8, true, 1), launcher);

    let first = sup.run_script(RunRequest::new("hello")).await.unwrap();
    assert!(sup.run_script(RunRequest::new("hello")).await.is_err());

    sup.update_status(StatusReport::new(first.task_id, TaskStatus::Finished, "done"))
        .await
        .unwrap();
    assert_eq!(sup.ports_in_use().await, 0);
    sup.run_script(RunRequest::new("hello")).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_respect_cap() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(16, true, 2), launcher);

    let runs: Vec<_> = (0..5)
        .map(|_| {
            let sup = sup.clone();
            tokio::spawn(async move { sup.run_script(RunRequest::new("hello")).await })
        })
        .collect();

    let mut started = 0;
    for run in runs {
        match run.await.unwrap() {
            Ok(_) => started += 1,
            Err(ExecutionError::LimitExceeded { .. }) => {}
            Err(other) => panic!("unexpected error {}", other),
        }
    }
    assert_eq!(started, 2);
    assert_eq!(sup.ports_in_use().await, 4);
}

#[tokio::test]
async fn test_terminal_status_is_absorbing() {
    let launcher = Arc::new(FakeLauncher::default());
    let broadcaster = Arc::new(StatusBroadcaster::new());
    let traces = Arc::new(MemoryTraceStore::new());
    let reg = registry();
    let sup = Arc::new(
        Supervisor::new(config(8, false, 0), reg, Arc::new(TextCompiler), launcher)
            .with_broadcaster(broadcaster.clone())
            .with_trace_store(traces.clone()),
    );
    let mut observer = broadcaster.add("observer").await;

    let outcome = sup.run_script(RunRequest::new("hello")).await.unwrap();
    sup.update_status(StatusReport::new(outcome.task_id, TaskStatus::Finished, "done"))
        .await
        .unwrap();

    let err = sup
        .update_status(StatusReport::new(outcome.task_id, TaskStatus::Active, "again"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::InvalidTransition {
            from: TaskStatus::Finished,
            to: TaskStatus::Active,
            ..
        }
    ));

    let task = sup.get_task(outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.message, "done");
    assert!(task.finished_at > 0);
    assert_eq!(traces.records().await.len(), 1);

    let Some(ObserverMessage::Text(text)) = observer.recv().await else {
        panic!("expected a status frame");
    };
    let frame: ObserverFrame = serde_json::from_str(&text).unwrap();
    assert_eq!(frame.status, Some(TaskStatus::Finished));
    assert!(observer.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_task_status_is_rejected() {
    let sup = supervisor(config(8, false, 0), Arc::new(FakeLauncher::default()));
    let err = sup
        .update_status(StatusReport::new(12345.into(), TaskStatus::Active, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_failures_release_ports() {
    let sup = supervisor(config(8, false, 0), Arc::new(FakeLauncher::default()));

    let err = sup.run_script(RunRequest::new("missing")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::ScriptNotFound(_)));

    let err = sup.run_script(RunRequest::new("fragment")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Unrunnable(_)));

    let err = sup.run_script(RunRequest::new("admin").with_identity(1, 2)).await.unwrap_err();
    assert!(matches!(err, ExecutionError::AccessDenied { role_id: 2, .. }));

    let err = sup.run_script(RunRequest::new("broken")).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Compile(_)));

    assert_eq!(sup.ports_in_use().await, 0);
    assert!(sup.list_tasks().await.is_empty());

    let failing = Arc::new(FakeLauncher {
        fail: true,
        ..Default::default()
    });
    let sup = supervisor(config(8, true, 1), failing);
    for _ in 0..3 {
        let err = sup.run_script(RunRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::HandoffIo(_)));
    }
    assert_eq!(sup.ports_in_use().await, 0);
    assert!(sup.list_tasks().await.is_empty());
}

/// Holds every launch open until the test lets it return
struct GatedLauncher {
    started: mpsc::UnboundedSender<TaskId>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl ChildLauncher for GatedLauncher {
    async fn launch(&self, header: &Header, _bytecode: &Bytecode) -> Result<ChildHandle, ExecutionError> {
        let _ = self.started.send(header.task_id);
        if let Some(gate) = self.gate.lock().await.take() {
            let _ = gate.await;
        }
        Ok(ChildHandle::detached())
    }
}

#[tokio::test]
async fn test_report_during_launch_is_applied() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (open_tx, open_rx) = oneshot::channel();
    let launcher = Arc::new(GatedLauncher {
        started: started_tx,
        gate: Mutex::new(Some(open_rx)),
    });
    let reg = registry();
    let sup = Arc::new(Supervisor::new(
        config(8, false, 0),
        reg,
        Arc::new(TextCompiler),
        launcher,
    ));

    let run = tokio::spawn({
        let sup = sup.clone();
        async move { sup.run_script(RunRequest::new("hello")).await }
    });

    let task_id = started_rx.recv().await.unwrap();
    assert_eq!(sup.get_task(task_id).await.unwrap().status, TaskStatus::Start);
    sup.update_status(StatusReport::new(task_id, TaskStatus::Active, "up"))
        .await
        .unwrap();

    open_tx.send(()).unwrap();
    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome.task_id, task_id);
    assert_eq!(sup.get_task(task_id).await.unwrap().status, TaskStatus::Active);
}

#[tokio::test]
async fn test_child_exit_without_report_marks_crash() {
    let launcher = Arc::new(FakeLauncher::default());
    let sup = supervisor(config(8, false, 0), launcher.clone());

    let outcome = sup.run_script(RunRequest::new("hello")).await.unwrap();
    sup.update_status(StatusReport::new(outcome.task_id, TaskStatus::Active, ""))
        .await
        .unwrap();

    let exit = launcher.exits.lock().await.pop().unwrap();
    exit.send(Some(3)).unwrap();

    let mut task = sup.get_task(outcome.task_id).await.unwrap();
    for _ in 0..50 {
        if task.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        task = sup.get_task(outcome.task_id).await.unwrap();
    }
    assert_eq!(task.status, TaskStatus::Crashed);
    assert!(task.message.contains("code 3"));
    assert_eq!(sup.ports_in_use().await, 0);
}

#[tokio::test]
async fn test_commands_need_a_live_task() {
    let sup = supervisor(config(8, false, 0), Arc::new(FakeLauncher::default()));

    let outcome = sup.run_script(RunRequest::new("hello")).await.unwrap();
    sup.update_status(StatusReport::new(outcome.task_id, TaskStatus::Terminated, ""))
        .await
        .unwrap();

    let err = sup.stop_task(outcome.task_id).await.unwrap_err();
    assert!(matches!(err, ExecutionError::TaskNotRunning(_)));

    let err = sup.send_command(7.into(), "ping", json!(null)).await.unwrap_err();
    assert!(matches!(err, ExecutionError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_generate_source_matches_run() {
    let sup = supervisor(config(8, false, 0), Arc::new(FakeLauncher::default()));
    let values = [("greeting".to_string(), "hey".to_string())].into_iter().collect();

    let source = sup.generate_source("hello", &values).unwrap();
    assert!(source.ends_with("(function run() {\n    hello(\"hey\");\n})();\n"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_package_gets_task_local_port() {
    use sprocket_execution::PackageManager;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let args = dir.path().join("args");
    let script = dir.path().join("helper");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$@\" > {}\necho '#4999'\n", args.display()),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let reg = registry();
    let sup = Arc::new(
        Supervisor::new(
            config(8, false, 0),
            reg,
            Arc::new(TextCompiler),
            Arc::new(FakeLauncher::default()),
        )
        .with_packages(PackageManager::new(dir.path(), std::time::Duration::from_secs(2))),
    );

    let outcome = sup.run_script(RunRequest::new("hello")).await.unwrap();
    let port = sup.start_package(outcome.task_id, "helper").await.unwrap();
    assert_eq!(port, 4999);

    let task = sup.get_task(outcome.task_id).await.unwrap();
    let recorded = std::fs::read_to_string(&args).unwrap();
    assert_eq!(
        recorded.trim(),
        format!("-t={} -p={}", task.id, task.local_port)
    );
}

#[tokio::test]
async fn test_package_needs_directory() {
    let sup = supervisor(config(8, false, 0), Arc::new(FakeLauncher::default()));
    let outcome = sup.run_script(RunRequest::new("hello")).await.unwrap();

    let err = sup.start_package(outcome.task_id, "helper").await.unwrap_err();
    assert!(matches!(err, ExecutionError::PackagesDisabled));
}
