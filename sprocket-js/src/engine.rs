use boa_engine::{Context, Script, Source};
use serde_json::json;
use sprocket_core::{Bytecode, Compiler, EngineError, ExecutionEnv, Executor};
use tracing::debug;

use crate::conversion::convert_js_result_to_json;
use crate::JsExecutionError;

/// Engine tag carried by bytecode produced by [`JsCompiler`]
pub const ENGINE_TAG: &str = "javascript";

/// Syntax-checks program text and packages it as bytecode
#[derive(Debug, Clone, Copy, Default)]
pub struct JsCompiler;

impl Compiler for JsCompiler {
    fn compile(&self, source: &str) -> Result<Bytecode, EngineError> {
        let mut context = Context::default();
        Script::parse(Source::from_bytes(source), None, &mut context)
            .map_err(|e| JsExecutionError::CompilationError(e.to_string()))?;

        debug!("Compiled {} bytes of JavaScript", source.len());
        Ok(Bytecode::new(ENGINE_TAG, source.as_bytes().to_vec()))
    }
}

/// Runs JavaScript bytecode in a fresh Boa context
///
/// The run environment is visible to the program as the global `__env`
/// object (`task_id`, `name`, `lang`, `data`). The value of the last
/// expression statement is returned as JSON.
#[derive(Debug, Clone, Default)]
pub struct JsExecutor {
    loop_iteration_limit: Option<u64>,
}

impl JsExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort programs whose loops iterate more than `limit` times
    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = Some(limit);
        self
    }

    fn execute(&self, bytecode: &Bytecode, env: &ExecutionEnv) -> Result<serde_json::Value, JsExecutionError> {
        if bytecode.engine != ENGINE_TAG {
            return Err(JsExecutionError::UnsupportedEngine(bytecode.engine.clone()));
        }

        let source = std::str::from_utf8(&bytecode.payload)
            .map_err(|e| JsExecutionError::InputError(format!("Program is not UTF-8: {}", e)))?;

        let mut context = Context::default();
        if let Some(limit) = self.loop_iteration_limit {
            context.runtime_limits_mut().set_loop_iteration_limit(limit);
        }

        let env_json = json!({
            "task_id": env.task_id.as_u32(),
            "name": env.name,
            "lang": env.lang,
            "data": env.data,
        });
        context
            .eval(Source::from_bytes(&format!("var __env = {};", env_json)))
            .map_err(|e| JsExecutionError::InputError(e.to_string()))?;

        let script = Script::parse(Source::from_bytes(source), None, &mut context)
            .map_err(|e| JsExecutionError::CompilationError(e.to_string()))?;

        debug!("Running task {} ({})", env.task_id, env.name);
        let value = script
            .evaluate(&mut context)
            .map_err(|e| JsExecutionError::RuntimeError(e.to_string()))?;

        convert_js_result_to_json(&mut context, value)
    }
}

impl Executor for JsExecutor {
    fn run(&self, bytecode: &Bytecode, env: &ExecutionEnv) -> Result<serde_json::Value, EngineError> {
        Ok(self.execute(bytecode, env)?)
    }
}
