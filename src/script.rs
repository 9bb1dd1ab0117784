//! Script engine for dynamic responses.
//!
//! Endpoint scripts are written in [Rhai](https://rhai.rs). A single engine
//! holds the registered helpers; each evaluation borrows a scope from a pool
//! and returns it cleared.
//!
//! # Bindings
//!
//! | Name | Value |
//! |------|-------|
//! | `req`, `request` | the [`RequestSnapshot`] |
//! | `uuid()` | random UUID-v4-shaped string |
//! | `now()` | current UTC time, RFC 3339 |
//! | `timestamp()` | current epoch seconds |
//! | `console::log(..)`, `print`, `debug` | write to the server log |
//!
//! `console::log` takes one to three values, or an array of any length:
//! `console::log(["a", 1, true, req.path])`.
//! | endpoint `context` keys | bound as top-level variables |
//!
//! # Example
//!
//! ```rhai
//! let id = req.params.id;
//! #{ body: #{ id: id, createdAt: now() }, statusCode: 201, headers: #{ "X-Id": id } }
//! ```

use crate::request::RequestSnapshot;
use axum::http::StatusCode;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Module, Scope, AST};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

const LOG_TARGET: &str = "stubber::script";

/// Errors that abort a scripted request.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Runtime(String),

    #[error("failed to bind `{name}`: {message}")]
    Binding { name: String, message: String },

    #[error("script result is not JSON-serializable: {0}")]
    Serialization(String),

    #[error("invalid status code returned by script: {0}")]
    InvalidStatus(i64),
}

/// Limits applied to the engine and the context pool.
#[derive(Debug, Clone)]
pub struct ScriptLimits {
    /// Operation budget per evaluation (0 = unlimited)
    pub max_operations: u64,
    /// Idle contexts kept for reuse
    pub max_idle_contexts: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_idle_contexts: 64,
        }
    }
}

/// A script compiled at startup.
///
/// Compilation failures are kept so that every request to the endpoint
/// reports them.
#[derive(Debug)]
pub struct PreparedScript {
    ast: Result<AST, String>,
}

impl PreparedScript {
    /// Whether the script compiled.
    pub fn is_valid(&self) -> bool {
        self.ast.is_ok()
    }

    /// The compilation error, if any.
    pub fn error(&self) -> Option<&str> {
        self.ast.as_ref().err().map(String::as_str)
    }
}

/// Outcome of one script evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptResult {
    /// Response body
    pub body: serde_json::Value,
    /// Status override, if the script supplied a non-zero one
    pub status: Option<StatusCode>,
    /// Header overwrites
    pub headers: HashMap<String, String>,
}

impl ScriptResult {
    fn from_dynamic(value: Dynamic) -> Result<Self, ScriptError> {
        if value.is_unit() {
            return Ok(Self::default());
        }

        if let Some(map) = value.read_lock::<Map>() {
            if let Some(body) = map.get("body") {
                return Ok(Self {
                    body: to_json(body)?,
                    status: map.get("statusCode").map(status_override).transpose()?.flatten(),
                    headers: map.get("headers").map(string_headers).unwrap_or_default(),
                });
            }
        }

        Ok(Self {
            body: to_json(&value)?,
            ..Self::default()
        })
    }
}

fn to_json(value: &Dynamic) -> Result<serde_json::Value, ScriptError> {
    rhai::serde::from_dynamic(value).map_err(|e| ScriptError::Serialization(e.to_string()))
}

/// Read `statusCode`; non-numeric values are ignored and zero means unset.
fn status_override(value: &Dynamic) -> Result<Option<StatusCode>, ScriptError> {
    let code = if let Ok(code) = value.as_int() {
        code
    } else if let Ok(code) = value.as_float() {
        code as i64
    } else {
        return Ok(None);
    };

    if code == 0 {
        return Ok(None);
    }
    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .map(Some)
        .ok_or(ScriptError::InvalidStatus(code))
}

/// Keep only string-valued headers.
fn string_headers(value: &Dynamic) -> HashMap<String, String> {
    let Some(map) = value.read_lock::<Map>() else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(name, value)| {
            value
                .clone()
                .into_string()
                .ok()
                .map(|value| (name.to_string(), value))
        })
        .collect()
}

/// Pooled per-evaluation state.
#[derive(Default)]
struct ScriptContext {
    scope: Scope<'static>,
}

impl ScriptContext {
    fn reset(&mut self) {
        self.scope.clear();
    }
}

/// A context borrowed from the pool; returned on drop.
struct PooledContext<'a> {
    runtime: &'a ScriptRuntime,
    context: ScriptContext,
}

impl PooledContext<'_> {
    fn scope(&mut self) -> &mut Scope<'static> {
        &mut self.context.scope
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        // An empty scope is left behind; the guard is never used after drop.
        let context = std::mem::take(&mut self.context);
        self.runtime.release(context);
    }
}

/// Script runtime shared by all request handlers.
pub struct ScriptRuntime {
    engine: Engine,
    idle: Mutex<Vec<ScriptContext>>,
    max_idle: usize,
}

impl ScriptRuntime {
    /// Create a runtime with the given limits.
    pub fn new(limits: ScriptLimits) -> Self {
        Self {
            engine: build_engine(&limits),
            idle: Mutex::new(Vec::new()),
            max_idle: limits.max_idle_contexts,
        }
    }

    /// Compile a script for later execution.
    pub fn prepare(&self, source: &str) -> PreparedScript {
        PreparedScript {
            ast: self.engine.compile(source).map_err(|e| e.to_string()),
        }
    }

    /// Evaluate a prepared script against one request.
    pub fn execute(
        &self,
        script: &PreparedScript,
        request: &RequestSnapshot,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<ScriptResult, ScriptError> {
        let ast = script
            .ast
            .as_ref()
            .map_err(|e| ScriptError::Parse(e.clone()))?;

        let mut pooled = self.acquire();
        let scope = pooled.scope();

        let req = bind("req", request)?;
        scope.push("req", req.clone());
        scope.push("request", req);

        // Pushed last so they shadow the request bindings.
        for (name, value) in context {
            scope.push(name.clone(), bind(name, value)?);
        }

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(scope, ast)
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;

        ScriptResult::from_dynamic(value)
    }

    /// Number of idle contexts in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn acquire(&self) -> PooledContext<'_> {
        let mut context = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        context.reset();

        PooledContext {
            runtime: self,
            context,
        }
    }

    fn release(&self, mut context: ScriptContext) {
        context.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(context);
        }
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new(ScriptLimits::default())
    }
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

fn bind<T: serde::Serialize>(name: &str, value: &T) -> Result<Dynamic, ScriptError> {
    rhai::serde::to_dynamic(value).map_err(|e| ScriptError::Binding {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn build_engine(limits: &ScriptLimits) -> Engine {
    let mut engine = Engine::new();

    // Sandbox: no module loading from disk, no eval.
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");

    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 32);

    engine.on_print(|text| info!(target: LOG_TARGET, "{}", text));
    engine.on_debug(|text, _source, pos| debug!(target: LOG_TARGET, position = %pos, "{}", text));

    engine.register_fn("uuid", generate_uuid);
    engine.register_fn("now", now_rfc3339);
    engine.register_fn("timestamp", unix_timestamp);
    engine.register_static_module("console", console_module().into());

    engine
}

// Helpers exposed to scripts

fn console_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("log", console_log);
    module.set_native_fn("log", console_log2);
    module.set_native_fn("log", console_log3);
    module.set_native_fn("log", console_log_array);
    module
}

fn log_line(values: &[Dynamic]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn log_values(values: &[Dynamic]) {
    info!(target: LOG_TARGET, "{}", log_line(values));
}

fn console_log(a: Dynamic) -> Result<(), Box<EvalAltResult>> {
    log_values(&[a]);
    Ok(())
}

fn console_log2(a: Dynamic, b: Dynamic) -> Result<(), Box<EvalAltResult>> {
    log_values(&[a, b]);
    Ok(())
}

fn console_log3(a: Dynamic, b: Dynamic, c: Dynamic) -> Result<(), Box<EvalAltResult>> {
    log_values(&[a, b, c]);
    Ok(())
}

fn console_log_array(values: Array) -> Result<(), Box<EvalAltResult>> {
    log_values(&values);
    Ok(())
}

/// Random UUID-v4-shaped identifier. Unique enough for mock data only.
fn generate_uuid() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffff_ffff_ffff,
    )
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
