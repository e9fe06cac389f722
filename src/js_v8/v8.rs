//! A small wrapper around rusty_v8 for running model scripts in isolation.
//!
//! This module owns a V8 isolate and a single context per engine. It provides
//! helpers to:
//! - initialize the V8 platform once per process
//! - evaluate a script and extract its completion value as a JSON string
//! - expose registered Rust callbacks to scripts through a single
//!   `__rust_host_call(key, ...)` dispatcher
//! - surface JS exceptions as Rust errors with message text
//!
//! Isolation model: every execution gets a fresh isolate and context, created
//! and dropped on the calling thread. Scripts see only what the caller's
//! wrapper source defines plus the host-call dispatcher; there is no ambient
//! process, filesystem, or network access in a plain V8 context.
use std::collections::HashMap;
use std::sync::Once;
use std::sync::{Arc, Mutex};

use once_cell::sync::{Lazy, OnceCell};
use serde_json::Value as JsonValue;
use v8;

use crate::errors::{BoxError, SandboxError};

static INIT: Once = Once::new();
static PLATFORM: OnceCell<v8::SharedRef<v8::Platform>> = OnceCell::new();
static HOST_REG: Lazy<Mutex<HashMap<String, HostFunction>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A Rust callback exposed to scripts. Receives the JS arguments after the
/// registry key; returns a value mapped back into JS.
pub type HostFunction =
    Arc<dyn Fn(&[JsValue]) -> Result<JsReturn, BoxError> + Send + Sync + 'static>;

fn init_v8() {
    INIT.call_once(|| {
        // V8's pkey-based code protection requires every JS thread to inherit
        // the PKRU state of the initializing thread. Executions run on
        // short-lived spawn_blocking threads created from arbitrary parents,
        // so pkey protection must be off or later isolates fault on PKU
        // hardware when the first thread is gone.
        v8::V8::set_flags_from_string("--no-memory-protection-keys");
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform.clone());
        v8::V8::initialize();
        let _ = PLATFORM.set(platform);
    });
}

fn host_registry() -> &'static Mutex<HashMap<String, HostFunction>> {
    &HOST_REG
}

/// Registers host functions for the lifetime of one execution and removes
/// them again on drop, so concurrently running executions never observe each
/// other's API surface.
pub struct ScopedHostFns {
    keys: Vec<String>,
}

impl ScopedHostFns {
    pub fn register<I>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, HostFunction)>,
    {
        let mut keys = Vec::new();
        if let Ok(mut registry) = host_registry().lock() {
            for (key, callback) in bindings {
                registry.insert(key.clone(), callback);
                keys.push(key);
            }
        }
        Self { keys }
    }
}

impl Drop for ScopedHostFns {
    fn drop(&mut self) {
        if let Ok(mut registry) = host_registry().lock() {
            for key in &self.keys {
                registry.remove(key);
            }
        }
    }
}

/// Basic JS argument types supported for host calls.
#[derive(Debug, Clone)]
pub enum JsValue {
    Str(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::Str(s.to_owned())
    }
}
impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::Str(s)
    }
}
impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}
impl From<i64> for JsValue {
    fn from(n: i64) -> Self {
        JsValue::Number(n as f64)
    }
}
impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Bool(b)
    }
}

/// Return value mapped from a host callback into V8.
#[derive(Debug, Clone)]
pub enum JsReturn {
    /// Plain string.
    Text(String),
    /// Numeric result (f64).
    Number(f64),
    /// Boolean result.
    Bool(bool),
    /// JSON value, materialized as an object/array inside the script.
    Json(JsonValue),
}

fn to_jsvalue(scope: &mut v8::HandleScope, v: v8::Local<v8::Value>) -> Option<JsValue> {
    if v.is_boolean() {
        return Some(JsValue::Bool(v.boolean_value(scope)));
    }
    if v.is_number() {
        return v.number_value(scope).map(JsValue::Number);
    }
    if v.is_string() {
        let s = v.to_string(scope)?;
        return Some(JsValue::Str(s.to_rust_string_lossy(scope)));
    }
    None
}

fn from_jsreturn<'s>(scope: &mut v8::HandleScope<'s>, r: JsReturn) -> v8::Local<'s, v8::Value> {
    match r {
        JsReturn::Text(s) => v8::String::new(scope, &s).unwrap().into(),
        JsReturn::Number(n) => v8::Number::new(scope, n).into(),
        JsReturn::Bool(b) => v8::Boolean::new(scope, b).into(),
        JsReturn::Json(v) => {
            let s = serde_json::to_string(&v).unwrap_or_else(|_| "null".to_string());
            if let Some(js_s) = v8::String::new(scope, &s) {
                if let Some(parsed) = v8::json::parse(scope, js_s) {
                    return parsed;
                }
            }
            v8::String::new(scope, &s).unwrap().into()
        }
    }
}

fn host_fn_dispatch(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    // First argument is the registry key string.
    if args.length() == 0 {
        rv.set(from_jsreturn(scope, JsReturn::Text("missing key".into())));
        return;
    }
    let key_val = args.get(0);
    let key = match key_val.to_string(scope) {
        Some(s) => s.to_rust_string_lossy(scope),
        None => {
            rv.set(from_jsreturn(scope, JsReturn::Text("invalid key".into())));
            return;
        }
    };

    let mut rust_args: Vec<JsValue> = Vec::with_capacity(args.length() as usize);
    for i in 1..args.length() {
        let v = args.get(i);
        if let Some(jv) = to_jsvalue(scope, v) {
            rust_args.push(jv);
        }
    }

    let callback = host_registry()
        .lock()
        .ok()
        .and_then(|m| m.get(&key).cloned());
    let out = match callback {
        Some(callback) => callback(&rust_args)
            .unwrap_or_else(|e| JsReturn::Text(format!("callback error: {}", e))),
        None => JsReturn::Text(format!("no host callback for key: {key}")),
    };
    rv.set(from_jsreturn(scope, out));
}

fn exception_text(tc: &mut v8::TryCatch<v8::HandleScope>) -> String {
    if let Some(message) = tc.message() {
        return message.get(tc).to_rust_string_lossy(tc);
    }
    if let Some(exception) = tc.exception() {
        if let Some(s) = exception.to_string(tc) {
            return s.to_rust_string_lossy(tc);
        }
    }
    "unknown exception".to_string()
}

pub struct V8Engine {
    isolate: v8::OwnedIsolate,
    context: v8::Global<v8::Context>,
}

impl V8Engine {
    /// Create a new engine with a fresh isolate and context. The host-call
    /// dispatcher is installed immediately so wrapper sources can bind
    /// `__rust_host_call` forwards without further setup.
    pub fn new() -> Result<Self, SandboxError> {
        init_v8();

        let mut isolate = v8::Isolate::new(Default::default());

        let context_global = {
            let mut hs = v8::HandleScope::new(&mut isolate);
            let context = v8::Context::new(&mut hs, Default::default());
            v8::Global::new(&mut hs, context)
        };

        let mut engine = Self {
            isolate,
            context: context_global,
        };
        engine.install_host_dispatch()?;
        Ok(engine)
    }

    fn install_host_dispatch(&mut self) -> Result<(), SandboxError> {
        let mut hs = v8::HandleScope::new(&mut self.isolate);
        let local_ctx = v8::Local::new(&mut hs, &self.context);
        let mut cs = v8::ContextScope::new(&mut hs, local_ctx);

        let global = cs.get_current_context().global(&mut cs);
        let key = v8::String::new(&mut cs, "__rust_host_call")
            .ok_or_else(|| SandboxError::Setup("alloc dispatcher name failed".into()))?;
        let tmpl = v8::FunctionTemplate::new(&mut cs, host_fn_dispatch);
        let f = tmpl
            .get_function(&mut cs)
            .ok_or_else(|| SandboxError::Setup("create __rust_host_call failed".into()))?;
        if global.set(&mut cs, key.into(), f.into()).is_none() {
            return Err(SandboxError::Setup("set __rust_host_call failed".into()));
        }
        Ok(())
    }

    /// Compile and run a script, returning its completion value as a string.
    ///
    /// The completion value must be a string (the wrapper protocol returns
    /// `JSON.stringify(...)`); objects are stringified as a fallback.
    pub fn eval_to_string(&mut self, source: &str) -> Result<String, SandboxError> {
        let mut hs = v8::HandleScope::new(&mut self.isolate);
        let local_ctx = v8::Local::new(&mut hs, &self.context);
        let mut cs = v8::ContextScope::new(&mut hs, local_ctx);
        let mut tc = v8::TryCatch::new(&mut cs);

        let code = v8::String::new(&mut tc, source)
            .ok_or_else(|| SandboxError::Setup("failed to create v8 string from source".into()))?;

        let script = match v8::Script::compile(&mut tc, code, None) {
            Some(script) => script,
            None => {
                let text = exception_text(&mut tc);
                return Err(SandboxError::Compile(text));
            }
        };

        let result = match script.run(&mut tc) {
            Some(result) => result,
            None => {
                let text = exception_text(&mut tc);
                return Err(SandboxError::Run(text));
            }
        };

        if result.is_string() {
            let s = result
                .to_string(&mut tc)
                .ok_or(SandboxError::NoResult)?;
            return Ok(s.to_rust_string_lossy(&mut tc));
        }
        if result.is_object() || result.is_array() {
            if let Some(s) = v8::json::stringify(&mut tc, result) {
                return Ok(s.to_rust_string_lossy(&mut tc));
            }
        }
        Err(SandboxError::NoResult)
    }
}

/// Run a wrapper source with a scoped set of host bindings and parse its
/// string completion value as JSON. Blocking; callers on an async runtime
/// should dispatch through `spawn_blocking`.
pub fn run_to_json<I>(source: &str, host_fns: I) -> Result<JsonValue, SandboxError>
where
    I: IntoIterator<Item = (String, HostFunction)>,
{
    let _bindings = ScopedHostFns::register(host_fns);
    let mut engine = V8Engine::new()?;
    let raw = engine.eval_to_string(source)?;
    serde_json::from_str(&raw).map_err(|e| SandboxError::InvalidResult(e.to_string().into()))
}
