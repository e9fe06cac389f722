//! Single-variant execution harness.
//!
//! The harness turns one `ModelVariant` plus one `Message` into a list of
//! annotations: it fetches the variant's code, wraps it in the in-sandbox
//! protocol (the `model` object with `annotate`/`raise`/`terminate`, the api
//! bindings and the console shim), runs the wrapper in a fresh V8 isolate on
//! a blocking thread and maps the structured result back into annotations,
//! counters and forwarded logs.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use rand::Rng;
use serde_json::Value;

use crate::common::config::AutomataConfig;
use crate::common::interface::{
    ExecutionLogsSink, ModelApiProvider, ModelLibrariesProvider, ModelProvider,
};
use crate::common::model::{Annotation, ExecutionModel, Message, ModelExecutionResult, ModelVariant};
use crate::errors::{ConfigurationError, Error, Result};
use crate::js_v8::{self, HostFunction};
use crate::utils::id::generate_id;
use crate::utils::time::now_ms;

use super::counters::ExecutionCounters;

/// Termination code assigned when the script completes without terminating.
pub const TERMINATION_SUCCESS: &str = "SUCCESS";
/// Termination code assigned when the script throws past its own handlers.
pub const TERMINATION_ERROR: &str = "ERROR";

pub struct ExecutionHarness {
    model_provider: Arc<dyn ModelProvider>,
    api_provider: Option<Arc<dyn ModelApiProvider>>,
    libraries_provider: Option<Arc<dyn ModelLibrariesProvider>>,
    logs_sink: Option<Arc<dyn ExecutionLogsSink>>,
    counters: Arc<ExecutionCounters>,
    config: AutomataConfig,
}

impl ExecutionHarness {
    pub fn new(
        model_provider: Arc<dyn ModelProvider>,
        counters: Arc<ExecutionCounters>,
        config: AutomataConfig,
    ) -> Self {
        Self {
            model_provider,
            api_provider: None,
            libraries_provider: None,
            logs_sink: None,
            counters,
            config,
        }
    }

    pub fn with_api_provider(mut self, provider: Arc<dyn ModelApiProvider>) -> Self {
        self.api_provider = Some(provider);
        self
    }

    pub fn with_libraries_provider(mut self, provider: Arc<dyn ModelLibrariesProvider>) -> Self {
        self.libraries_provider = Some(provider);
        self
    }

    pub fn with_logs_sink(mut self, sink: Arc<dyn ExecutionLogsSink>) -> Self {
        self.logs_sink = Some(sink);
        self
    }

    /// Execute one model variant against a message.
    ///
    /// Returns the annotations the script produced, including those written
    /// before an in-script failure. A variant with no stored code is a
    /// configuration error; a sandbox-level failure is a model error
    /// carrying the variant identity.
    pub async fn execute(
        &self,
        model_variant: &ModelVariant,
        message: &Message,
        safe_config: Value,
    ) -> Result<Vec<Annotation>> {
        let identity = model_variant.identity();
        let started = Instant::now();

        let (tenant_id, user_id) = message
            .user
            .as_ref()
            .map(|u| (u.tenant_id.as_str(), u.id.as_str()))
            .unwrap_or(("", ""));

        let code = self
            .model_provider
            .get_model_variant(&model_variant.model_id, &model_variant.variant.id, tenant_id, user_id)
            .await?;
        if code.code.trim().is_empty() {
            return Err(Error::from(ConfigurationError::MissingCode(identity.clone()))
                .for_model(identity));
        }

        let api = match &self.api_provider {
            Some(provider) => provider.get_api().await?,
            None => BTreeMap::new(),
        };
        let libs = match &self.libraries_provider {
            Some(provider) => provider.get_libraries().await?,
            None => BTreeMap::new(),
        };

        let execution = ExecutionModel {
            name: model_variant.model_id.clone(),
            version: model_variant.variant.id.clone(),
            config: safe_config,
            message: message.clone(),
            libs,
            logs: Vec::new(),
        };
        let model_json = serde_json::to_string(&execution)?;

        // Host bindings are keyed per execution so concurrent variants never
        // see each other's api surface.
        let execution_id = generate_id();
        let api_names: Vec<String> = api.keys().cloned().collect();
        let bindings: Vec<(String, HostFunction)> = api
            .into_iter()
            .map(|(name, callback)| (format!("{execution_id}:{name}"), callback))
            .collect();

        let source = build_wrapper(
            &model_json,
            &identity,
            &execution_id,
            &api_names,
            &code.code,
            self.config.disable_console,
        );

        debug!("executing model {identity}");
        let joined =
            tokio::task::spawn_blocking(move || js_v8::run_to_json(&source, bindings)).await;

        let raw = match joined {
            Ok(Ok(value)) => value,
            Ok(Err(sandbox_err)) => {
                let text = format!("failed to execute model {identity}: {sandbox_err}");
                return Err(self.fail_execution(text, identity).await);
            }
            Err(join_err) => {
                let text = format!("failed to execute model {identity}: {join_err}");
                return Err(self.fail_execution(text, identity).await);
            }
        };
        let result: ModelExecutionResult = serde_json::from_value(raw)?;

        let now = now_ms();
        self.counters.record_termination(&result.termination.code, now);
        for code in result.annotate.keys() {
            self.counters.record_annotation(code, now);
        }

        self.forward_logs(message, &result).await;

        debug!(
            "model {identity} terminated with {} in {}ms",
            result.termination.code,
            started.elapsed().as_millis()
        );

        Ok(prepare_annotations(&result, model_variant))
    }

    /// Record a sandbox-level failure: error counter keyed by the failure
    /// text, one (empty) sink invocation, model-tagged error back.
    async fn fail_execution(&self, text: String, identity: String) -> Error {
        self.counters.record_error(&text, now_ms());
        warn!("{text}");
        if let Some(sink) = &self.logs_sink {
            sink.consume(Vec::new()).await;
        }
        Error::model_failure(text, identity)
    }

    /// Forward captured logs to the sink, applying the message's sampling
    /// ratio clamped to (0, 1]; a non-positive or non-finite ratio falls back
    /// to 1 (always forward). Executions that terminated with `ERROR` bypass
    /// sampling so failure output is never lost. The sink is invoked once per
    /// execution, empty batch included.
    async fn forward_logs(&self, message: &Message, result: &ModelExecutionResult) {
        let sink = match &self.logs_sink {
            Some(sink) => sink,
            None => return,
        };

        let debug_flags = message.debug.unwrap_or_default();
        let mut forwarded = Vec::new();
        if debug_flags.capture && !result.logs.is_empty() {
            let failed = result.termination.code == TERMINATION_ERROR;
            let sampling = if debug_flags.sampling.is_finite() && debug_flags.sampling > 0.0 {
                debug_flags.sampling.min(1.0)
            } else {
                1.0
            };
            let sampled_in = rand::thread_rng().gen::<f64>() <= sampling;
            if failed || sampled_in {
                forwarded = result.logs.clone();
            }
        }
        sink.consume(forwarded).await;
    }
}

/// Map the annotate entries of an execution result into context annotations
/// (kind tag `a`). The first ':' in a code is normalized to '_' so codes stay
/// flat downstream. Raise entries stay on the execution result; they are
/// consumed by collaborators outside this engine, not attached to the
/// message.
fn prepare_annotations(result: &ModelExecutionResult, model_variant: &ModelVariant) -> Vec<Annotation> {
    let identity = model_variant.identity();
    let mode = model_variant.variant.mode;

    result
        .annotate
        .iter()
        .map(|(code, value)| Annotation {
            code: code.replacen(':', "_", 1),
            value: value.v.clone(),
            model: identity.clone(),
            kind: "a".to_string(),
            mode,
        })
        .collect()
}

/// Assemble the self-contained wrapper source around user code.
///
/// The wrapper defines the `model` object (parsed from a JSON literal, with
/// api forwards and the annotate/raise/terminate protocol), a console shim
/// that appends to `model.logs`, runs the user code inside a nested function
/// and returns `JSON.stringify` of the structured result. `terminate` is
/// write-once; an uncaught throw terminates with `ERROR` unless the script
/// already terminated itself.
fn build_wrapper(
    model_json: &str,
    identity: &str,
    execution_id: &str,
    api_names: &[String],
    user_code: &str,
    disable_console: bool,
) -> String {
    let mut source = String::with_capacity(user_code.len() + model_json.len() + 2048);
    source.push_str("(function(){\n");
    source.push_str("const model = ");
    source.push_str(model_json);
    source.push_str(";\n");

    source.push_str("model.api = {};\n");
    for name in api_names {
        // Key and name land inside string literals; JSON-encode to escape.
        let key = serde_json::to_string(&format!("{execution_id}:{name}"))
            .unwrap_or_else(|_| "\"\"".to_string());
        let prop = serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string());
        source.push_str(&format!(
            "model.api[{prop}] = function(){{ return __rust_host_call.apply(null, [{key}].concat(Array.prototype.slice.call(arguments))); }};\n"
        ));
    }

    source.push_str(concat!(
        "const __result = { termination: { code: \"\", reason: null }, annotate: {}, raise: {}, logs: [] };\n",
        "let __terminated = false;\n",
        "model.annotate = function(code, value){ __result.annotate[String(code)] = { v: value === undefined ? null : value }; };\n",
        "model.raise = function(code, value){ __result.raise[String(code)] = { v: value === undefined ? null : value }; };\n",
        "model.terminate = function(code, reason){\n",
        "  if (__terminated) return;\n",
        "  __terminated = true;\n",
        "  if (code === undefined || code === null || code === \"\") code = \"SUCCESS\";\n",
        "  __result.termination = { code: String(code), reason: reason === undefined ? null : reason };\n",
        "};\n",
        "const __fmt = function(args){\n",
        "  return Array.prototype.map.call(args, function(a){\n",
        "    if (typeof a === \"string\") return a;\n",
        "    try { return JSON.stringify(a); } catch (e) { return String(a); }\n",
        "  }).join(\" \");\n",
        "};\n",
    ));

    if disable_console {
        source.push_str(concat!(
            "const __noop = function(){};\n",
            "const console = { log: __noop, info: __noop, warn: __noop, error: __noop, debug: __noop };\n",
        ));
    } else {
        let source_tag =
            serde_json::to_string(identity).unwrap_or_else(|_| "\"\"".to_string());
        source.push_str(&format!(
            "const __log = function(){{ model.logs.push({{ t: Date.now(), s: {source_tag}, m: __fmt(arguments) }}); }};\n"
        ));
        source.push_str(
            "const console = { log: __log, info: __log, warn: __log, error: __log, debug: __log };\n",
        );
    }

    source.push_str("const __run = function(model, console){\n");
    source.push_str(user_code);
    source.push_str("\n};\n");
    source.push_str(concat!(
        "try {\n",
        "  __run(model, console);\n",
        "  if (!__terminated) { __result.termination = { code: \"SUCCESS\", reason: null }; __terminated = true; }\n",
        "} catch (err) {\n",
        "  model.terminate(\"ERROR\", err && err.message ? err.message : String(err));\n",
        "}\n",
        "__result.logs = model.logs;\n",
        "return JSON.stringify(__result);\n",
        "})()",
    ));
    source
}
