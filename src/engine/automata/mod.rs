//! The `Automata` orchestrator: one pass turns an incoming message into an
//! annotated message by selecting eligible model variants, executing them in
//! parallel sandboxes and folding their annotations back into the context.
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use rand::Rng;
use serde_json::Value;

use crate::common::annotator::ProcessorAnnotator;
use crate::common::config::AutomataConfig;
use crate::common::interface::{
    ExecutionLogsSink, ModelApiProvider, ModelLibrariesProvider, ModelProvider,
};
use crate::common::model::{
    Annotation, Context, DebugFlags, Message, ModelVariant, ProcessingFail, ProcessingMode,
    UserRef,
};
use crate::common::pattern::match_any_pattern;
use crate::errors::{InputError, Result};
use crate::utils::id::generate_id;
use crate::utils::time::now_ms;

use super::counters::{ExecutionCounters, ExecutionCountersReport};
use super::harness::ExecutionHarness;

#[cfg(test)]
mod tests;

/// Message-annotation engine instance.
///
/// Cheap to clone; clones share the harness and the counters.
#[derive(Clone)]
pub struct Automata {
    /// Processor instance id recorded on every message this engine touches.
    instance_id: String,
    harness: Arc<ExecutionHarness>,
    model_provider: Arc<dyn ModelProvider>,
    counters: Arc<ExecutionCounters>,
    config: AutomataConfig,
}

impl Automata {
    pub fn create(
        model_provider: Arc<dyn ModelProvider>,
        api_provider: Option<Arc<dyn ModelApiProvider>>,
        libraries_provider: Option<Arc<dyn ModelLibrariesProvider>>,
        logs_sink: Option<Arc<dyn ExecutionLogsSink>>,
        config: AutomataConfig,
    ) -> Self {
        let counters = Arc::new(ExecutionCounters::new());
        let mut harness = ExecutionHarness::new(model_provider.clone(), counters.clone(), config);
        if let Some(provider) = api_provider {
            harness = harness.with_api_provider(provider);
        }
        if let Some(provider) = libraries_provider {
            harness = harness.with_libraries_provider(provider);
        }
        if let Some(sink) = logs_sink {
            harness = harness.with_logs_sink(sink);
        }

        Self {
            instance_id: generate_id(),
            harness: Arc::new(harness),
            model_provider,
            counters,
            config,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Rolling execution counters of this engine instance, rolled over to the
    /// current time.
    pub fn get_counters(&self) -> ExecutionCountersReport {
        self.counters.report(now_ms())
    }

    /// Process one message: annotate begin/end timestamps, resolve eligible
    /// variants, run the runtime batch (and the test batch when enabled) and
    /// attach the produced annotations to the message context.
    ///
    /// A pre-existing context is kept but its annotations and processing
    /// records are reset, so reprocessing starts from a clean slate.
    pub async fn process(
        &self,
        mut message: Message,
        originator: &str,
        user: &str,
        safe_config: Value,
    ) -> Result<Message> {
        if message.code.trim().is_empty() {
            return Err(InputError::MissingCode.into());
        }

        match message.context.as_mut() {
            Some(context) => {
                context.annotations.clear();
                context.processors.clear();
            }
            None => {
                message.context = Some(Context::new(generate_id(), originator));
            }
        }
        if message.user.is_none() {
            message.user = Some(UserRef {
                id: user.to_string(),
                tenant_id: originator.to_string(),
            });
        }
        if message.debug.is_none() {
            message.debug = Some(DebugFlags::default());
        }

        info!(
            "processing message {} ({})",
            message.id().unwrap_or("?"),
            message.code
        );
        ProcessorAnnotator::annotate(&mut message, &self.instance_id, Some(now_ms()), None)?;

        let (tenant_id, user_id) = message
            .user
            .as_ref()
            .map(|u| (u.tenant_id.as_str(), u.id.as_str()))
            .unwrap_or(("", ""));
        let infos = self
            .model_provider
            .get_models_info(tenant_id, user_id)
            .await?;
        let variants: Vec<ModelVariant> = infos.iter().flat_map(|info| info.flatten()).collect();

        let mut annotations = Vec::new();
        let mut fails = Vec::new();

        let runtime = filter_variants(&variants, &message, ProcessingMode::Runtime);
        let (produced, failed) = self
            .execute_variants(runtime, &message, &safe_config)
            .await;
        annotations.extend(produced);
        fails.extend(failed);

        if self.config.test_mode_enabled {
            let test = filter_variants(&variants, &message, ProcessingMode::Test);
            let (produced, failed) = self.execute_variants(test, &message, &safe_config).await;
            annotations.extend(produced);
            fails.extend(failed);
        }

        for fail in &fails {
            warn!("model {} failed: {}", fail.model, fail.message);
        }

        ProcessorAnnotator::annotate(&mut message, &self.instance_id, None, Some(now_ms()))?;
        if let Some(context) = message.context.as_mut() {
            context.annotations = annotations;
        }
        Ok(message)
    }

    /// Run one batch of variants concurrently. Each variant first passes its
    /// sampling gate (a uniform draw in [0, 100) against its ratio; a
    /// non-finite ratio always dispatches). Failures are isolated: a failed
    /// sibling never cancels the rest of the batch.
    async fn execute_variants(
        &self,
        variants: Vec<ModelVariant>,
        message: &Message,
        safe_config: &Value,
    ) -> (Vec<Annotation>, Vec<ProcessingFail>) {
        let mut dispatched = Vec::new();
        {
            let mut rng = rand::thread_rng();
            for variant in variants {
                let ratio = variant.variant.ratio;
                if !ratio.is_finite() || rng.gen_range(0.0..100.0) <= ratio {
                    dispatched.push(variant);
                } else {
                    debug!("model {} sampled out", variant.identity());
                }
            }
        }

        let tasks = dispatched.into_iter().map(|variant| {
            let harness = self.harness.clone();
            let message = message.clone();
            let safe_config = safe_config.clone();
            let identity = variant.identity();
            let handle = tokio::spawn(async move {
                harness.execute(&variant, &message, safe_config).await
            });
            (identity, handle)
        });

        let (identities, handles): (Vec<_>, Vec<_>) = tasks.unzip();
        let outcomes = join_all(handles).await;

        let mut annotations = Vec::new();
        let mut fails = Vec::new();
        for (identity, outcome) in identities.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(produced)) => annotations.extend(produced),
                Ok(Err(err)) => fails.push(ProcessingFail {
                    message: err.to_string(),
                    model: err.model().unwrap_or(&identity).to_string(),
                }),
                Err(join_err) => fails.push(ProcessingFail {
                    message: format!("execution task aborted: {join_err}"),
                    model: identity,
                }),
            }
        }
        (annotations, fails)
    }
}

/// Select the variants eligible for a message in the given mode.
///
/// A variant qualifies when its mode matches, its ratio is positive or
/// non-finite (sampling itself happens at dispatch), its channel allow-list
/// is empty or contains the message channel (a message without a channel
/// passes every allow-list), and its event patterns match the message code
/// (an empty pattern set matches every event).
pub(crate) fn filter_variants(
    variants: &[ModelVariant],
    message: &Message,
    mode: ProcessingMode,
) -> Vec<ModelVariant> {
    variants
        .iter()
        .filter(|mv| mv.variant.mode == mode)
        .filter(|mv| {
            let ratio = mv.variant.ratio;
            !ratio.is_finite() || ratio > 0.0
        })
        .filter(|mv| {
            if mv.variant.channels.is_empty() {
                return true;
            }
            match message.channel() {
                Some(channel) => mv.variant.channels.iter().any(|c| c == channel),
                None => true,
            }
        })
        .filter(|mv| match_any_pattern(&message.code, &mv.variant.events, true))
        .cloned()
        .collect()
}
