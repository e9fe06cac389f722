use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use crate::common::model::{Annotation, ModelCode, ModelInfo, Variant};
use crate::errors::{ConfigurationError, Error};

use super::*;

struct InMemoryCatalog {
    infos: Vec<ModelInfo>,
    code: HashMap<(String, String), String>,
}

impl InMemoryCatalog {
    fn new() -> Self {
        Self {
            infos: Vec::new(),
            code: HashMap::new(),
        }
    }

    fn with_model(mut self, info: ModelInfo, codes: &[(&str, &str)]) -> Self {
        for (variant_id, code) in codes {
            self.code.insert(
                (info.id.clone(), variant_id.to_string()),
                code.to_string(),
            );
        }
        self.infos.push(info);
        self
    }
}

#[async_trait]
impl ModelProvider for InMemoryCatalog {
    async fn get_models_info(&self, _tenant_id: &str, _user_id: &str) -> Result<Vec<ModelInfo>> {
        Ok(self.infos.clone())
    }

    async fn get_model_variant(
        &self,
        model_id: &str,
        variant_id: &str,
        _tenant_id: &str,
        _user_id: &str,
    ) -> Result<ModelCode> {
        let key = (model_id.to_string(), variant_id.to_string());
        match self.code.get(&key) {
            Some(code) => Ok(ModelCode { code: code.clone() }),
            None => Err(Error::from(ConfigurationError::MissingCode(format!(
                "{model_id}@v{variant_id}"
            )))),
        }
    }
}

fn engine(catalog: InMemoryCatalog, config: AutomataConfig) -> Automata {
    Automata::create(Arc::new(catalog), None, None, None, config)
}

fn incoming() -> Message {
    Message::new("EVT_PATIENT_ADMITTED").with_user(UserRef {
        id: "subject-1".to_string(),
        tenant_id: "tenant-1".to_string(),
    })
}

fn annotations(message: &Message) -> &[Annotation] {
    &message.context.as_ref().unwrap().annotations
}

mod variant_resolution {
    use super::*;

    fn as_model_variant(variant: Variant) -> ModelVariant {
        ModelVariant {
            model_id: "risk".to_string(),
            variant,
        }
    }

    #[test]
    fn mode_must_match() {
        let variants = vec![
            as_model_variant(Variant::new("1", ProcessingMode::Runtime)),
            as_model_variant(Variant::new("2", ProcessingMode::Test)),
        ];
        let message = incoming();

        let runtime = filter_variants(&variants, &message, ProcessingMode::Runtime);
        assert_eq!(runtime.len(), 1);
        assert_eq!(runtime[0].variant.id, "1");
    }

    #[test]
    fn zero_ratio_excludes_a_variant_but_nan_keeps_it() {
        let variants = vec![
            as_model_variant(Variant::new("off", ProcessingMode::Runtime).with_ratio(0.0)),
            as_model_variant(Variant::new("unset", ProcessingMode::Runtime)),
            as_model_variant(Variant::new("half", ProcessingMode::Runtime).with_ratio(50.0)),
        ];
        let message = incoming();

        let selected = filter_variants(&variants, &message, ProcessingMode::Runtime);
        let ids: Vec<&str> = selected.iter().map(|mv| mv.variant.id.as_str()).collect();
        assert_eq!(ids, ["unset", "half"]);
    }

    #[test]
    fn channel_allow_list_filters_on_the_message_channel() {
        let variants = vec![
            as_model_variant(
                Variant::new("a-only", ProcessingMode::Runtime).with_channels(["chanA"]),
            ),
            as_model_variant(
                Variant::new("b-only", ProcessingMode::Runtime).with_channels(["chanB"]),
            ),
            as_model_variant(Variant::new("any", ProcessingMode::Runtime)),
        ];
        let message = incoming().with_context(Context::new("m1", "chanA"));

        let selected = filter_variants(&variants, &message, ProcessingMode::Runtime);
        let ids: Vec<&str> = selected.iter().map(|mv| mv.variant.id.as_str()).collect();
        assert_eq!(ids, ["a-only", "any"]);
    }

    #[test]
    fn channel_restrictions_only_apply_when_the_message_has_a_channel() {
        let variants = vec![as_model_variant(
            Variant::new("a-only", ProcessingMode::Runtime).with_channels(["chanA"]),
        )];
        // No context, so no channel to filter on.
        let message = incoming();
        assert_eq!(
            filter_variants(&variants, &message, ProcessingMode::Runtime).len(),
            1
        );
    }

    #[test]
    fn event_patterns_filter_on_the_message_code() {
        let variants = vec![
            as_model_variant(
                Variant::new("admit", ProcessingMode::Runtime).with_events("EVT_PATIENT_AD.*"),
            ),
            as_model_variant(
                Variant::new("discharge", ProcessingMode::Runtime)
                    .with_events("EVT_PATIENT_DISCHARGED"),
            ),
            as_model_variant(Variant::new("all", ProcessingMode::Runtime).with_events("")),
        ];
        let message = incoming();

        let selected = filter_variants(&variants, &message, ProcessingMode::Runtime);
        let ids: Vec<&str> = selected.iter().map(|mv| mv.variant.id.as_str()).collect();
        assert_eq!(ids, ["admit", "all"]);
    }
}

#[tokio::test]
async fn process_annotates_the_message_end_to_end() {
    let catalog = InMemoryCatalog::new().with_model(
        ModelInfo::new("risk").with_variant(
            Variant::new("1", ProcessingMode::Runtime)
                .with_ratio(100.0)
                .with_channels(["chanA"]),
        ),
        &[("1", "model.annotate('flag', 'yes');")],
    );
    let automata = engine(catalog, AutomataConfig::default());

    let processed = automata
        .process(incoming(), "chanA", "subject-1", Value::Null)
        .await
        .unwrap();

    let produced = annotations(&processed);
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].code, "flag");
    assert_eq!(produced[0].value, json!("yes"));
    assert_eq!(produced[0].model, "risk@v1");
    assert_eq!(produced[0].kind, "a");
    assert_eq!(produced[0].mode, ProcessingMode::Runtime);

    let context = processed.context.as_ref().unwrap();
    assert_eq!(context.channel.as_deref(), Some("chanA"));
    assert!(!context.id.is_empty());
    assert_eq!(context.processors.len(), 1);
    assert_eq!(context.processors[0].instance_id, automata.instance_id());
    assert!(context.processors[0].begin.is_some());
    assert!(context.processors[0].end.is_some());

    let report = automata.get_counters();
    assert_eq!(report.termination["SUCCESS"].total, 1);
    assert_eq!(report.annotate["flag"].total, 1);
}

#[tokio::test]
async fn missing_event_code_is_rejected() {
    let automata = engine(InMemoryCatalog::new(), AutomataConfig::default());
    let err = automata
        .process(Message::new("  "), "chanA", "subject-1", Value::Null)
        .await
        .unwrap_err();
    assert!(err.is_input());
}

#[tokio::test]
async fn a_failing_variant_never_poisons_its_siblings() {
    let catalog = InMemoryCatalog::new()
        .with_model(
            ModelInfo::new("good").with_variant(Variant::new("1", ProcessingMode::Runtime)),
            &[("1", "model.annotate('ok', true);")],
        )
        .with_model(
            ModelInfo::new("broken").with_variant(Variant::new("1", ProcessingMode::Runtime)),
            &[("1", "function( {")],
        );
    let automata = engine(catalog, AutomataConfig::default());

    let processed = automata
        .process(incoming(), "chanA", "subject-1", Value::Null)
        .await
        .unwrap();

    let produced = annotations(&processed);
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].code, "ok");
    assert_eq!(produced[0].model, "good@v1");

    let report = automata.get_counters();
    assert_eq!(report.errors.len(), 1);
    let (failure, counters) = report.errors.iter().next().unwrap();
    assert!(failure.contains("broken@v1"));
    assert_eq!(counters.total, 1);
}

#[tokio::test]
async fn test_variants_run_only_when_test_mode_is_enabled() {
    let catalog = || {
        InMemoryCatalog::new().with_model(
            ModelInfo::new("shadow").with_variant(Variant::new("1", ProcessingMode::Test)),
            &[("1", "model.annotate('shadow', 1);")],
        )
    };

    let disabled = engine(catalog(), AutomataConfig::default());
    let processed = disabled
        .process(incoming(), "chanA", "subject-1", Value::Null)
        .await
        .unwrap();
    assert!(annotations(&processed).is_empty());

    let enabled = engine(catalog(), AutomataConfig::default().with_test_mode(true));
    let processed = enabled
        .process(incoming(), "chanA", "subject-1", Value::Null)
        .await
        .unwrap();
    let produced = annotations(&processed);
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].mode, ProcessingMode::Test);
}

#[tokio::test]
async fn reprocessing_starts_from_a_clean_context() {
    let catalog = InMemoryCatalog::new().with_model(
        ModelInfo::new("risk").with_variant(Variant::new("1", ProcessingMode::Runtime)),
        &[("1", "model.annotate('fresh', 1);")],
    );
    let automata = engine(catalog, AutomataConfig::default());

    let mut message = incoming().with_context(Context::new("m1", "chanA"));
    message.context.as_mut().unwrap().annotations.push(Annotation {
        code: "stale".to_string(),
        value: json!(0),
        model: "old@v0".to_string(),
        kind: "a".to_string(),
        mode: ProcessingMode::Runtime,
    });

    let processed = automata
        .process(message, "chanB", "subject-1", Value::Null)
        .await
        .unwrap();

    let context = processed.context.as_ref().unwrap();
    // Existing context keeps its identity, loses stale results.
    assert_eq!(context.id, "m1");
    assert_eq!(context.channel.as_deref(), Some("chanA"));
    let codes: Vec<&str> = context.annotations.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, ["fresh"]);
}

#[tokio::test]
async fn originator_user_fills_a_missing_user() {
    let catalog = InMemoryCatalog::new().with_model(
        ModelInfo::new("echo").with_variant(Variant::new("1", ProcessingMode::Runtime)),
        &[("1", "model.annotate('tenant', model.message.u.tenantId);")],
    );
    let automata = engine(catalog, AutomataConfig::default());

    let processed = automata
        .process(Message::new("EVT_X"), "chanA", "subject-9", Value::Null)
        .await
        .unwrap();

    // Missing user is filled from the call arguments: the originating
    // channel doubles as the tenant.
    assert_eq!(annotations(&processed)[0].value, json!("chanA"));
    assert_eq!(processed.user.as_ref().unwrap().id, "subject-9");
    assert_eq!(processed.user.as_ref().unwrap().tenant_id, "chanA");
}

#[tokio::test]
async fn debug_flags_default_when_absent() {
    let automata = engine(InMemoryCatalog::new(), AutomataConfig::default());
    let processed = automata
        .process(incoming(), "chanA", "subject-1", Value::Null)
        .await
        .unwrap();
    let debug = processed.debug.unwrap();
    assert!(!debug.capture);
    assert_eq!(debug.sampling, 0.01);
}
