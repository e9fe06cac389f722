use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::log::LogEntry;
use super::message::Message;

/// `<model>@v<variant>` identity string used in annotations, logs and errors.
pub fn model_version(name: &str, version: &str) -> String {
    format!("{name}@v{version}")
}

/// Execution mode of a model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Production execution; annotations are served downstream.
    Runtime,
    /// Shadow execution, collected alongside runtime results.
    Test,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Runtime => write!(f, "runtime"),
            ProcessingMode::Test => write!(f, "test"),
        }
    }
}

/// One configured instantiation of a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Variant id, unique within its model.
    #[serde(rename = "variant")]
    pub id: String,
    pub mode: ProcessingMode,
    /// Sampling ratio in [0, 100]. NaN (or absent) means "always eligible".
    #[serde(default = "default_ratio", deserialize_with = "deserialize_ratio")]
    pub ratio: f64,
    /// Channels the variant is allowed to run on; empty means any channel.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Comma-separated event-code patterns; empty means every event.
    #[serde(default)]
    pub events: String,
}

fn default_ratio() -> f64 {
    f64::NAN
}

fn deserialize_ratio<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let ratio = Option::<f64>::deserialize(deserializer)?;
    Ok(ratio.unwrap_or(f64::NAN))
}

impl Variant {
    pub fn new(id: impl Into<String>, mode: ProcessingMode) -> Self {
        Self {
            id: id.into(),
            mode,
            ratio: f64::NAN,
            channels: Vec::new(),
            events: String::new(),
        }
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_events(mut self, events: impl Into<String>) -> Self {
        self.events = events.into();
        self
    }
}

/// Catalog entry for a model: id plus its variant map, without code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub variants: HashMap<String, Variant>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            variants: HashMap::new(),
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.insert(variant.id.clone(), variant);
        self
    }

    /// Expand the variant map into one executable `ModelVariant` per entry.
    pub fn flatten(&self) -> Vec<ModelVariant> {
        self.variants
            .values()
            .map(|variant| ModelVariant {
                model_id: self.id.clone(),
                variant: variant.clone(),
            })
            .collect()
    }
}

/// A model paired with one chosen variant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVariant {
    pub model_id: String,
    pub variant: Variant,
}

impl ModelVariant {
    /// `<model>@v<variant>` identity of this pairing.
    pub fn identity(&self) -> String {
        model_version(&self.model_id, &self.variant.id)
    }
}

/// Compiled model code as supplied by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCode {
    pub code: String,
}

/// Failure record for one variant inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingFail {
    pub message: String,
    pub model: String,
}

/// Per-execution sandbox context handed to the script as `model`.
///
/// The message is a deep, independent copy; scripts never observe the
/// orchestrator's original. The API surface is injected separately since
/// host functions are not serializable.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionModel {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub config: Value,
    pub message: Message,
    pub libs: BTreeMap<String, Value>,
    pub logs: Vec<LogEntry>,
}

/// Termination record of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Termination {
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Value>,
}

/// A single annotate/raise value as recorded by the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultValue {
    pub v: Value,
}

/// Structured result returned by the harness protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelExecutionResult {
    #[serde(default)]
    pub termination: Termination,
    /// Last write per code wins within one execution.
    #[serde(default)]
    pub annotate: BTreeMap<String, ResultValue>,
    /// Raised signals, consumed by out-of-scope collaborators.
    #[serde(default)]
    pub raise: BTreeMap<String, ResultValue>,
    /// Ordered console output captured during execution.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_produces_one_entry_per_variant() {
        let info = ModelInfo::new("risk")
            .with_variant(Variant::new("1", ProcessingMode::Runtime))
            .with_variant(Variant::new("2", ProcessingMode::Test));

        let mut flattened = info.flatten();
        flattened.sort_by(|a, b| a.variant.id.cmp(&b.variant.id));
        assert_eq!(flattened.len(), 2);
        assert_eq!(flattened[0].model_id, "risk");
        assert_eq!(flattened[0].identity(), "risk@v1");
        assert_eq!(flattened[1].identity(), "risk@v2");
    }

    #[test]
    fn missing_ratio_deserializes_to_nan() {
        let variant: Variant =
            serde_json::from_str(r#"{"variant": "1", "mode": "runtime"}"#).unwrap();
        assert!(variant.ratio.is_nan());

        let variant: Variant =
            serde_json::from_str(r#"{"variant": "1", "mode": "runtime", "ratio": null}"#).unwrap();
        assert!(variant.ratio.is_nan());

        let variant: Variant =
            serde_json::from_str(r#"{"variant": "1", "mode": "runtime", "ratio": 55}"#).unwrap();
        assert_eq!(variant.ratio, 55.0);
    }

    #[test]
    fn execution_result_defaults_missing_sections() {
        let result: ModelExecutionResult =
            serde_json::from_str(r#"{"termination": {"code": "SUCCESS"}}"#).unwrap();
        assert_eq!(result.termination.code, "SUCCESS");
        assert!(result.annotate.is_empty());
        assert!(result.raise.is_empty());
        assert!(result.logs.is_empty());
    }
}
