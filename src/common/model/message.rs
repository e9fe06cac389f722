use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::ProcessingMode;

/// A domain event to annotate.
///
/// Field names stay single-letter on the wire (the upstream channel format);
/// Rust-side names are descriptive and mapped through serde renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Event code, e.g. `EVT_PATIENT_ADMITTED`. Required for processing.
    #[serde(rename = "c")]
    pub code: String,
    /// Per-message processing context; created by the orchestrator if absent.
    #[serde(rename = "ctx", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    /// Originator of the message (tenant + subject identity).
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    /// Debugging flags controlling execution-log capture.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugFlags>,
    /// Opaque event payload.
    #[serde(rename = "p", default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Message {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            context: None,
            user: None,
            debug: None,
            payload: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_payload<T: Serialize>(mut self, payload: T) -> Self {
        if let Ok(value) = serde_json::to_value(payload) {
            self.payload = value;
        }
        self
    }

    /// Originating channel, when the context carries one.
    pub fn channel(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|ctx| ctx.channel.as_deref())
            .filter(|c| !c.is_empty())
    }

    /// Message id, when the context carries one.
    pub fn id(&self) -> Option<&str> {
        self.context.as_ref().map(|ctx| ctx.id.as_str())
    }
}

/// Per-message processing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Message id, unique per message.
    #[serde(rename = "i")]
    pub id: String,
    /// Channel that captured the message; used for variant filtering.
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Annotations added as a result of model processing.
    #[serde(rename = "ax", default)]
    pub annotations: Vec<Annotation>,
    /// Processing records, one per processor instance that touched the message.
    #[serde(rename = "p", default)]
    pub processors: Vec<ProcessingInfo>,
}

impl Context {
    pub fn new(id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel: Some(channel.into()),
            annotations: Vec::new(),
            processors: Vec::new(),
        }
    }
}

/// One processor's timing for a message. `begin`/`end` are write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingInfo {
    /// Processor instance id.
    #[serde(rename = "i")]
    pub instance_id: String,
    /// Begin timestamp, epoch milliseconds.
    #[serde(rename = "b", default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<u64>,
    /// End timestamp, epoch milliseconds.
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

/// Tenant + subject identity attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
}

/// Debugging flags controlling execution-log capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DebugFlags {
    /// When true, execution logs of sampled-in runs are captured.
    #[serde(rename = "e")]
    pub capture: bool,
    /// Sampling ratio in (0, 1]; 0 disables capture, values above 1 clamp to 1.
    #[serde(rename = "s")]
    pub sampling: f64,
}

impl Default for DebugFlags {
    fn default() -> Self {
        // Capture disabled, 1% sampling when later enabled.
        Self {
            capture: false,
            sampling: 0.01,
        }
    }
}

/// One structured result of a model run, attached to the message context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    /// Annotation code; ':' is normalized to '_' before emission.
    #[serde(rename = "c")]
    pub code: String,
    /// Annotation value, any structure.
    #[serde(rename = "v")]
    pub value: Value,
    /// Producing model identity, `<model>@v<variant>`.
    #[serde(rename = "m")]
    pub model: String,
    /// Payload type tag: "a" for annotation, "r" for raise.
    #[serde(rename = "t")]
    pub kind: String,
    /// Execution mode that produced this annotation.
    #[serde(rename = "e")]
    pub mode: ProcessingMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_short_field_names() {
        let json = r#"{
            "c": "EVT_X",
            "ctx": {"i": "m1", "a": "chanA", "ax": [], "p": []},
            "u": {"id": "subject-1", "tenantId": "tenant-1"},
            "d": {"e": true, "s": 0.5}
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.code, "EVT_X");
        assert_eq!(message.channel(), Some("chanA"));
        assert_eq!(message.user.as_ref().unwrap().tenant_id, "tenant-1");
        assert!(message.debug.unwrap().capture);

        let out = serde_json::to_value(&message).unwrap();
        assert_eq!(out["c"], "EVT_X");
        assert_eq!(out["ctx"]["a"], "chanA");
        assert_eq!(out["u"]["tenantId"], "tenant-1");
    }

    #[test]
    fn empty_channel_is_treated_as_absent() {
        let message = Message::new("EVT_X").with_context(Context::new("m1", ""));
        assert_eq!(message.channel(), None);
    }
}
