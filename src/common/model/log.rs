use serde::{Deserialize, Serialize};

/// One captured console-style log line from a model execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Timestamp, epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp: u64,
    /// Source identity, `<model>@v<variant>`. Downstream filters logs by this
    /// field, so change sparingly.
    #[serde(rename = "s")]
    pub source: String,
    /// Formatted log message.
    #[serde(rename = "m")]
    pub message: String,
}
