//! Contracts for the external collaborators the engine depends on.
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::js_v8::HostFunction;

use super::model::{LogEntry, ModelCode, ModelInfo};

/// Host-exposed functions injected into each execution as `model.api.*`.
pub type ModelApi = BTreeMap<String, HostFunction>;

/// Third-party values injected into each execution as `model.libs.*`.
pub type ModelLibraries = BTreeMap<String, Value>;

/// Catalog/storage layer supplying model metadata and compiled model code.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn get_models_info(&self, tenant_id: &str, user_id: &str) -> Result<Vec<ModelInfo>>;

    async fn get_model_variant(
        &self,
        model_id: &str,
        variant_id: &str,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<ModelCode>;
}

/// Supplies the host API surface available to scripts.
#[async_trait]
pub trait ModelApiProvider: Send + Sync {
    async fn get_api(&self) -> Result<ModelApi>;
}

/// Supplies third-party library values available to scripts.
#[async_trait]
pub trait ModelLibrariesProvider: Send + Sync {
    async fn get_libraries(&self) -> Result<ModelLibraries>;
}

/// Sink that persists captured execution logs.
///
/// Called once per execution with that execution's forwarded logs; the batch
/// may be empty when sampling excluded capture.
#[async_trait]
pub trait ExecutionLogsSink: Send + Sync {
    async fn consume(&self, logs: Vec<LogEntry>);
}
