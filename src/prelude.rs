//! Convenience re-exports for embedders.
//!
//! ```no_run
//! use nanoautomata::prelude::*;
//! ```

pub use crate::common::config::AutomataConfig;
pub use crate::common::interface::{
    ExecutionLogsSink, ModelApi, ModelApiProvider, ModelLibraries, ModelLibrariesProvider,
    ModelProvider,
};
pub use crate::common::interval_counters::{CountersSnapshot, IntervalCounters};
pub use crate::common::model::{
    model_version, Annotation, Context, DebugFlags, LogEntry, Message, ModelCode, ModelInfo,
    ModelVariant, ProcessingMode, UserRef, Variant,
};
pub use crate::engine::{Automata, ExecutionCountersReport, ExecutionHarness};
pub use crate::errors::{Error, ErrorKind, Result};
pub use crate::js_v8::{HostFunction, JsReturn, JsValue};
pub use crate::utils::logger::init_logger;
