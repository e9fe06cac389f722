pub mod log;
pub mod message;
pub mod model;

pub use log::LogEntry;
pub use message::{Annotation, Context, DebugFlags, Message, ProcessingInfo, UserRef};
pub use model::{
    model_version, ExecutionModel, ModelCode, ModelExecutionResult, ModelInfo, ModelVariant,
    ProcessingFail, ProcessingMode, ResultValue, Termination, Variant,
};
