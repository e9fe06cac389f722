//! Message-processing orchestrator and sandboxed execution engine.

pub mod automata;
pub mod counters;
pub mod harness;

pub use automata::Automata;
pub use counters::{ExecutionCounters, ExecutionCountersReport};
pub use harness::ExecutionHarness;
