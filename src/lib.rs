//! nanoautomata: single-package entry point.
//!
//! Real-time event-annotation engine. Incoming messages are matched against a
//! tenant-scoped catalog of versioned decision models, each model variant is
//! executed inside an isolated V8 sandbox, and the structured results
//! (annotations, raised signals, termination status) are merged back onto the
//! message before it continues downstream.
//!
//! Former workspace crates are embedded as local modules under `src/`.

pub mod prelude;

#[path = "common/lib.rs"]
pub mod common;
#[path = "engine/lib.rs"]
pub mod engine;
#[path = "errors/lib.rs"]
pub mod errors;
#[path = "js_v8/lib.rs"]
pub mod js_v8;
#[path = "utils/lib.rs"]
pub mod utils;
