//! Embedded V8 execution for model scripts.

pub mod v8;

pub use self::v8::{run_to_json, HostFunction, JsReturn, JsValue, ScopedHostFns, V8Engine};
