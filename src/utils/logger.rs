//! Tracing-based logger setup. Bridges the `log` facade so module-level
//! `log::info!` calls land in the tracing subscriber.
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, EnvFilter};

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the process logger once. `RUST_LOG` overrides `default_level`.
/// Subsequent calls are no-ops, so tests and embedders can call it freely.
pub fn init_logger(default_level: &str) {
    if LOGGER_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let _ = LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .compact()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logger("debug");
        init_logger("info");
        log::info!("logger smoke test via the log facade");
        tracing::info!("logger smoke test via tracing");
    }
}
