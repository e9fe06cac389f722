//! Environment-level toggles consumed by the engine.
use std::env;

/// Enables the shadow (test-mode) execution phase after runtime variants.
pub const ENV_TEST_MODE: &str = "RUNTIME_MODEL_TESTING_ENABLED";
/// Suppresses console capture inside the sandbox.
pub const ENV_DISABLE_CONSOLE: &str = "RUNTIME_MODEL_DISABLE_CONSOLE";

#[derive(Debug, Clone, Copy, Default)]
pub struct AutomataConfig {
    /// Run test-mode variants after the runtime phase completes.
    pub test_mode_enabled: bool,
    /// Replace the sandbox console with no-ops instead of capturing output.
    pub disable_console: bool,
}

impl AutomataConfig {
    /// Read toggles from the process environment. A variable counts as set
    /// when it equals `true` or `1` (case-insensitive).
    pub fn from_env() -> Self {
        Self {
            test_mode_enabled: env_flag(ENV_TEST_MODE),
            disable_console: env_flag(ENV_DISABLE_CONSOLE),
        }
    }

    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        self.test_mode_enabled = enabled;
        self
    }

    pub fn with_console_disabled(mut self, disabled: bool) -> Self {
        self.disable_console = disabled;
        self
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| {
            let value = value.trim().to_ascii_lowercase();
            value == "true" || value == "1"
        })
        .unwrap_or(false)
}
