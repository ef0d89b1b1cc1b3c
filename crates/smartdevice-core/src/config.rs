//! Shared configuration defaults and environment overrides.
//!
//! Device family tables are loaded by `smartdevice-commands`; this module only
//! holds the runtime knobs shared across crates.

/// Default values
pub mod defaults {
    /// Reply timeout for a JSON-RPC request
    pub const MESSAGE_TIMEOUT_MS: u64 = 5000;
    /// Number of resends before a request is dropped
    pub const MESSAGE_REPEAT: u32 = 3;
    /// Minimum interval between two staleness sweeps
    pub const STALE_CHECK_INTERVAL_MS: u64 = 1000;
    /// Upper bound on placeholder expansion passes
    pub const TEMPLATE_MAX_PASSES: usize = 10;
    /// Default tracing filter
    pub const LOG_FILTER: &str = "smartdevice=info";
}

/// Environment variable names and readers
pub mod env_vars {
    use super::defaults;

    pub const MESSAGE_TIMEOUT_MS: &str = "SMARTDEVICE_MESSAGE_TIMEOUT_MS";
    pub const MESSAGE_REPEAT: &str = "SMARTDEVICE_MESSAGE_REPEAT";
    pub const STALE_CHECK_INTERVAL_MS: &str = "SMARTDEVICE_STALE_CHECK_INTERVAL_MS";
    pub const LOG_JSON: &str = "SMARTDEVICE_LOG_JSON";

    /// Reply timeout from the environment, or the default
    pub fn message_timeout_ms() -> u64 {
        std::env::var(MESSAGE_TIMEOUT_MS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::MESSAGE_TIMEOUT_MS)
    }

    /// Resend budget from the environment, or the default
    pub fn message_repeat() -> u32 {
        std::env::var(MESSAGE_REPEAT)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::MESSAGE_REPEAT)
    }

    pub fn stale_check_interval_ms() -> u64 {
        std::env::var(STALE_CHECK_INTERVAL_MS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::STALE_CHECK_INTERVAL_MS)
    }

    /// Whether logs should be emitted as JSON
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}
