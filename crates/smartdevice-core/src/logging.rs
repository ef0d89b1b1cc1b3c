//! Tracing subscriber setup for hosts embedding the framework.

use tracing_subscriber::EnvFilter;

use crate::config::{defaults, env_vars};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over the default filter. JSON output is selected with
/// `SMARTDEVICE_LOG_JSON=true`. Calling this twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(defaults::LOG_FILTER));

    let result = if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("Tracing subscriber already installed: {}", e);
    }
}

/// Subscriber for tests: captures output through the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
