//! Tracing subscriber initialization.
//!
//! Daemons log JSON lines with timestamps; the filter comes from `RUST_LOG`
//! and falls back to a default directive. Every initializer is safe to call
//! more than once: only the first call installs a subscriber.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize JSON logging for the process.
pub fn init() {
    init_with_default_filter(DEFAULT_FILTER);
}

/// Initialize JSON logging with a custom fallback filter
/// (e.g. `"assetflow_daemon=debug,info"`).
pub fn init_with_default_filter(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Human-readable logging routed through the test harness's captured output.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}
