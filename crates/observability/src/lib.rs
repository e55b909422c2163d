//! Tracing/logging setup shared by binaries and tests.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// JSON lines with timestamps, filtered by `RUST_LOG` (default `info`). Safe
/// to call multiple times; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Human-readable output captured by the test harness.
///
/// Defaults to `debug` so FIFO steps and conversions show up in failing test
/// output.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_is_idempotent() {
        super::init_for_tests();
        super::init_for_tests();
        super::init();
        tracing::info!(check = "observability", "still logging after repeated init");
    }
}
