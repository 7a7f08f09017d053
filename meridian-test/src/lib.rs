//! Shared test infrastructure for the Meridian workspace.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize tracing and error reporting for a test.
///
/// Call this at the top of every test. It is idempotent, so tests running
/// in the same process share one subscriber.
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer();
        let _ = fmt_layer.try_init();
        let _ = color_eyre::install();
    });
}
