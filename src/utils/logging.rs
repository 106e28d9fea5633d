// ============================================================================
// Tracing Setup
// ============================================================================

use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .compact()
        .try_init()
        .is_ok()
}
