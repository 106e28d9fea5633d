// ============================================================================
// Utilities Module
// ============================================================================

#[cfg(feature = "logging")]
mod logging;

#[cfg(feature = "logging")]
pub use logging::init_tracing;
