// ============================================================================
// Adapters Module
// In-memory implementations of the external capabilities
// ============================================================================

mod event_bus;
mod memory_ledger;
mod memory_store;

pub use event_bus::{EventBus, EventSubscription};
pub use memory_ledger::{AssetBalance, InMemoryLedger};
pub use memory_store::{InMemoryExposure, InMemoryTradeStore, StaticLimits};
