// ============================================================================
// Trade Persistence Interface
// ============================================================================

use crate::domain::{PersistenceError, Trade, TradeId};

/// Durable trade records. `save` is an upsert keyed by trade id.
pub trait TradeStore: Send + Sync {
    fn save(&self, trade: &Trade) -> Result<(), PersistenceError>;

    fn load(&self, trade_id: TradeId) -> Result<Option<Trade>, PersistenceError>;
}
