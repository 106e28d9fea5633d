// ============================================================================
// Limits Source and Exposure Projection
// ============================================================================

use crate::domain::{
    AccountExposure, AccountId, AccountRiskLimits, FeeTierLevel, Order, Symbol, SymbolExposure,
    SymbolRiskLimits, Trade,
};

/// Read access to admin-managed limits
pub trait LimitsSource: Send + Sync {
    fn account_limits(&self, account_id: &AccountId) -> AccountRiskLimits;

    fn symbol_limits(&self, symbol: &Symbol) -> SymbolRiskLimits;

    /// `None` selects the schedule's default tier
    fn fee_tier(&self, _account_id: &AccountId) -> Option<FeeTierLevel> {
        None
    }
}

/// Maintained exposure snapshots. Reads return copies; writes for one
/// account are serialized by the implementation.
pub trait ExposureProjection: Send + Sync {
    fn account_exposure(&self, account_id: &AccountId) -> AccountExposure;

    fn symbol_exposure(&self, symbol: &Symbol) -> SymbolExposure;

    /// An order passed risk and entered matching
    fn record_admission(&self, order: &Order);

    /// An order left the open set (filled or cancelled)
    fn record_order_closed(&self, account_id: &AccountId);

    /// A trade settled
    fn record_fill(&self, trade: &Trade);
}
