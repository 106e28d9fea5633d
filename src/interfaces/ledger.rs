// ============================================================================
// Ledger Capability
// Balance holds and trade settlement, owned outside the venue core
// ============================================================================

use crate::domain::{AccountId, LedgerError, OrderId, Trade};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Funds reserved for an open order
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FundsHold {
    pub account_id: AccountId,
    pub order_id: OrderId,
    pub asset: String,
    pub amount: Decimal,
}

/// Signed balance change for one side of a trade. Debits draw on the hold
/// placed for `order_id` before touching available balance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BalanceDelta {
    pub account_id: AccountId,
    pub order_id: OrderId,
    pub base_asset: String,
    pub quote_asset: String,
    pub base: Decimal,
    pub quote: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementReceipt {
    Applied,
    /// The trade id had already been applied; nothing changed
    AlreadyApplied,
}

/// Transactional, account-scoped balance operations
pub trait Ledger: Send + Sync {
    fn hold_funds(&self, hold: FundsHold) -> Result<(), LedgerError>;

    /// Return whatever is left of the order's hold to available balance
    fn release_funds(&self, account_id: &AccountId, order_id: OrderId)
        -> Result<Decimal, LedgerError>;

    /// Apply both deltas atomically, idempotent by trade id
    fn apply_trade_settlement(
        &self,
        trade: &Trade,
        maker: &BalanceDelta,
        taker: &BalanceDelta,
    ) -> Result<SettlementReceipt, LedgerError>;
}
