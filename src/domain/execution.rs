// ============================================================================
// Execution Results
// What one submit or cancel did to the book
// ============================================================================

use super::order::state::OrderStatus;
use super::{AccountId, Order, OrderId, Price, Quantity, Side, Symbol, Trade};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why an order's remaining quantity was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CancelReason {
    /// Market orders never rest
    MarketRemainder,
    ImmediateOrCancel,
    /// Not enough liquidity to fill the whole quantity
    FillOrKill,
    SelfTradePrevention,
    UserRequested,
}

/// Final disposition of the incoming order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderOutcome {
    Filled,
    /// Rested without any fill
    Resting,
    PartiallyFilledResting,
    RemainderCancelled { reason: CancelReason },
}

/// Aggregate state of one price level after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BookDelta {
    pub side: Side,
    pub price: Price,
    /// Zero when the level was removed
    pub total_quantity: Quantity,
    pub order_count: usize,
}

impl BookDelta {
    pub fn is_removal(&self) -> bool {
        self.order_count == 0
    }
}

/// One maker touched by a match
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MakerFill {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub status: OrderStatus,
}

/// Result of one `submit`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchResult {
    pub symbol: Symbol,
    /// Incoming order in its final state
    pub order: Order,
    pub trades: SmallVec<[Trade; 4]>,
    pub maker_fills: Vec<MakerFill>,
    pub book_deltas: Vec<BookDelta>,
    pub outcome: OrderOutcome,
    /// Same-account makers passed over
    pub skipped_self_trades: usize,
}

impl MatchResult {
    pub fn filled_quantity(&self) -> Quantity {
        self.trades.iter().map(|t| t.quantity).sum()
    }

    pub fn is_resting(&self) -> bool {
        matches!(
            self.outcome,
            OrderOutcome::Resting | OrderOutcome::PartiallyFilledResting
        )
    }

    /// Orders that reached a terminal state in this submit, with their account
    pub fn closed_orders(&self) -> Vec<(OrderId, AccountId)> {
        let mut closed: Vec<(OrderId, AccountId)> = self
            .maker_fills
            .iter()
            .filter(|fill| fill.status.is_terminal())
            .map(|fill| (fill.order_id, fill.account_id.clone()))
            .collect();
        if self.order.status().is_terminal() {
            closed.push((self.order.id, self.order.account_id.clone()));
        }
        closed
    }
}

/// Result of one `cancel`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CancelResult {
    pub order: Order,
    pub book_delta: BookDelta,
}
