// ============================================================================
// Trade Domain Model
// ============================================================================

use super::{AccountId, OrderId, Price, Quantity, Side, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TradeId(Uuid);

impl TradeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement status: `Pending -> {Settled | Failed}`, both terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TradeStatus {
    Pending,
    Settled,
    Failed,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Settled | TradeStatus::Failed)
    }
}

/// Represents a matched trade between a resting maker and an incoming taker
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    pub id: TradeId,
    pub symbol: Symbol,

    /// Order ID of the passive order (resting in book)
    pub maker_order_id: OrderId,

    /// Order ID of the aggressive order (incoming)
    pub taker_order_id: OrderId,

    pub maker_account_id: AccountId,
    pub taker_account_id: AccountId,

    /// Side of the resting order
    pub maker_side: Side,

    /// Execution price, always the maker's resting price
    pub price: Price,

    pub quantity: Quantity,

    pub maker_fee: Decimal,
    pub taker_fee: Decimal,

    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_account_id: AccountId,
        taker_account_id: AccountId,
        maker_side: Side,
        price: Price,
        quantity: Quantity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TradeId::new(),
            symbol,
            maker_order_id,
            taker_order_id,
            maker_account_id,
            taker_account_id,
            maker_side,
            price,
            quantity,
            maker_fee: Decimal::ZERO,
            taker_fee: Decimal::ZERO,
            status: TradeStatus::Pending,
            created_at,
            settled_at: None,
        }
    }

    /// Price times quantity, in quote currency; `None` if out of range
    pub fn notional(&self) -> Option<Decimal> {
        self.price.checked_mul(self.quantity)
    }

    pub fn taker_side(&self) -> Side {
        self.maker_side.opposite()
    }

    pub fn buyer_account_id(&self) -> &AccountId {
        match self.maker_side {
            Side::Buy => &self.maker_account_id,
            Side::Sell => &self.taker_account_id,
        }
    }

    pub fn seller_account_id(&self) -> &AccountId {
        match self.maker_side {
            Side::Buy => &self.taker_account_id,
            Side::Sell => &self.maker_account_id,
        }
    }

    pub fn apply_fees(&mut self, maker_fee: Decimal, taker_fee: Decimal) {
        self.maker_fee = maker_fee;
        self.taker_fee = taker_fee;
    }

    pub fn mark_settled(&mut self, at: DateTime<Utc>) {
        self.status = TradeStatus::Settled;
        self.settled_at = Some(at);
    }

    pub fn mark_failed(&mut self) {
        self.status = TradeStatus::Failed;
        self.settled_at = None;
    }
}
