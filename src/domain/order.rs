// ============================================================================
// Order Domain Model
// ============================================================================

use super::errors::{BookError, ValidationError};
use super::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identifier. Ordering is lexicographic, which settlement relies on
/// to acquire per-account resources in a fixed global order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trading pair such as `BTC-USD` or `ETH/USDT` (base first, quote second).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(base, quote)` asset codes.
    pub fn assets(&self) -> Option<(&str, &str)> {
        let (base, quote) = self.0.split_once(['-', '/'])?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some((base, quote))
    }
}

impl From<&str> for Symbol {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

impl From<String> for Symbol {
    fn from(symbol: String) -> Self {
        Self(symbol)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderType {
    Limit { price: Price },
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeInForce {
    /// Good Till Cancel - remains active until filled or cancelled
    GoodTillCancel,
    /// Immediate Or Cancel - fill immediately or cancel remainder
    ImmediateOrCancel,
    /// Fill Or Kill - fill entire order immediately or cancel all
    FillOrKill,
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderStatus {
        Admitted,
        Resting,
        PartiallyFilled,
        Filled,
        Cancelled,
    }

    impl OrderStatus {
        pub fn is_terminal(&self) -> bool {
            matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
        }

        pub fn can_be_cancelled(&self) -> bool {
            !self.is_terminal()
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderStatusTransition {
        Rest,
        PartialFill,
        Fill,
        Cancel,
    }

    impl OrderStatus {
        /// A partially filled order that rests keeps reporting `PartiallyFilled`.
        pub fn transition(&self, transition: OrderStatusTransition) -> Option<OrderStatus> {
            use OrderStatus::*;
            use OrderStatusTransition::*;

            match (self, transition) {
                (Admitted, Rest) => Some(Resting),
                (PartiallyFilled, Rest) => Some(PartiallyFilled),

                (Admitted | Resting | PartiallyFilled, PartialFill) => Some(PartiallyFilled),
                (Admitted | Resting | PartiallyFilled, Fill) => Some(Filled),
                (Admitted | Resting | PartiallyFilled, Cancel) => Some(Cancelled),

                _ => None,
            }
        }
    }
}

use state::{OrderStatus, OrderStatusTransition};

// ============================================================================
// Order Intent
// ============================================================================

/// An order as submitted by a client, before admission.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderIntent {
    pub id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
}

impl OrderIntent {
    pub fn limit(
        account_id: impl Into<AccountId>,
        symbol: impl Into<Symbol>,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            id: OrderId::new(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit { price },
            quantity,
            time_in_force: TimeInForce::GoodTillCancel,
        }
    }

    /// Market orders are always immediate; the remainder never rests.
    pub fn market(
        account_id: impl Into<AccountId>,
        symbol: impl Into<Symbol>,
        side: Side,
        quantity: Quantity,
    ) -> Self {
        Self {
            id: OrderId::new(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            time_in_force: TimeInForce::ImmediateOrCancel,
        }
    }

    pub fn with_id(mut self, id: OrderId) -> Self {
        self.id = id;
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn price(&self) -> Option<Price> {
        match self.order_type {
            OrderType::Limit { price } => Some(price),
            OrderType::Market => None,
        }
    }

    /// Structural checks that run before any risk evaluation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        if let OrderType::Limit { price } = self.order_type {
            if price <= Decimal::ZERO {
                return Err(ValidationError::NonPositivePrice(price));
            }
            if price.checked_mul(self.quantity).is_none() {
                return Err(ValidationError::NotionalOverflow {
                    price,
                    quantity: self.quantity,
                });
            }
        }
        if self.account_id.as_str().is_empty() {
            return Err(ValidationError::EmptyAccount);
        }
        if self.symbol.assets().is_none() {
            return Err(ValidationError::MalformedSymbol(self.symbol.to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// An admitted order. The terms fixed at admission are read-only; fill and
/// status fields are only mutated while the owning book is locked.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub created_at: DateTime<Utc>,

    side: Side,
    order_type: OrderType,
    quantity: Quantity,
    time_in_force: TimeInForce,
    remaining_quantity: Quantity,
    filled_quantity: Quantity,
    status: OrderStatus,
}

impl Order {
    pub fn admit(intent: OrderIntent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: intent.id,
            account_id: intent.account_id,
            symbol: intent.symbol,
            side: intent.side,
            order_type: intent.order_type,
            quantity: intent.quantity,
            time_in_force: intent.time_in_force,
            created_at,
            remaining_quantity: intent.quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Admitted,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Quantity at admission; never changes as the order fills.
    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.remaining_quantity
    }

    pub fn filled_quantity(&self) -> Quantity {
        self.filled_quantity
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn price(&self) -> Option<Price> {
        match self.order_type {
            OrderType::Limit { price } => Some(price),
            OrderType::Market => None,
        }
    }

    pub fn is_market_order(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }

    pub fn is_limit_order(&self) -> bool {
        matches!(self.order_type, OrderType::Limit { .. })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Execute `quantity` against this order.
    pub fn fill(&mut self, quantity: Quantity) -> Result<(), BookError> {
        if quantity <= Decimal::ZERO || quantity > self.remaining_quantity {
            return Err(BookError::Overfill {
                order_id: self.id,
                requested: quantity,
                remaining: self.remaining_quantity,
            });
        }

        let transition = if quantity == self.remaining_quantity {
            OrderStatusTransition::Fill
        } else {
            OrderStatusTransition::PartialFill
        };
        self.apply(transition)?;

        self.remaining_quantity -= quantity;
        self.filled_quantity += quantity;
        Ok(())
    }

    pub fn mark_resting(&mut self) -> Result<(), BookError> {
        self.apply(OrderStatusTransition::Rest)
    }

    pub fn cancel(&mut self) -> Result<(), BookError> {
        self.apply(OrderStatusTransition::Cancel)
    }

    fn apply(&mut self, transition: OrderStatusTransition) -> Result<(), BookError> {
        self.status = self
            .status
            .transition(transition)
            .ok_or(BookError::InvalidTransition {
                order_id: self.id,
                from: self.status,
                transition,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit_order(quantity: i64) -> Order {
        let intent = OrderIntent::limit(
            "acct-1",
            "BTC-USD",
            Side::Buy,
            Decimal::from(50000),
            Decimal::from(quantity),
        );
        Order::admit(intent, Utc::now())
    }

    #[test]
    fn test_order_admission() {
        let order = limit_order(1);

        assert_eq!(order.remaining_quantity(), Decimal::ONE);
        assert_eq!(order.filled_quantity(), Decimal::ZERO);
        assert_eq!(order.status(), OrderStatus::Admitted);
        assert_eq!(order.price(), Some(Decimal::from(50000)));
    }

    #[test]
    fn test_admission_terms_survive_fills() {
        let intent = OrderIntent::limit(
            "acct-1",
            "BTC-USD",
            Side::Sell,
            Decimal::from(50000),
            Decimal::from(4),
        )
        .with_time_in_force(TimeInForce::ImmediateOrCancel);
        let mut order = Order::admit(intent, Utc::now());

        order.fill(Decimal::from(3)).unwrap();

        assert_eq!(order.side(), Side::Sell);
        assert_eq!(order.quantity(), Decimal::from(4));
        assert_eq!(order.time_in_force(), TimeInForce::ImmediateOrCancel);
        assert_eq!(
            order.order_type(),
            OrderType::Limit {
                price: Decimal::from(50000)
            }
        );
        assert_eq!(
            order.quantity(),
            order.filled_quantity() + order.remaining_quantity()
        );
    }

    #[test]
    fn test_fill_progression() {
        let mut order = limit_order(10);

        order.fill(Decimal::from(3)).unwrap();
        assert_eq!(order.filled_quantity(), Decimal::from(3));
        assert_eq!(order.remaining_quantity(), Decimal::from(7));
        assert_eq!(order.status(), OrderStatus::PartiallyFilled);

        order.fill(Decimal::from(7)).unwrap();
        assert_eq!(order.status(), OrderStatus::Filled);
        assert!(order.status().is_terminal());
    }

    #[test]
    fn test_overfill_protection() {
        let mut order = limit_order(5);

        let err = order.fill(Decimal::from(10)).unwrap_err();
        assert!(matches!(err, BookError::Overfill { .. }));
        assert_eq!(order.filled_quantity(), Decimal::ZERO);

        assert!(order.fill(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_cancel_terminal_order_rejected() {
        let mut order = limit_order(1);
        order.mark_resting().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);

        assert!(matches!(
            order.cancel(),
            Err(BookError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_partially_filled_order_rests_as_partially_filled() {
        let mut order = limit_order(4);
        order.fill(Decimal::ONE).unwrap();
        order.mark_resting().unwrap();
        assert_eq!(order.status(), OrderStatus::PartiallyFilled);
    }

    #[test]
    fn test_intent_validation() {
        let zero = OrderIntent::market("acct-1", "BTC-USD", Side::Sell, Decimal::ZERO);
        assert_eq!(
            zero.validate(),
            Err(ValidationError::NonPositiveQuantity(Decimal::ZERO))
        );

        let negative_price = OrderIntent::limit(
            "acct-1",
            "BTC-USD",
            Side::Sell,
            Decimal::from(-1),
            Decimal::ONE,
        );
        assert!(matches!(
            negative_price.validate(),
            Err(ValidationError::NonPositivePrice(_))
        ));

        let huge = OrderIntent::limit(
            "acct-1",
            "BTC-USD",
            Side::Buy,
            Decimal::from(1_000_000_000_000_000_000i64),
            Decimal::from(1_000_000_000_000i64),
        );
        assert!(matches!(
            huge.validate(),
            Err(ValidationError::NotionalOverflow { .. })
        ));

        let bad_symbol = OrderIntent::market("acct-1", "BTCUSD", Side::Buy, Decimal::ONE);
        assert!(matches!(
            bad_symbol.validate(),
            Err(ValidationError::MalformedSymbol(_))
        ));
    }

    #[test]
    fn test_symbol_assets() {
        assert_eq!(Symbol::new("BTC-USD").assets(), Some(("BTC", "USD")));
        assert_eq!(Symbol::new("ETH/USDT").assets(), Some(("ETH", "USDT")));
        assert_eq!(Symbol::new("-USD").assets(), None);
    }
}
