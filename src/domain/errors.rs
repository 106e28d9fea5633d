// ============================================================================
// Error Taxonomy
// Validation, risk, book, ledger and persistence failures
// ============================================================================

use super::order::state::{OrderStatus, OrderStatusTransition};
use super::risk::PreTradeRiskAssessment;
use super::{AccountId, OrderId, Price, Quantity, Symbol, TradeId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level error returned by the venue entry points
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("order {} rejected by pre-trade risk checks", .0.order_id)]
    RiskRejected(Box<PreTradeRiskAssessment>),

    #[error("book error: {0}")]
    Book(#[from] BookError),

    #[error("engine for {symbol} is halted: {reason}")]
    EngineHalted { symbol: Symbol, reason: String },

    #[error("matching invariant violated on {symbol}: {reason}")]
    InvariantViolation { symbol: Symbol, reason: String },

    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("settlement worker unavailable: {0}")]
    SettlementWorker(String),
}

/// Malformed orders, rejected before admission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Quantity),

    #[error("limit price must be positive, got {0}")]
    NonPositivePrice(Price),

    #[error("account id must not be empty")]
    EmptyAccount,

    #[error("symbol {0} is not of the form BASE-QUOTE")]
    MalformedSymbol(String),

    #[error("notional of {quantity} @ {price} is out of range")]
    NotionalOverflow { price: Price, quantity: Quantity },
}

/// Order book and order state errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    #[error("duplicate order id {0}")]
    DuplicateOrder(OrderId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} cannot rest in the book")]
    NotRestable(OrderId),

    #[error("order {order_id}: fill of {requested} exceeds remaining {remaining}")]
    Overfill {
        order_id: OrderId,
        requested: Quantity,
        remaining: Quantity,
    },

    #[error("order {order_id}: invalid transition from {from:?} via {transition:?}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        transition: OrderStatusTransition,
    },

    #[error("order for {actual} routed to the {expected} book")]
    SymbolMismatch { expected: Symbol, actual: Symbol },
}

/// Failures reported by the ledger capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient {asset} for {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("a hold already exists for order {0}")]
    DuplicateHold(OrderId),

    #[error("symbol {0} has no base/quote asset pair")]
    UnsupportedSymbol(Symbol),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("{asset} amount out of range")]
    AmountOverflow { asset: String },
}

/// Failures reported by the trade store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("trade store unavailable: {0}")]
    Unavailable(String),

    #[error("conflicting write for trade {0}")]
    Conflict(TradeId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
