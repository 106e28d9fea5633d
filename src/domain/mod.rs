// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod config;
pub mod errors;
pub mod execution;
pub mod fee;
pub mod order;
pub mod order_book;
pub mod risk;
pub mod trade;

use rust_decimal::Decimal;

/// Exact decimal price in quote currency
pub type Price = Decimal;

/// Exact decimal quantity in base currency
pub type Quantity = Decimal;

pub use config::{SelfTradePolicy, SettlementMode, VenueConfig};
pub use errors::{BookError, ConfigError, LedgerError, PersistenceError, ValidationError, VenueError};
pub use execution::{BookDelta, CancelReason, CancelResult, MakerFill, MatchResult, OrderOutcome};
pub use fee::{FeeRates, FeeSchedule, FeeTierLevel, LiquidityRole, TradeFees};
pub use order::{AccountId, Order, OrderId, OrderIntent, OrderType, Side, Symbol, TimeInForce};
pub use order_book::{BookSide, OrderBook, OrderBookSnapshot, PriceLevel};
pub use risk::{
    AccountExposure, AccountRiskLimits, PositionExposure, PreTradeRiskAssessment, RiskCheck,
    RiskCheckKind, RiskCheckStatus, SymbolExposure, SymbolRiskLimits,
};
pub use trade::{Trade, TradeId, TradeStatus};

// Re-export state machine
pub use order::state::{OrderStatus, OrderStatusTransition};
