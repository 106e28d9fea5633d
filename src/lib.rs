// ============================================================================
// Venue Core Library
// Price-time matching, pre-trade risk and trade settlement
// ============================================================================

//! # Venue Core
//!
//! The core of a trading venue: one price-time priority order book per symbol,
//! a pre-trade risk gate in front of it and a trade processor behind it that
//! applies fees, settles balances through a ledger and persists trades.
//!
//! ## Features
//!
//! - **Price-time priority** matching with configurable self-trade prevention
//! - **Pre-trade risk** checks producing an auditable assessment
//! - **Tiered fees** with maker rebates and deterministic rounding
//! - **Exactly-once settlement** with a reconciliation queue for failures
//! - **Bounded event fan-out** where slow subscribers lose events, never block
//!
//! ## Example
//!
//! ```rust
//! use venue_core::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(InMemoryLedger::new());
//! ledger.deposit(&AccountId::new("seller"), "BTC", Decimal::from(1));
//! ledger.deposit(&AccountId::new("buyer"), "USD", Decimal::from(60_000));
//!
//! let context = EngineContext::builder()
//!     .with_ledger(ledger.clone())
//!     .build()
//!     .unwrap();
//!
//! context
//!     .submit_order(OrderIntent::limit("seller", "BTC-USD", Side::Sell, Decimal::from(50_000), Decimal::ONE))
//!     .unwrap();
//! let report = context
//!     .submit_order(OrderIntent::limit("buyer", "BTC-USD", Side::Buy, Decimal::from(50_000), Decimal::ONE))
//!     .unwrap();
//!
//! assert_eq!(report.trades().len(), 1);
//! assert!(report.all_settled());
//!
//! let snapshot = context.snapshot(&Symbol::new("BTC-USD"), None).unwrap();
//! println!("Best bid: {:?}", snapshot.best_bid());
//! println!("Spread: {:?}", snapshot.spread);
//! ```

pub mod adapters;
pub mod domain;
pub mod engine;
pub mod interfaces;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::adapters::{
        EventBus, EventSubscription, InMemoryExposure, InMemoryLedger, InMemoryTradeStore,
        StaticLimits,
    };
    pub use crate::domain::{
        AccountId, AccountRiskLimits, CancelReason, FeeSchedule, FeeTierLevel, MatchResult,
        Order, OrderBook, OrderBookSnapshot, OrderId, OrderIntent, OrderOutcome, OrderStatus,
        OrderType, Price, Quantity, SelfTradePolicy, SettlementMode, Side, Symbol,
        SymbolRiskLimits, TimeInForce, Trade, TradeStatus, VenueConfig, VenueError,
    };
    pub use crate::engine::{
        EngineContext, EngineContextBuilder, MatchingEngine, OrderBookManager, PriceTimePriority,
        RiskService, SubmitReport, TradeProcessor,
    };
    pub use crate::interfaces::{
        Clock, EventSink, LoggingEventSink, ManualClock, MatchingAlgorithm, NoOpEventSink,
        SystemClock, VenueEvent,
    };
}
