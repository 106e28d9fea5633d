// ============================================================================
// Engine Module
// Matching, pre-trade risk, fees and settlement
// ============================================================================

mod context;
mod fee_calculator;
mod manager;
mod matching_engine;
mod price_time;
mod risk_service;
mod trade_processor;

pub mod settlement;

pub use context::{EngineContext, EngineContextBuilder, SubmitReport};
pub use fee_calculator::FeeCalculator;
pub use manager::{OrderBookManager, VenueStats};
pub use matching_engine::{BookStats, MatchingEngine};
pub use price_time::PriceTimePriority;
pub use risk_service::RiskService;
pub use settlement::{
    AccountFences, AdmissionGates, FenceGuard, SettlementBatch, SettlementWorker,
};
pub use trade_processor::{
    balance_deltas, ReconciliationItem, SettlementOutcome, TradeProcessor, TradeSettlement,
};
