// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod clock;
mod event_sink;
mod ledger;
mod matching_algorithm;
mod sources;
mod trade_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event_sink::{
    EventSink, LoggingEventSink, MatchingEvent, MatchingEventKind, NoOpEventSink, RiskEvent,
    TradeEvent, VenueEvent,
};
pub use ledger::{BalanceDelta, FundsHold, Ledger, SettlementReceipt};
pub use matching_algorithm::{MatchingAlgorithm, MatchingOutput};
pub use sources::{ExposureProjection, LimitsSource};
pub use trade_store::TradeStore;
