// ============================================================================
// Event Sink Interface
// Append-only publication of matching, risk and trade lifecycle events
// ============================================================================

use crate::domain::{
    AccountId, BookDelta, CancelReason, OrderId, Price, Quantity, RiskCheck, Side, Symbol, Trade,
};
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Event emitted by a symbol's matching engine. `sequence` increases by one
/// per event within a symbol, in processing order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchingEvent {
    pub symbol: Symbol,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: MatchingEventKind,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchingEventKind {
    /// Order received by the engine
    OrderAccepted {
        order_id: OrderId,
        account_id: AccountId,
        side: Side,
        quantity: Quantity,
    },

    /// Two orders crossed
    TradeExecuted(Trade),

    /// Order added to book
    OrderRested {
        order_id: OrderId,
        price: Price,
        remaining_quantity: Quantity,
    },

    OrderCancelled {
        order_id: OrderId,
        reason: CancelReason,
        remaining_quantity: Quantity,
    },

    /// Level aggregate changed
    BookDelta(BookDelta),

    /// The engine stopped accepting mutations
    EngineHalted { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RiskEvent {
    CheckFailed {
        order_id: OrderId,
        account_id: AccountId,
        symbol: Symbol,
        check: RiskCheck,
    },

    /// Non-blocking check result kept for audit
    CheckWarning {
        order_id: OrderId,
        account_id: AccountId,
        symbol: Symbol,
        check: RiskCheck,
    },

    MarginWarning {
        order_id: OrderId,
        account_id: AccountId,
        check: RiskCheck,
    },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TradeEvent {
    Settled(Trade),

    Failed { trade: Trade, reason: String },

    /// A failed trade was queued for reconciliation with its execution data
    ReconciliationRequired { trade: Trade, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VenueEvent {
    Matching(MatchingEvent),
    Risk(RiskEvent),
    Trade(TradeEvent),
}

/// Fire-and-forget event consumer.
///
/// Matching events are published while the symbol's book lock is held, so
/// `publish` and `publish_all` must return without blocking and must not
/// call back into the engine. A sink that can fall behind drops or buffers
/// instead of waiting.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: VenueEvent);

    /// Batch publication, in order. Runs under the same constraints as
    /// `publish`.
    fn publish_all(&self, events: Vec<VenueEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// No-op event sink for testing
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn publish(&self, _event: VenueEvent) {}
}

/// Logging event sink
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn publish(&self, event: VenueEvent) {
        tracing::debug!("Venue event: {:?}", event);
    }
}
