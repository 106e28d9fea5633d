// ============================================================================
// Venue Configuration
// Fees, self-trade handling, event fan-out and settlement behavior
// ============================================================================

use super::errors::ConfigError;
use super::fee::{FeeRates, FeeSchedule, FeeTierLevel};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Self-Trade Policy
// ============================================================================

/// What happens when an incoming order meets a resting order of the same account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SelfTradePolicy {
    /// Pass over the resting order, which keeps its queue position, and keep
    /// matching against the rest of the book
    #[default]
    SkipMaker,

    /// Stop matching and cancel the incoming order's remainder
    CancelTaker,
}

// ============================================================================
// Settlement Mode
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SettlementMode {
    /// Trades are settled before `submit_order` returns
    #[default]
    Inline,

    /// Trades are queued to a dedicated settlement thread
    Background,
}

// ============================================================================
// Complete Venue Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VenueConfig {
    pub fee_schedule: FeeSchedule,

    pub self_trade_policy: SelfTradePolicy,

    /// Bounded queue length per event subscriber
    pub event_queue_capacity: usize,

    /// Levels per side returned by snapshots when no depth is given
    pub snapshot_depth: usize,

    pub settlement_mode: SettlementMode,

    /// Place ledger holds when an order is admitted
    pub hold_funds_on_admission: bool,
}

impl VenueConfig {
    pub fn new(fee_schedule: FeeSchedule) -> Self {
        Self {
            fee_schedule,
            self_trade_policy: SelfTradePolicy::default(),
            event_queue_capacity: 1024,
            snapshot_depth: 10,
            settlement_mode: SettlementMode::default(),
            hold_funds_on_admission: true,
        }
    }

    /// Builder method: Set self-trade policy
    pub fn with_self_trade_policy(mut self, policy: SelfTradePolicy) -> Self {
        self.self_trade_policy = policy;
        self
    }

    /// Builder method: Set per-subscriber queue capacity
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Builder method: Set default snapshot depth
    pub fn with_snapshot_depth(mut self, depth: usize) -> Self {
        self.snapshot_depth = depth;
        self
    }

    /// Builder method: Set settlement mode
    pub fn with_settlement_mode(mut self, mode: SettlementMode) -> Self {
        self.settlement_mode = mode;
        self
    }

    /// Builder method: Enable or disable admission holds
    pub fn with_admission_holds(mut self, enabled: bool) -> Self {
        self.hold_funds_on_admission = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fee_schedule.validate()?;

        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event queue capacity must be positive".to_string(),
            ));
        }

        if self.snapshot_depth == 0 {
            return Err(ConfigError::Invalid(
                "snapshot depth must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self::new(FeeSchedule::default())
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl VenueConfig {
    /// Spot exchange configuration
    /// - Default fee tiers with maker rebate at the top tier
    /// - Admission holds, background settlement
    pub fn spot() -> Self {
        Self::default().with_settlement_mode(SettlementMode::Background)
    }

    /// Strict configuration
    /// - Self-trades cancel the incoming order
    /// - Flat fees, rounded to cents
    /// - Inline settlement
    pub fn strict() -> Self {
        let fees = FeeSchedule::new(
            FeeTierLevel(0),
            FeeRates::new(Decimal::new(1, 3), Decimal::new(2, 3)),
        )
        .with_fee_scale(2);

        Self::new(fees)
            .with_self_trade_policy(SelfTradePolicy::CancelTaker)
            .with_settlement_mode(SettlementMode::Inline)
    }
}
