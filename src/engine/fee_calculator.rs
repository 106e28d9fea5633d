// ============================================================================
// Fee Calculator
// Pure function of notional, tier and liquidity role
// ============================================================================

use crate::domain::{FeeRates, FeeSchedule, FeeTierLevel, LiquidityRole, Trade, TradeFees};
use rust_decimal::{Decimal, RoundingStrategy};

#[derive(Debug, Clone)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    pub fn rates(&self, tier: Option<FeeTierLevel>) -> FeeRates {
        self.schedule
            .rates(tier.unwrap_or(self.schedule.default_tier))
    }

    /// Fee on `notional`, rounded half away from zero to the schedule's
    /// scale. Negative for a maker rebate. `None` if the fee is out of range.
    pub fn fee(
        &self,
        notional: Decimal,
        tier: Option<FeeTierLevel>,
        role: LiquidityRole,
    ) -> Option<Decimal> {
        let fee = notional.checked_mul(self.rates(tier).rate(role))?;
        Some(fee.round_dp_with_strategy(
            self.schedule.fee_scale,
            RoundingStrategy::MidpointAwayFromZero,
        ))
    }

    /// Both sides' fees, or `None` when the trade's notional is out of range
    pub fn trade_fees(
        &self,
        trade: &Trade,
        maker_tier: Option<FeeTierLevel>,
        taker_tier: Option<FeeTierLevel>,
    ) -> Option<TradeFees> {
        let notional = trade.notional()?;
        Some(TradeFees {
            maker_fee: self.fee(notional, maker_tier, LiquidityRole::Maker)?,
            taker_fee: self.fee(notional, taker_tier, LiquidityRole::Taker)?,
        })
    }
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self::new(FeeSchedule::default())
    }
}
