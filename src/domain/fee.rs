// ============================================================================
// Fee Schedule
// Tiered maker/taker rates; negative maker rates are rebates
// ============================================================================

use super::errors::ConfigError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeeTierLevel(pub u8);

impl fmt::Display for FeeTierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier-{}", self.0)
    }
}

/// Whether an order added or removed liquidity in a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LiquidityRole {
    Maker,
    Taker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeeRates {
    /// Can be negative (rebate)
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl FeeRates {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        Self {
            maker_rate,
            taker_rate,
        }
    }

    pub fn rate(&self, role: LiquidityRole) -> Decimal {
        match role {
            LiquidityRole::Maker => self.maker_rate,
            LiquidityRole::Taker => self.taker_rate,
        }
    }
}

/// Fees charged on one trade, in quote currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TradeFees {
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeeSchedule {
    pub tiers: BTreeMap<FeeTierLevel, FeeRates>,
    /// Tier applied to accounts the limits source knows nothing about
    pub default_tier: FeeTierLevel,
    /// Decimal places fees are rounded to
    pub fee_scale: u32,
}

impl FeeSchedule {
    pub fn new(default_tier: FeeTierLevel, default_rates: FeeRates) -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(default_tier, default_rates);
        Self {
            tiers,
            default_tier,
            fee_scale: 8,
        }
    }

    pub fn with_tier(mut self, tier: FeeTierLevel, rates: FeeRates) -> Self {
        self.tiers.insert(tier, rates);
        self
    }

    pub fn with_fee_scale(mut self, fee_scale: u32) -> Self {
        self.fee_scale = fee_scale;
        self
    }

    /// Zero fees for every account
    pub fn zero() -> Self {
        Self::new(
            FeeTierLevel(0),
            FeeRates::new(Decimal::ZERO, Decimal::ZERO),
        )
    }

    /// Rates for `tier`, falling back to the default tier
    pub fn rates(&self, tier: FeeTierLevel) -> FeeRates {
        self.tiers
            .get(&tier)
            .or_else(|| self.tiers.get(&self.default_tier))
            .copied()
            .unwrap_or(FeeRates::new(Decimal::ZERO, Decimal::ZERO))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tiers.contains_key(&self.default_tier) {
            return Err(ConfigError::Invalid(format!(
                "default fee tier {} has no rates",
                self.default_tier
            )));
        }
        for (tier, rates) in &self.tiers {
            if rates.taker_rate < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{tier}: taker rate cannot be negative"
                )));
            }
            // A maker rebate larger than the taker fee would pay out more than it collects
            if rates.maker_rate + rates.taker_rate < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "{tier}: maker rebate exceeds taker fee"
                )));
            }
        }
        if self.fee_scale > 28 {
            return Err(ConfigError::Invalid("fee scale exceeds 28".to_string()));
        }
        Ok(())
    }
}

impl Default for FeeSchedule {
    /// Four volume tiers, the top one paying a maker rebate
    fn default() -> Self {
        Self::new(
            FeeTierLevel(0),
            FeeRates::new(Decimal::new(2, 4), Decimal::new(5, 4)),
        )
        .with_tier(
            FeeTierLevel(1),
            FeeRates::new(Decimal::new(15, 5), Decimal::new(45, 5)),
        )
        .with_tier(
            FeeTierLevel(2),
            FeeRates::new(Decimal::new(1, 4), Decimal::new(4, 4)),
        )
        .with_tier(
            FeeTierLevel(3),
            FeeRates::new(Decimal::new(-5, 5), Decimal::new(35, 5)),
        )
    }
}
