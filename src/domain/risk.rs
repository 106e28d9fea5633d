// ============================================================================
// Pre-Trade Risk Model
// Limits, exposure snapshots and the per-order assessment record
// ============================================================================

use super::{AccountId, OrderId, Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Checks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RiskCheckStatus {
    Passed,
    Failed,
    /// Recorded for audit, does not block admission
    Warning,
}

/// Checks in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RiskCheckKind {
    SymbolTradingEnabled,
    SymbolAccess,
    AccountSymbolAccess,
    MinOrderSize,
    MaxOrderSize,
    MinOrderValue,
    MaxOrderValue,
    PriceDeviation,
    DailyOrderCount,
    DailyVolume,
    OpenOrderCount,
    PositionSize,
    PositionValue,
    Leverage,
    MarginLevel,
}

impl RiskCheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCheckKind::SymbolTradingEnabled => "symbol_trading_enabled",
            RiskCheckKind::SymbolAccess => "symbol_access",
            RiskCheckKind::AccountSymbolAccess => "account_symbol_access",
            RiskCheckKind::MinOrderSize => "min_order_size",
            RiskCheckKind::MaxOrderSize => "max_order_size",
            RiskCheckKind::MinOrderValue => "min_order_value",
            RiskCheckKind::MaxOrderValue => "max_order_value",
            RiskCheckKind::PriceDeviation => "price_deviation",
            RiskCheckKind::DailyOrderCount => "daily_order_count",
            RiskCheckKind::DailyVolume => "daily_volume",
            RiskCheckKind::OpenOrderCount => "open_order_count",
            RiskCheckKind::PositionSize => "position_size",
            RiskCheckKind::PositionValue => "position_value",
            RiskCheckKind::Leverage => "leverage",
            RiskCheckKind::MarginLevel => "margin_level",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RiskCheck {
    pub kind: RiskCheckKind,
    pub status: RiskCheckStatus,
    /// Observed or projected value, when the check is numeric
    pub value: Option<Decimal>,
    pub limit: Option<Decimal>,
    pub message: Option<String>,
}

impl RiskCheck {
    pub fn passed(kind: RiskCheckKind) -> Self {
        Self {
            kind,
            status: RiskCheckStatus::Passed,
            value: None,
            limit: None,
            message: None,
        }
    }

    pub fn failed(kind: RiskCheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: RiskCheckStatus::Failed,
            value: None,
            limit: None,
            message: Some(message.into()),
        }
    }

    pub fn warning(kind: RiskCheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: RiskCheckStatus::Warning,
            value: None,
            limit: None,
            message: Some(message.into()),
        }
    }

    pub fn with_values(mut self, value: Decimal, limit: Decimal) -> Self {
        self.value = Some(value);
        self.limit = Some(limit);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == RiskCheckStatus::Failed
    }
}

/// Outcome of running every check for one admission attempt
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PreTradeRiskAssessment {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub checks: Vec<RiskCheck>,
    pub assessed_at: DateTime<Utc>,
}

impl PreTradeRiskAssessment {
    pub fn is_admitted(&self) -> bool {
        !self.checks.iter().any(RiskCheck::is_failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RiskCheck> {
        self.checks.iter().filter(|c| c.status == RiskCheckStatus::Failed)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RiskCheck> {
        self.checks
            .iter()
            .filter(|c| c.status == RiskCheckStatus::Warning)
    }

    pub fn check(&self, kind: RiskCheckKind) -> Option<&RiskCheck> {
        self.checks.iter().find(|c| c.kind == kind)
    }
}

// ============================================================================
// Limits
// ============================================================================

/// Per-account limits; `None` disables the corresponding check
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccountRiskLimits {
    pub max_daily_orders: Option<u64>,
    /// Daily traded quantity cap, summed across symbols
    pub max_daily_volume: Option<Quantity>,
    pub max_open_orders: Option<u64>,
    pub max_position_size: Option<Quantity>,
    pub max_position_value: Option<Decimal>,
    pub max_leverage: Option<Decimal>,
    /// Margin level below which the order is rejected
    pub min_margin_level: Option<Decimal>,
    /// Margin level below which a warning is recorded
    pub margin_warning_level: Option<Decimal>,
    /// When non-empty, only these symbols may be traded
    pub allowed_symbols: HashSet<Symbol>,
    pub blocked_symbols: HashSet<Symbol>,
}

impl AccountRiskLimits {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_max_daily_orders(mut self, limit: u64) -> Self {
        self.max_daily_orders = Some(limit);
        self
    }

    pub fn with_max_daily_volume(mut self, limit: Quantity) -> Self {
        self.max_daily_volume = Some(limit);
        self
    }

    pub fn with_max_open_orders(mut self, limit: u64) -> Self {
        self.max_open_orders = Some(limit);
        self
    }

    pub fn with_max_position_size(mut self, limit: Quantity) -> Self {
        self.max_position_size = Some(limit);
        self
    }

    pub fn with_max_position_value(mut self, limit: Decimal) -> Self {
        self.max_position_value = Some(limit);
        self
    }

    pub fn with_max_leverage(mut self, limit: Decimal) -> Self {
        self.max_leverage = Some(limit);
        self
    }

    pub fn with_margin_levels(mut self, minimum: Decimal, warning: Decimal) -> Self {
        self.min_margin_level = Some(minimum);
        self.margin_warning_level = Some(warning);
        self
    }

    pub fn allow_symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.allowed_symbols.insert(symbol.into());
        self
    }

    pub fn block_symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.blocked_symbols.insert(symbol.into());
        self
    }
}

/// Per-symbol limits, admin managed
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymbolRiskLimits {
    pub trading_enabled: bool,
    pub min_order_size: Option<Quantity>,
    pub max_order_size: Option<Quantity>,
    pub min_order_value: Option<Decimal>,
    pub max_order_value: Option<Decimal>,
    /// Maximum relative distance from the reference price, e.g. 0.1 for 10%
    pub max_price_deviation: Option<Decimal>,
    pub price_deviation_warning: Option<Decimal>,
    /// When non-empty, only these accounts may trade the symbol
    pub allowed_accounts: HashSet<AccountId>,
    pub blocked_accounts: HashSet<AccountId>,
}

impl SymbolRiskLimits {
    /// Trading enabled with no bounds
    pub fn open() -> Self {
        Self {
            trading_enabled: true,
            min_order_size: None,
            max_order_size: None,
            min_order_value: None,
            max_order_value: None,
            max_price_deviation: None,
            price_deviation_warning: None,
            allowed_accounts: HashSet::new(),
            blocked_accounts: HashSet::new(),
        }
    }

    pub fn halted() -> Self {
        Self {
            trading_enabled: false,
            ..Self::open()
        }
    }

    pub fn with_order_size(mut self, min: Quantity, max: Quantity) -> Self {
        self.min_order_size = Some(min);
        self.max_order_size = Some(max);
        self
    }

    pub fn with_order_value(mut self, min: Decimal, max: Decimal) -> Self {
        self.min_order_value = Some(min);
        self.max_order_value = Some(max);
        self
    }

    pub fn with_price_deviation(mut self, max: Decimal, warning: Decimal) -> Self {
        self.max_price_deviation = Some(max);
        self.price_deviation_warning = Some(warning);
        self
    }

    pub fn allow_account(mut self, account: impl Into<AccountId>) -> Self {
        self.allowed_accounts.insert(account.into());
        self
    }

    pub fn block_account(mut self, account: impl Into<AccountId>) -> Self {
        self.blocked_accounts.insert(account.into());
        self
    }
}

impl Default for SymbolRiskLimits {
    fn default() -> Self {
        Self::open()
    }
}

// ============================================================================
// Exposure Snapshots
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionExposure {
    /// Signed net quantity, positive when long
    pub quantity: Quantity,
    /// Signed position value at the last trade price
    pub value: Decimal,
}

/// Maintained projection of an account's activity and positions
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccountExposure {
    pub daily_order_count: u64,
    pub daily_volume: Quantity,
    pub open_order_count: u64,
    pub positions: HashMap<Symbol, PositionExposure>,
    pub equity: Decimal,
    pub margin_used: Decimal,
}

impl AccountExposure {
    pub fn position(&self, symbol: &Symbol) -> PositionExposure {
        self.positions.get(symbol).cloned().unwrap_or_default()
    }

    /// Sum of absolute position values across symbols
    pub fn gross_position_value(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::ZERO, |gross, p| gross.saturating_add(p.value.abs()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymbolExposure {
    /// Reference price for deviation checks and market order valuation
    pub last_trade_price: Option<Price>,
    pub open_interest: Quantity,
    pub daily_volume: Quantity,
}
