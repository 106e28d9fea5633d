// ============================================================================
// Pre-Trade Risk Service
// Runs every check in a fixed order; any failure rejects the order
// ============================================================================

use crate::domain::{
    AccountExposure, AccountRiskLimits, OrderIntent, PreTradeRiskAssessment, Quantity, RiskCheck,
    RiskCheckKind, Side, SymbolExposure, SymbolRiskLimits,
};
use crate::interfaces::Clock;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Inputs shared by all checks for one order
struct OrderContext<'a> {
    intent: &'a OrderIntent,
    /// Quantity signed by side, positive for buys
    signed_quantity: Quantity,
    /// Limit price times quantity, or reference price times quantity for
    /// market orders; `None` when neither price is known or the product is
    /// out of range
    value: Option<Decimal>,
}

/// Stateless evaluator; reads limits and exposure snapshots supplied by the
/// caller and never touches a book.
pub struct RiskService {
    clock: Arc<dyn Clock>,
}

impl RiskService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Evaluate every check. Warnings are recorded but do not block admission.
    pub fn assess(
        &self,
        intent: &OrderIntent,
        account_limits: &AccountRiskLimits,
        symbol_limits: &SymbolRiskLimits,
        account_exposure: &AccountExposure,
        symbol_exposure: &SymbolExposure,
    ) -> PreTradeRiskAssessment {
        let valuation_price = intent.price().or(symbol_exposure.last_trade_price);
        let order = OrderContext {
            intent,
            signed_quantity: match intent.side {
                Side::Buy => intent.quantity,
                Side::Sell => -intent.quantity,
            },
            value: valuation_price.and_then(|price| price.checked_mul(intent.quantity)),
        };

        let checks = vec![
            check_trading_enabled(symbol_limits),
            check_symbol_access(&order, account_limits),
            check_account_access(&order, symbol_limits),
            check_min_order_size(&order, symbol_limits),
            check_max_order_size(&order, symbol_limits),
            check_min_order_value(&order, symbol_limits),
            check_max_order_value(&order, symbol_limits),
            check_price_deviation(&order, symbol_limits, symbol_exposure),
            check_daily_order_count(account_limits, account_exposure),
            check_daily_volume(&order, account_limits, account_exposure),
            check_open_order_count(account_limits, account_exposure),
            check_position_size(&order, account_limits, account_exposure),
            check_position_value(&order, account_limits, account_exposure),
            check_leverage(&order, account_limits, account_exposure),
            check_margin_level(&order, account_limits, account_exposure),
        ];

        PreTradeRiskAssessment {
            order_id: intent.id,
            account_id: intent.account_id.clone(),
            symbol: intent.symbol.clone(),
            checks,
            assessed_at: self.clock.now(),
        }
    }
}

// ============================================================================
// Symbol and access checks
// ============================================================================

fn check_trading_enabled(limits: &SymbolRiskLimits) -> RiskCheck {
    if limits.trading_enabled {
        RiskCheck::passed(RiskCheckKind::SymbolTradingEnabled)
    } else {
        RiskCheck::failed(
            RiskCheckKind::SymbolTradingEnabled,
            "trading is disabled for this symbol",
        )
    }
}

fn check_symbol_access(order: &OrderContext<'_>, limits: &AccountRiskLimits) -> RiskCheck {
    let symbol = &order.intent.symbol;
    if limits.blocked_symbols.contains(symbol) {
        return RiskCheck::failed(
            RiskCheckKind::SymbolAccess,
            format!("{symbol} is blocked for this account"),
        );
    }
    if !limits.allowed_symbols.is_empty() && !limits.allowed_symbols.contains(symbol) {
        return RiskCheck::failed(
            RiskCheckKind::SymbolAccess,
            format!("{symbol} is not in the account's allowed symbols"),
        );
    }
    RiskCheck::passed(RiskCheckKind::SymbolAccess)
}

fn check_account_access(order: &OrderContext<'_>, limits: &SymbolRiskLimits) -> RiskCheck {
    let account = &order.intent.account_id;
    if limits.blocked_accounts.contains(account) {
        return RiskCheck::failed(
            RiskCheckKind::AccountSymbolAccess,
            format!("account {account} is blocked on this symbol"),
        );
    }
    if !limits.allowed_accounts.is_empty() && !limits.allowed_accounts.contains(account) {
        return RiskCheck::failed(
            RiskCheckKind::AccountSymbolAccess,
            format!("account {account} is not allowed on this symbol"),
        );
    }
    RiskCheck::passed(RiskCheckKind::AccountSymbolAccess)
}

// ============================================================================
// Order size and value
// ============================================================================

fn check_min_order_size(order: &OrderContext<'_>, limits: &SymbolRiskLimits) -> RiskCheck {
    let quantity = order.intent.quantity;
    match limits.min_order_size {
        Some(min) if quantity < min => {
            RiskCheck::failed(RiskCheckKind::MinOrderSize, "order size below minimum")
                .with_values(quantity, min)
        },
        Some(min) => RiskCheck::passed(RiskCheckKind::MinOrderSize).with_values(quantity, min),
        None => RiskCheck::passed(RiskCheckKind::MinOrderSize),
    }
}

fn check_max_order_size(order: &OrderContext<'_>, limits: &SymbolRiskLimits) -> RiskCheck {
    let quantity = order.intent.quantity;
    match limits.max_order_size {
        Some(max) if quantity > max => {
            RiskCheck::failed(RiskCheckKind::MaxOrderSize, "order size above maximum")
                .with_values(quantity, max)
        },
        Some(max) => RiskCheck::passed(RiskCheckKind::MaxOrderSize).with_values(quantity, max),
        None => RiskCheck::passed(RiskCheckKind::MaxOrderSize),
    }
}

fn check_min_order_value(order: &OrderContext<'_>, limits: &SymbolRiskLimits) -> RiskCheck {
    let kind = RiskCheckKind::MinOrderValue;
    match (limits.min_order_value, order.value) {
        (None, _) => RiskCheck::passed(kind),
        (Some(_), None) => unvalued(kind),
        (Some(min), Some(value)) if value < min => {
            RiskCheck::failed(kind, "order value below minimum").with_values(value, min)
        },
        (Some(min), Some(value)) => RiskCheck::passed(kind).with_values(value, min),
    }
}

fn check_max_order_value(order: &OrderContext<'_>, limits: &SymbolRiskLimits) -> RiskCheck {
    let kind = RiskCheckKind::MaxOrderValue;
    match (limits.max_order_value, order.value) {
        (None, _) => RiskCheck::passed(kind),
        (Some(_), None) => unvalued(kind),
        (Some(max), Some(value)) if value > max => {
            RiskCheck::failed(kind, "order value above maximum").with_values(value, max)
        },
        (Some(max), Some(value)) => RiskCheck::passed(kind).with_values(value, max),
    }
}

/// Relative distance of a limit price from the last trade price
fn check_price_deviation(
    order: &OrderContext<'_>,
    limits: &SymbolRiskLimits,
    exposure: &SymbolExposure,
) -> RiskCheck {
    let kind = RiskCheckKind::PriceDeviation;
    let (Some(price), Some(reference), Some(max)) = (
        order.intent.price(),
        exposure.last_trade_price,
        limits.max_price_deviation,
    ) else {
        return RiskCheck::passed(kind);
    };
    if reference <= Decimal::ZERO {
        return RiskCheck::passed(kind);
    }

    let Some(deviation) = (price - reference).abs().checked_div(reference) else {
        return out_of_range(kind);
    };
    if deviation > max {
        return RiskCheck::failed(
            kind,
            format!("price {price} deviates too far from reference {reference}"),
        )
        .with_values(deviation, max);
    }
    match limits.price_deviation_warning {
        Some(warning) if deviation > warning => RiskCheck::warning(
            kind,
            format!("price {price} is far from reference {reference}"),
        )
        .with_values(deviation, warning),
        _ => RiskCheck::passed(kind).with_values(deviation, max),
    }
}

// ============================================================================
// Activity caps
// ============================================================================

fn check_daily_order_count(limits: &AccountRiskLimits, exposure: &AccountExposure) -> RiskCheck {
    let kind = RiskCheckKind::DailyOrderCount;
    let Some(max) = limits.max_daily_orders else {
        return RiskCheck::passed(kind);
    };
    let projected = exposure.daily_order_count + 1;
    let check = if projected > max {
        RiskCheck::failed(kind, "daily order count limit reached")
    } else {
        RiskCheck::passed(kind)
    };
    check.with_values(Decimal::from(projected), Decimal::from(max))
}

fn check_daily_volume(
    order: &OrderContext<'_>,
    limits: &AccountRiskLimits,
    exposure: &AccountExposure,
) -> RiskCheck {
    let kind = RiskCheckKind::DailyVolume;
    let Some(max) = limits.max_daily_volume else {
        return RiskCheck::passed(kind);
    };
    let Some(projected) = exposure.daily_volume.checked_add(order.intent.quantity) else {
        return out_of_range(kind);
    };
    let check = if projected > max {
        RiskCheck::failed(kind, "daily volume limit exceeded")
    } else {
        RiskCheck::passed(kind)
    };
    check.with_values(projected, max)
}

fn check_open_order_count(limits: &AccountRiskLimits, exposure: &AccountExposure) -> RiskCheck {
    let kind = RiskCheckKind::OpenOrderCount;
    let Some(max) = limits.max_open_orders else {
        return RiskCheck::passed(kind);
    };
    let projected = exposure.open_order_count + 1;
    let check = if projected > max {
        RiskCheck::failed(kind, "open order limit reached")
    } else {
        RiskCheck::passed(kind)
    };
    check.with_values(Decimal::from(projected), Decimal::from(max))
}

// ============================================================================
// Position, leverage and margin (projected as if the order fills completely)
// ============================================================================

fn check_position_size(
    order: &OrderContext<'_>,
    limits: &AccountRiskLimits,
    exposure: &AccountExposure,
) -> RiskCheck {
    let kind = RiskCheckKind::PositionSize;
    let Some(max) = limits.max_position_size else {
        return RiskCheck::passed(kind);
    };
    let current = exposure.position(&order.intent.symbol).quantity;
    let Some(projected) = current.checked_add(order.signed_quantity).map(|q| q.abs()) else {
        return out_of_range(kind);
    };
    let check = if projected > max {
        RiskCheck::failed(kind, "projected position size exceeds limit")
    } else {
        RiskCheck::passed(kind)
    };
    check.with_values(projected, max)
}

fn check_position_value(
    order: &OrderContext<'_>,
    limits: &AccountRiskLimits,
    exposure: &AccountExposure,
) -> RiskCheck {
    let kind = RiskCheckKind::PositionValue;
    let Some(max) = limits.max_position_value else {
        return RiskCheck::passed(kind);
    };
    let Some(value) = order.value else {
        return unvalued(kind);
    };
    let signed_value = if order.signed_quantity.is_sign_negative() {
        -value
    } else {
        value
    };
    let Some(projected) = exposure
        .position(&order.intent.symbol)
        .value
        .checked_add(signed_value)
        .map(|v| v.abs())
    else {
        return out_of_range(kind);
    };
    let check = if projected > max {
        RiskCheck::failed(kind, "projected position value exceeds limit")
    } else {
        RiskCheck::passed(kind)
    };
    check.with_values(projected, max)
}

fn check_leverage(
    order: &OrderContext<'_>,
    limits: &AccountRiskLimits,
    exposure: &AccountExposure,
) -> RiskCheck {
    let kind = RiskCheckKind::Leverage;
    let Some(max) = limits.max_leverage else {
        return RiskCheck::passed(kind);
    };
    let Some(value) = order.value else {
        return unvalued(kind);
    };
    if exposure.equity <= Decimal::ZERO {
        return RiskCheck::failed(kind, "account has no equity").with_values(Decimal::ZERO, max);
    }

    let Some(leverage) = exposure
        .gross_position_value()
        .checked_add(value)
        .and_then(|gross| gross.checked_div(exposure.equity))
    else {
        return out_of_range(kind);
    };
    let check = if leverage > max {
        RiskCheck::failed(kind, "projected leverage exceeds limit")
    } else {
        RiskCheck::passed(kind)
    };
    check.with_values(leverage, max)
}

/// `equity / (margin_used + required)`, where the order requires
/// `value / max_leverage` of margin (its full value without a leverage cap)
fn check_margin_level(
    order: &OrderContext<'_>,
    limits: &AccountRiskLimits,
    exposure: &AccountExposure,
) -> RiskCheck {
    let kind = RiskCheckKind::MarginLevel;
    if limits.min_margin_level.is_none() && limits.margin_warning_level.is_none() {
        return RiskCheck::passed(kind);
    }
    let Some(value) = order.value else {
        return unvalued(kind);
    };

    let required = match limits.max_leverage {
        Some(leverage) if leverage > Decimal::ZERO => value / leverage,
        _ => value,
    };
    let Some(margin_after) = exposure.margin_used.checked_add(required) else {
        return out_of_range(kind);
    };
    if margin_after <= Decimal::ZERO {
        return RiskCheck::passed(kind);
    }
    let Some(margin_level) = exposure.equity.checked_div(margin_after) else {
        return out_of_range(kind);
    };

    if let Some(floor) = limits.min_margin_level {
        if margin_level < floor {
            return RiskCheck::failed(kind, "margin level would fall below the floor")
                .with_values(margin_level, floor);
        }
    }
    match limits.margin_warning_level {
        Some(warning) if margin_level < warning => {
            RiskCheck::warning(kind, "margin level approaching the floor")
                .with_values(margin_level, warning)
        },
        _ => RiskCheck::passed(kind),
    }
}

/// A value-based limit is configured but the order cannot be valued, so
/// its worst-case fill is unbounded
fn unvalued(kind: RiskCheckKind) -> RiskCheck {
    RiskCheck::failed(kind, "order cannot be valued against this limit")
}

fn out_of_range(kind: RiskCheckKind) -> RiskCheck {
    RiskCheck::failed(kind, "projection out of range")
}
