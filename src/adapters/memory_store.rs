// ============================================================================
// In-Memory Trade Store, Limits Source and Exposure Projection
// ============================================================================

use crate::domain::{
    AccountExposure, AccountId, AccountRiskLimits, FeeTierLevel, Order, PersistenceError,
    PositionExposure, Quantity, Side, Symbol, SymbolExposure, SymbolRiskLimits, Trade, TradeId,
};
use crate::interfaces::{ExposureProjection, LimitsSource, TradeStore};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Trade Store
// ============================================================================

/// Upsert store keyed by trade id. Writes can be switched off to exercise
/// the persistence failure path.
#[derive(Default)]
pub struct InMemoryTradeStore {
    trades: RwLock<HashMap<TradeId, Trade>>,
    unavailable: AtomicBool,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.trades.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.read().is_empty()
    }

    pub fn all(&self) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self.trades.read().values().cloned().collect();
        trades.sort_by_key(|t| t.created_at);
        trades
    }
}

impl TradeStore for InMemoryTradeStore {
    fn save(&self, trade: &Trade) -> Result<(), PersistenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "writes disabled".to_string(),
            ));
        }
        self.trades.write().insert(trade.id, trade.clone());
        Ok(())
    }

    fn load(&self, trade_id: TradeId) -> Result<Option<Trade>, PersistenceError> {
        Ok(self.trades.read().get(&trade_id).cloned())
    }
}

// ============================================================================
// Limits Source
// ============================================================================

/// Fixed limits with per-account and per-symbol overrides
pub struct StaticLimits {
    default_account: AccountRiskLimits,
    default_symbol: SymbolRiskLimits,
    accounts: RwLock<HashMap<AccountId, AccountRiskLimits>>,
    symbols: RwLock<HashMap<Symbol, SymbolRiskLimits>>,
    fee_tiers: RwLock<HashMap<AccountId, FeeTierLevel>>,
}

impl StaticLimits {
    pub fn new(default_account: AccountRiskLimits, default_symbol: SymbolRiskLimits) -> Self {
        Self {
            default_account,
            default_symbol,
            accounts: RwLock::new(HashMap::new()),
            symbols: RwLock::new(HashMap::new()),
            fee_tiers: RwLock::new(HashMap::new()),
        }
    }

    /// No account caps, every symbol open
    pub fn permissive() -> Self {
        Self::new(AccountRiskLimits::unrestricted(), SymbolRiskLimits::open())
    }

    pub fn set_account_limits(&self, account_id: impl Into<AccountId>, limits: AccountRiskLimits) {
        self.accounts.write().insert(account_id.into(), limits);
    }

    pub fn set_symbol_limits(&self, symbol: impl Into<Symbol>, limits: SymbolRiskLimits) {
        self.symbols.write().insert(symbol.into(), limits);
    }

    pub fn set_fee_tier(&self, account_id: impl Into<AccountId>, tier: FeeTierLevel) {
        self.fee_tiers.write().insert(account_id.into(), tier);
    }
}

impl Default for StaticLimits {
    fn default() -> Self {
        Self::permissive()
    }
}

impl LimitsSource for StaticLimits {
    fn account_limits(&self, account_id: &AccountId) -> AccountRiskLimits {
        self.accounts
            .read()
            .get(account_id)
            .cloned()
            .unwrap_or_else(|| self.default_account.clone())
    }

    fn symbol_limits(&self, symbol: &Symbol) -> SymbolRiskLimits {
        self.symbols
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.default_symbol.clone())
    }

    fn fee_tier(&self, account_id: &AccountId) -> Option<FeeTierLevel> {
        self.fee_tiers.read().get(account_id).copied()
    }
}

// ============================================================================
// Exposure Projection
// ============================================================================

/// Exposure maintained from admissions, closes and settled fills.
/// Daily counters accumulate at admission; positions move on settlement and
/// are marked at the symbol's last trade price.
#[derive(Default)]
pub struct InMemoryExposure {
    accounts: RwLock<HashMap<AccountId, AccountExposure>>,
    symbols: RwLock<HashMap<Symbol, SymbolExposure>>,
}

impl InMemoryExposure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account, e.g. with equity or a prior day's activity
    pub fn set_account_exposure(&self, account_id: impl Into<AccountId>, exposure: AccountExposure) {
        self.accounts.write().insert(account_id.into(), exposure);
    }

    pub fn set_symbol_exposure(&self, symbol: impl Into<Symbol>, exposure: SymbolExposure) {
        self.symbols.write().insert(symbol.into(), exposure);
    }
}

impl ExposureProjection for InMemoryExposure {
    fn account_exposure(&self, account_id: &AccountId) -> AccountExposure {
        self.accounts
            .read()
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    fn symbol_exposure(&self, symbol: &Symbol) -> SymbolExposure {
        self.symbols.read().get(symbol).cloned().unwrap_or_default()
    }

    fn record_admission(&self, order: &Order) {
        let mut accounts = self.accounts.write();
        let exposure = accounts.entry(order.account_id.clone()).or_default();
        exposure.daily_order_count += 1;
        exposure.daily_volume = exposure.daily_volume.saturating_add(order.quantity());
        exposure.open_order_count += 1;
    }

    fn record_order_closed(&self, account_id: &AccountId) {
        if let Some(exposure) = self.accounts.write().get_mut(account_id) {
            exposure.open_order_count = exposure.open_order_count.saturating_sub(1);
        }
    }

    fn record_fill(&self, trade: &Trade) {
        // Symbol lock before account lock, everywhere
        let mut symbols = self.symbols.write();
        let mut accounts = self.accounts.write();

        let mut long_change = Quantity::ZERO;
        for (account_id, side) in [
            (trade.buyer_account_id(), Side::Buy),
            (trade.seller_account_id(), Side::Sell),
        ] {
            let exposure = accounts.entry(account_id.clone()).or_default();
            let position = exposure.positions.entry(trade.symbol.clone()).or_default();
            let before = position.quantity;
            let after = match side {
                Side::Buy => before + trade.quantity,
                Side::Sell => before - trade.quantity,
            };
            *position = PositionExposure {
                quantity: after,
                value: after.saturating_mul(trade.price),
            };
            long_change += after.max(Decimal::ZERO) - before.max(Decimal::ZERO);
        }

        let symbol = symbols.entry(trade.symbol.clone()).or_default();
        symbol.last_trade_price = Some(trade.price);
        symbol.daily_volume = symbol.daily_volume.saturating_add(trade.quantity);
        symbol.open_interest += long_change;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderIntent};
    use chrono::Utc;

    fn trade(buyer: &str, seller: &str, price: i64, quantity: i64) -> Trade {
        Trade::new(
            Symbol::new("BTC-USD"),
            OrderId::new(),
            OrderId::new(),
            AccountId::new(seller),
            AccountId::new(buyer),
            Side::Sell,
            Decimal::from(price),
            Decimal::from(quantity),
            Utc::now(),
        )
    }

    #[test]
    fn test_trade_store_upsert_and_outage() {
        let store = InMemoryTradeStore::new();
        let mut trade = trade("b", "s", 100, 1);

        store.save(&trade).unwrap();
        trade.mark_settled(Utc::now());
        store.save(&trade).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(trade.id).unwrap(), Some(trade.clone()));

        store.set_unavailable(true);
        assert!(store.save(&trade).is_err());
    }

    #[test]
    fn test_static_limits_overrides() {
        let limits = StaticLimits::permissive();
        limits.set_account_limits(
            "capped",
            AccountRiskLimits::default().with_max_daily_orders(3),
        );
        limits.set_symbol_limits("ETH-USD", SymbolRiskLimits::halted());
        limits.set_fee_tier("capped", FeeTierLevel(2));

        assert_eq!(
            limits.account_limits(&AccountId::new("capped")).max_daily_orders,
            Some(3)
        );
        assert_eq!(limits.account_limits(&AccountId::new("other")).max_daily_orders, None);
        assert!(!limits.symbol_limits(&Symbol::new("ETH-USD")).trading_enabled);
        assert!(limits.symbol_limits(&Symbol::new("BTC-USD")).trading_enabled);
        assert_eq!(limits.fee_tier(&AccountId::new("capped")), Some(FeeTierLevel(2)));
    }

    #[test]
    fn test_admission_and_close_counters() {
        let exposure = InMemoryExposure::new();
        let intent = OrderIntent::limit("a", "BTC-USD", Side::Buy, Decimal::from(100), Decimal::from(5));
        let order = Order::admit(intent, Utc::now());

        exposure.record_admission(&order);
        let snapshot = exposure.account_exposure(&AccountId::new("a"));
        assert_eq!(snapshot.daily_order_count, 1);
        assert_eq!(snapshot.daily_volume, Decimal::from(5));
        assert_eq!(snapshot.open_order_count, 1);

        exposure.record_order_closed(&AccountId::new("a"));
        exposure.record_order_closed(&AccountId::new("a"));
        assert_eq!(exposure.account_exposure(&AccountId::new("a")).open_order_count, 0);
    }

    #[test]
    fn test_fill_moves_positions_and_symbol_stats() {
        let exposure = InMemoryExposure::new();
        exposure.record_fill(&trade("buyer", "seller", 100, 2));
        exposure.record_fill(&trade("seller", "buyer", 110, 1));

        let symbol = Symbol::new("BTC-USD");
        let buyer = exposure.account_exposure(&AccountId::new("buyer"));
        assert_eq!(buyer.position(&symbol).quantity, Decimal::ONE);
        assert_eq!(buyer.position(&symbol).value, Decimal::from(110));

        let seller = exposure.account_exposure(&AccountId::new("seller"));
        assert_eq!(seller.position(&symbol).quantity, Decimal::NEGATIVE_ONE);

        let stats = exposure.symbol_exposure(&symbol);
        assert_eq!(stats.last_trade_price, Some(Decimal::from(110)));
        assert_eq!(stats.daily_volume, Decimal::from(3));
        assert_eq!(stats.open_interest, Decimal::ONE);
    }
}
