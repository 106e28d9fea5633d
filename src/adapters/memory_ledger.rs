// ============================================================================
// In-Memory Ledger
// Per-account balances and order holds with idempotent trade settlement
// ============================================================================

use crate::domain::{AccountId, LedgerError, OrderId, Trade, TradeId};
use crate::interfaces::{BalanceDelta, FundsHold, Ledger, SettlementReceipt};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetBalance {
    pub available: Decimal,
    pub held: Decimal,
}

impl AssetBalance {
    pub fn total(&self) -> Decimal {
        self.available + self.held
    }
}

#[derive(Debug, Clone)]
struct Hold {
    asset: String,
    remaining: Decimal,
}

#[derive(Debug, Clone, Default)]
struct AccountBook {
    balances: HashMap<String, AssetBalance>,
    holds: HashMap<OrderId, Hold>,
}

impl AccountBook {
    /// Debits draw on the order's hold first, then on available balance
    fn apply(&mut self, delta: &BalanceDelta) -> Result<(), LedgerError> {
        let account_id = &delta.account_id;
        self.apply_asset(account_id, delta.order_id, &delta.base_asset, delta.base)?;
        self.apply_asset(account_id, delta.order_id, &delta.quote_asset, delta.quote)
    }

    /// Copy with every delta applied, or the first failure
    fn staged(&self, deltas: &[&BalanceDelta]) -> Result<AccountBook, LedgerError> {
        let mut copy = self.clone();
        for delta in deltas {
            copy.apply(delta)?;
        }
        Ok(copy)
    }

    fn apply_asset(
        &mut self,
        account_id: &AccountId,
        order_id: OrderId,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let balance = self.balances.entry(asset.to_string()).or_default();
        if amount >= Decimal::ZERO {
            balance.available = balance.available.checked_add(amount).ok_or_else(|| {
                LedgerError::AmountOverflow {
                    asset: asset.to_string(),
                }
            })?;
            return Ok(());
        }

        let mut debit = -amount;
        if let Some(hold) = self
            .holds
            .get_mut(&order_id)
            .filter(|hold| hold.asset == asset)
        {
            let from_hold = hold.remaining.min(debit);
            hold.remaining -= from_hold;
            balance.held -= from_hold;
            debit -= from_hold;
        }

        if balance.available < debit {
            return Err(LedgerError::InsufficientFunds {
                account_id: account_id.clone(),
                asset: asset.to_string(),
                required: debit,
                available: balance.available,
            });
        }
        balance.available -= debit;
        Ok(())
    }
}

/// Reference ledger used by tests and demos. Settlement locks both accounts
/// in account id order, stages the changes on copies and commits only when
/// both deltas apply.
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountBook>>>>,
    applied: Mutex<HashSet<TradeId>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, account_id: &AccountId, asset: &str, amount: Decimal) {
        let account = self.account(account_id);
        let mut book = account.lock();
        book.balances.entry(asset.to_string()).or_default().available += amount;
    }

    pub fn balance(&self, account_id: &AccountId, asset: &str) -> AssetBalance {
        self.accounts
            .read()
            .get(account_id)
            .and_then(|account| account.lock().balances.get(asset).copied())
            .unwrap_or_default()
    }

    /// Unconsumed part of an order's hold
    pub fn held_for(&self, account_id: &AccountId, order_id: OrderId) -> Decimal {
        self.accounts
            .read()
            .get(account_id)
            .and_then(|account| account.lock().holds.get(&order_id).map(|h| h.remaining))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn applied_trades(&self) -> usize {
        self.applied.lock().len()
    }

    fn account(&self, account_id: &AccountId) -> Arc<Mutex<AccountBook>> {
        if let Some(account) = self.accounts.read().get(account_id) {
            return Arc::clone(account);
        }
        Arc::clone(
            self.accounts
                .write()
                .entry(account_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(AccountBook::default()))),
        )
    }
}

impl Ledger for InMemoryLedger {
    fn hold_funds(&self, hold: FundsHold) -> Result<(), LedgerError> {
        let account = self.account(&hold.account_id);
        let mut book = account.lock();

        if book.holds.contains_key(&hold.order_id) {
            return Err(LedgerError::DuplicateHold(hold.order_id));
        }
        let balance = book.balances.entry(hold.asset.clone()).or_default();
        if balance.available < hold.amount {
            return Err(LedgerError::InsufficientFunds {
                account_id: hold.account_id.clone(),
                asset: hold.asset.clone(),
                required: hold.amount,
                available: balance.available,
            });
        }
        balance.available -= hold.amount;
        balance.held += hold.amount;
        book.holds.insert(
            hold.order_id,
            Hold {
                asset: hold.asset,
                remaining: hold.amount,
            },
        );
        Ok(())
    }

    fn release_funds(
        &self,
        account_id: &AccountId,
        order_id: OrderId,
    ) -> Result<Decimal, LedgerError> {
        let account = self.account(account_id);
        let mut book = account.lock();

        let Some(hold) = book.holds.remove(&order_id) else {
            return Ok(Decimal::ZERO);
        };
        let balance = book.balances.entry(hold.asset).or_default();
        balance.held -= hold.remaining;
        balance.available += hold.remaining;
        Ok(hold.remaining)
    }

    fn apply_trade_settlement(
        &self,
        trade: &Trade,
        maker: &BalanceDelta,
        taker: &BalanceDelta,
    ) -> Result<SettlementReceipt, LedgerError> {
        if maker.account_id == taker.account_id {
            let account = self.account(&maker.account_id);
            let mut book = account.lock();

            let mut applied = self.applied.lock();
            if applied.contains(&trade.id) {
                return Ok(SettlementReceipt::AlreadyApplied);
            }
            *book = book.staged(&[maker, taker])?;
            applied.insert(trade.id);
            return Ok(SettlementReceipt::Applied);
        }

        // Fixed global lock order: by account id
        let (first, second) = if maker.account_id < taker.account_id {
            (maker, taker)
        } else {
            (taker, maker)
        };
        let first_account = self.account(&first.account_id);
        let second_account = self.account(&second.account_id);
        let mut first_book = first_account.lock();
        let mut second_book = second_account.lock();

        let mut applied = self.applied.lock();
        if applied.contains(&trade.id) {
            return Ok(SettlementReceipt::AlreadyApplied);
        }
        let first_staged = first_book.staged(&[first])?;
        let second_staged = second_book.staged(&[second])?;

        *first_book = first_staged;
        *second_book = second_staged;
        applied.insert(trade.id);
        Ok(SettlementReceipt::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Side, Symbol};
    use chrono::Utc;

    fn account(id: &str) -> AccountId {
        AccountId::new(id)
    }

    fn trade(maker: &str, taker: &str) -> Trade {
        Trade::new(
            Symbol::new("BTC-USD"),
            OrderId::new(),
            OrderId::new(),
            account(maker),
            account(taker),
            Side::Sell,
            Decimal::from(100),
            Decimal::ONE,
            Utc::now(),
        )
    }

    fn deltas(trade: &Trade) -> (BalanceDelta, BalanceDelta) {
        crate::engine::balance_deltas(trade).unwrap()
    }

    #[test]
    fn test_hold_and_release() {
        let ledger = InMemoryLedger::new();
        let alice = account("alice");
        let order_id = OrderId::new();
        ledger.deposit(&alice, "USD", Decimal::from(500));

        ledger
            .hold_funds(FundsHold {
                account_id: alice.clone(),
                order_id,
                asset: "USD".to_string(),
                amount: Decimal::from(200),
            })
            .unwrap();
        assert_eq!(
            ledger.balance(&alice, "USD"),
            AssetBalance {
                available: Decimal::from(300),
                held: Decimal::from(200)
            }
        );

        assert_eq!(
            ledger.release_funds(&alice, order_id).unwrap(),
            Decimal::from(200)
        );
        assert_eq!(ledger.balance(&alice, "USD").available, Decimal::from(500));
        assert_eq!(ledger.release_funds(&alice, order_id).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_hold_rejects_insufficient_and_duplicate() {
        let ledger = InMemoryLedger::new();
        let alice = account("alice");
        let order_id = OrderId::new();
        ledger.deposit(&alice, "BTC", Decimal::ONE);

        let hold = FundsHold {
            account_id: alice.clone(),
            order_id,
            asset: "BTC".to_string(),
            amount: Decimal::from(2),
        };
        assert!(matches!(
            ledger.hold_funds(hold.clone()),
            Err(LedgerError::InsufficientFunds { .. })
        ));

        let smaller = FundsHold {
            amount: Decimal::ONE,
            ..hold
        };
        ledger.hold_funds(smaller.clone()).unwrap();
        assert_eq!(
            ledger.hold_funds(smaller),
            Err(LedgerError::DuplicateHold(order_id))
        );
    }

    #[test]
    fn test_settlement_is_idempotent() {
        let ledger = InMemoryLedger::new();
        ledger.deposit(&account("seller"), "BTC", Decimal::ONE);
        ledger.deposit(&account("buyer"), "USD", Decimal::from(100));

        let trade = trade("seller", "buyer");
        let (maker, taker) = deltas(&trade);

        assert_eq!(
            ledger.apply_trade_settlement(&trade, &maker, &taker),
            Ok(SettlementReceipt::Applied)
        );
        assert_eq!(
            ledger.apply_trade_settlement(&trade, &maker, &taker),
            Ok(SettlementReceipt::AlreadyApplied)
        );

        assert_eq!(ledger.balance(&account("buyer"), "BTC").available, Decimal::ONE);
        assert_eq!(ledger.balance(&account("buyer"), "USD").available, Decimal::ZERO);
        assert_eq!(
            ledger.balance(&account("seller"), "USD").available,
            Decimal::from(100)
        );
        assert_eq!(ledger.applied_trades(), 1);
    }

    #[test]
    fn test_failed_settlement_changes_nothing() {
        let ledger = InMemoryLedger::new();
        ledger.deposit(&account("seller"), "BTC", Decimal::ONE);
        ledger.deposit(&account("buyer"), "USD", Decimal::from(50));

        let trade = trade("seller", "buyer");
        let (maker, taker) = deltas(&trade);

        assert!(matches!(
            ledger.apply_trade_settlement(&trade, &maker, &taker),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(ledger.balance(&account("seller"), "BTC").available, Decimal::ONE);
        assert_eq!(ledger.balance(&account("seller"), "USD").available, Decimal::ZERO);
        assert_eq!(ledger.applied_trades(), 0);
    }

    #[test]
    fn test_settlement_consumes_hold_first() {
        let ledger = InMemoryLedger::new();
        let seller = account("seller");
        ledger.deposit(&seller, "BTC", Decimal::from(3));
        ledger.deposit(&account("buyer"), "USD", Decimal::from(100));

        let trade = trade("seller", "buyer");
        ledger
            .hold_funds(FundsHold {
                account_id: seller.clone(),
                order_id: trade.maker_order_id,
                asset: "BTC".to_string(),
                amount: Decimal::from(2),
            })
            .unwrap();

        let (maker, taker) = deltas(&trade);
        ledger.apply_trade_settlement(&trade, &maker, &taker).unwrap();

        assert_eq!(
            ledger.balance(&seller, "BTC"),
            AssetBalance {
                available: Decimal::ONE,
                held: Decimal::ONE
            }
        );
        assert_eq!(ledger.held_for(&seller, trade.maker_order_id), Decimal::ONE);
    }
}
