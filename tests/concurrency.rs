//! Threaded tests for per-account admission, ledger lock ordering,
//! independent symbols and cancels racing matches.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use venue_core::domain::{AccountExposure, BookError, Order, RiskCheckKind, SymbolExposure};
use venue_core::engine::balance_deltas;
use venue_core::interfaces::{ExposureProjection, Ledger};
use venue_core::prelude::*;

const SYMBOL: &str = "BTC-USD";

/// Exposure projection that stalls reads, widening any window between a
/// risk assessment and the exposure update that follows it
struct SlowExposure {
    inner: InMemoryExposure,
    delay: Duration,
}

impl ExposureProjection for SlowExposure {
    fn account_exposure(&self, account_id: &AccountId) -> AccountExposure {
        let exposure = self.inner.account_exposure(account_id);
        thread::sleep(self.delay);
        exposure
    }

    fn symbol_exposure(&self, symbol: &Symbol) -> SymbolExposure {
        self.inner.symbol_exposure(symbol)
    }

    fn record_admission(&self, order: &Order) {
        self.inner.record_admission(order)
    }

    fn record_order_closed(&self, account_id: &AccountId) {
        self.inner.record_order_closed(account_id)
    }

    fn record_fill(&self, trade: &Trade) {
        self.inner.record_fill(trade)
    }
}

fn zero_fee_config() -> VenueConfig {
    VenueConfig::new(FeeSchedule::zero())
}

#[test]
fn concurrent_orders_from_one_account_share_the_daily_volume_cap() {
    let limits = Arc::new(StaticLimits::permissive());
    limits.set_account_limits(
        "x",
        AccountRiskLimits::default().with_max_daily_volume(dec!(1000)),
    );
    let exposure = Arc::new(SlowExposure {
        inner: InMemoryExposure::new(),
        delay: Duration::from_millis(20),
    });
    exposure.inner.set_account_exposure(
        "x",
        AccountExposure {
            daily_volume: dec!(990),
            ..Default::default()
        },
    );

    let context = EngineContext::builder()
        .with_config(zero_fee_config().with_admission_holds(false))
        .with_limits(limits)
        .with_exposure(exposure.clone())
        .build()
        .unwrap();

    let barrier = &Barrier::new(2);
    let context = &context;
    let results: Vec<Result<SubmitReport, VenueError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(move || {
                    barrier.wait();
                    context.submit_order(OrderIntent::limit(
                        "x",
                        SYMBOL,
                        Side::Buy,
                        dec!(100),
                        dec!(10),
                    ))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 1);

    let rejected = results.iter().find_map(|r| match r {
        Err(VenueError::RiskRejected(assessment)) => Some(assessment),
        _ => None,
    });
    let check = rejected
        .and_then(|assessment| assessment.check(RiskCheckKind::DailyVolume))
        .unwrap();
    assert_eq!(check.value, Some(dec!(1010)));

    let after = exposure.inner.account_exposure(&AccountId::new("x"));
    assert_eq!(after.daily_volume, dec!(1000));
}

#[test]
fn maker_assessment_sees_fill_settled_in_background() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.deposit(&AccountId::new("maker"), "BTC", dec!(100));
    ledger.deposit(&AccountId::new("taker"), "USD", dec!(100_000));
    let limits = Arc::new(StaticLimits::permissive());
    limits.set_account_limits(
        "maker",
        AccountRiskLimits::default().with_max_position_size(dec!(10)),
    );

    let context = EngineContext::builder()
        .with_config(zero_fee_config().with_settlement_mode(SettlementMode::Background))
        .with_ledger(ledger)
        .with_limits(limits)
        .build()
        .unwrap();

    context
        .submit_order(OrderIntent::limit("maker", SYMBOL, Side::Sell, dec!(100), dec!(10)))
        .unwrap();

    let report = context
        .submit_order(OrderIntent::limit("taker", SYMBOL, Side::Buy, dec!(100), dec!(10)))
        .unwrap();
    assert!(report.settlements.is_empty());

    // Short 10 after the fill; one more would breach the position cap
    let err = context
        .submit_order(OrderIntent::limit("maker", SYMBOL, Side::Sell, dec!(100), dec!(1)))
        .unwrap_err();
    let VenueError::RiskRejected(assessment) = err else {
        panic!("expected a risk rejection");
    };
    assert_eq!(
        assessment.check(RiskCheckKind::PositionSize).unwrap().value,
        Some(dec!(11))
    );
}

#[test]
fn opposite_role_settlements_between_two_accounts_do_not_deadlock() {
    let ledger = Arc::new(InMemoryLedger::new());
    for account in ["a", "b"] {
        let account = AccountId::new(account);
        ledger.deposit(&account, "BTC", dec!(1000));
        ledger.deposit(&account, "USD", dec!(1_000_000));
    }

    thread::scope(|scope| {
        for (maker, taker) in [("a", "b"), ("b", "a")] {
            let ledger = Arc::clone(&ledger);
            scope.spawn(move || {
                for _ in 0..500 {
                    let trade = Trade::new(
                        Symbol::new(SYMBOL),
                        OrderId::new(),
                        OrderId::new(),
                        AccountId::new(maker),
                        AccountId::new(taker),
                        Side::Sell,
                        dec!(100),
                        dec!(1),
                        chrono::Utc::now(),
                    );
                    let (maker_delta, taker_delta) = balance_deltas(&trade).unwrap();
                    ledger
                        .apply_trade_settlement(&trade, &maker_delta, &taker_delta)
                        .unwrap();
                }
            });
        }
    });

    // Each side sold 500 and bought 500 at the same price
    for account in ["a", "b"] {
        let account = AccountId::new(account);
        assert_eq!(ledger.balance(&account, "BTC").total(), dec!(1000));
        assert_eq!(ledger.balance(&account, "USD").total(), dec!(1_000_000));
    }
    assert_eq!(ledger.applied_trades(), 1000);
}

#[test]
fn symbols_match_in_parallel() {
    const SYMBOLS: usize = 4;
    const ROUNDS: i64 = 50;

    let ledger = Arc::new(InMemoryLedger::new());
    for i in 0..SYMBOLS {
        ledger.deposit(&AccountId::new(format!("maker-{i}")), &format!("S{i}"), dec!(1000));
        ledger.deposit(&AccountId::new(format!("taker-{i}")), "USD", dec!(1_000_000));
    }
    let context = EngineContext::builder()
        .with_config(zero_fee_config())
        .with_ledger(ledger.clone())
        .build()
        .unwrap();

    let barrier = Barrier::new(SYMBOLS);
    thread::scope(|scope| {
        for i in 0..SYMBOLS {
            let context = &context;
            let barrier = &barrier;
            scope.spawn(move || {
                let symbol = format!("S{i}-USD");
                barrier.wait();
                for _ in 0..ROUNDS {
                    context
                        .submit_order(OrderIntent::limit(
                            format!("maker-{i}"),
                            symbol.as_str(),
                            Side::Sell,
                            dec!(100),
                            dec!(1),
                        ))
                        .unwrap();
                    let report = context
                        .submit_order(OrderIntent::limit(
                            format!("taker-{i}"),
                            symbol.as_str(),
                            Side::Buy,
                            dec!(100),
                            dec!(1),
                        ))
                        .unwrap();
                    assert_eq!(report.trades().len(), 1);
                    assert!(report.all_settled());
                }
            });
        }
    });

    let stats = context.stats();
    assert_eq!(stats.books.len(), SYMBOLS);
    assert_eq!(stats.total_resting_orders, 0);
    assert!(stats.books.iter().all(|b| b.trades_executed == ROUNDS as u64));
    for i in 0..SYMBOLS {
        let taker = AccountId::new(format!("taker-{i}"));
        assert_eq!(
            ledger.balance(&taker, &format!("S{i}")).available,
            Decimal::from(ROUNDS)
        );
        assert_eq!(
            ledger.balance(&taker, "USD").available,
            dec!(1_000_000) - Decimal::from(ROUNDS * 100)
        );
    }
}

#[test]
fn cancel_racing_a_match_resolves_to_exactly_one_outcome() {
    let ledger = Arc::new(InMemoryLedger::new());
    let maker = AccountId::new("maker");
    let taker = AccountId::new("taker");
    ledger.deposit(&maker, "BTC", dec!(1000));
    ledger.deposit(&taker, "USD", dec!(1_000_000));
    let context = EngineContext::builder()
        .with_config(zero_fee_config())
        .with_ledger(ledger.clone())
        .build()
        .unwrap();
    let symbol = Symbol::new(SYMBOL);

    let mut filled = Decimal::ZERO;
    for _ in 0..50 {
        let ask = context
            .submit_order(OrderIntent::limit("maker", SYMBOL, Side::Sell, dec!(100), dec!(1)))
            .unwrap()
            .match_result
            .order
            .id;

        let barrier = Barrier::new(2);
        let (cancelled, bid) = thread::scope(|scope| {
            let cancel = scope.spawn(|| {
                barrier.wait();
                context.cancel_order(&symbol, ask)
            });
            let bid = scope.spawn(|| {
                barrier.wait();
                context.submit_order(OrderIntent::limit(
                    "taker",
                    SYMBOL,
                    Side::Buy,
                    dec!(100),
                    dec!(1),
                ))
            });
            (cancel.join().unwrap(), bid.join().unwrap().unwrap())
        });

        match cancelled {
            Ok(result) => {
                assert_eq!(result.order.remaining_quantity(), dec!(1));
                assert!(bid.trades().is_empty());
                // Clear the resting bid so the next ask starts on an empty book
                context
                    .cancel_order(&symbol, bid.match_result.order.id)
                    .unwrap();
            },
            Err(VenueError::Book(BookError::OrderNotFound(id))) => {
                assert_eq!(id, ask);
                assert_eq!(bid.trades().len(), 1);
                assert_eq!(bid.trades()[0].maker_order_id, ask);
                filled += dec!(1);
            },
            Err(other) => panic!("unexpected cancel error: {other}"),
        }
    }

    let snapshot = context.snapshot(&symbol, None).unwrap();
    assert!(snapshot.bids.is_empty() && snapshot.asks.is_empty());

    assert_eq!(ledger.balance(&maker, "BTC").held, Decimal::ZERO);
    assert_eq!(ledger.balance(&maker, "BTC").available, dec!(1000) - filled);
    assert_eq!(ledger.balance(&taker, "BTC").available, filled);
    assert_eq!(ledger.balance(&taker, "USD").held, Decimal::ZERO);
}
