//! Property-based tests for the matching invariants.
//!
//! Random order flow is pushed through a single engine and the book is
//! checked after every submit.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use venue_core::prelude::*;

const SYMBOL: &str = "ETH-USD";

#[derive(Debug, Clone)]
struct Flow {
    account: u8,
    side: Side,
    /// `None` for a market order
    price: Option<i64>,
    quantity: i64,
}

fn flow_strategy() -> impl Strategy<Value = Flow> {
    (
        0u8..4,
        prop_oneof![Just(Side::Buy), Just(Side::Sell)],
        prop::option::weighted(0.85, 95i64..=105),
        1i64..=10,
    )
        .prop_map(|(account, side, price, quantity)| Flow {
            account,
            side,
            price,
            quantity,
        })
}

fn engine(policy: SelfTradePolicy) -> MatchingEngine {
    MatchingEngine::new(
        Symbol::new(SYMBOL),
        Box::new(PriceTimePriority::new(policy)),
        Arc::new(NoOpEventSink),
        Arc::new(SystemClock),
    )
}

fn admit(flow: &Flow) -> Order {
    let account = format!("acct-{}", flow.account);
    let quantity = Decimal::from(flow.quantity);
    let intent = match flow.price {
        Some(price) => OrderIntent::limit(account, SYMBOL, flow.side, Decimal::from(price), quantity),
        None => OrderIntent::market(account, SYMBOL, flow.side, quantity),
    };
    Order::admit(intent, chrono::Utc::now())
}

fn policy_strategy() -> impl Strategy<Value = SelfTradePolicy> {
    prop_oneof![
        Just(SelfTradePolicy::SkipMaker),
        Just(SelfTradePolicy::CancelTaker)
    ]
}

proptest! {
    /// The best bid stays strictly below the best ask after every submit
    #[test]
    fn book_never_crosses(
        flows in prop::collection::vec(flow_strategy(), 1..80),
        policy in policy_strategy(),
    ) {
        let engine = engine(policy);
        for flow in &flows {
            engine.submit(admit(flow)).unwrap();
            let snapshot = engine.snapshot(usize::MAX);
            if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
                prop_assert!(bid < ask, "crossed book: bid {} ask {}", bid, ask);
            }
        }
        prop_assert!(!engine.is_halted());
    }

    /// Everything submitted is traded (counted on both sides), resting or cancelled
    #[test]
    fn quantity_is_conserved(
        flows in prop::collection::vec(flow_strategy(), 1..80),
        policy in policy_strategy(),
    ) {
        let engine = engine(policy);
        let mut submitted = Decimal::ZERO;
        let mut traded = Decimal::ZERO;
        let mut cancelled = Decimal::ZERO;

        for flow in &flows {
            let order = admit(flow);
            submitted += order.quantity();

            let result = engine.submit(order).unwrap();
            let filled = result.filled_quantity();
            prop_assert_eq!(filled, result.order.filled_quantity());
            prop_assert_eq!(
                result.order.quantity(),
                result.order.filled_quantity() + result.order.remaining_quantity()
            );

            traded += filled;
            if matches!(result.outcome, OrderOutcome::RemainderCancelled { .. }) {
                cancelled += result.order.remaining_quantity();
            }
        }

        let snapshot = engine.snapshot(usize::MAX);
        let resting = snapshot.total_bid_quantity() + snapshot.total_ask_quantity();
        prop_assert_eq!(submitted, traded * Decimal::TWO + resting + cancelled);
    }

    /// No trade ever has the same account on both sides
    #[test]
    fn no_self_trades(
        flows in prop::collection::vec(flow_strategy(), 1..80),
        policy in policy_strategy(),
    ) {
        let engine = engine(policy);
        for flow in &flows {
            let result = engine.submit(admit(flow)).unwrap();
            for trade in &result.trades {
                prop_assert_ne!(&trade.maker_account_id, &trade.taker_account_id);
            }
        }
    }

    /// Trades walk the book from the best price outward and never through
    /// the taker's limit
    #[test]
    fn trades_respect_price_priority(
        flows in prop::collection::vec(flow_strategy(), 1..80),
    ) {
        let engine = engine(SelfTradePolicy::SkipMaker);
        for flow in &flows {
            let result = engine.submit(admit(flow)).unwrap();
            let prices: Vec<Decimal> = result.trades.iter().map(|t| t.price).collect();

            for pair in prices.windows(2) {
                match flow.side {
                    Side::Buy => prop_assert!(pair[0] <= pair[1]),
                    Side::Sell => prop_assert!(pair[0] >= pair[1]),
                }
            }
            if let Some(limit) = flow.price.map(Decimal::from) {
                for price in &prices {
                    match flow.side {
                        Side::Buy => prop_assert!(*price <= limit),
                        Side::Sell => prop_assert!(*price >= limit),
                    }
                }
            }
        }
    }

    /// Makers at one price fill strictly in arrival order
    #[test]
    fn same_price_makers_fill_in_arrival_order(
        sizes in prop::collection::vec(1i64..=10, 1..12),
        take in 1i64..=60,
    ) {
        let engine = engine(SelfTradePolicy::SkipMaker);
        let mut makers = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            let intent = OrderIntent::limit(
                format!("maker-{i}"),
                SYMBOL,
                Side::Sell,
                Decimal::from(100),
                Decimal::from(*size),
            );
            let order = Order::admit(intent, chrono::Utc::now());
            makers.push(order.id);
            engine.submit(order).unwrap();
        }

        let taker = Order::admit(
            OrderIntent::market("taker", SYMBOL, Side::Buy, Decimal::from(take)),
            chrono::Utc::now(),
        );
        let result = engine.submit(taker).unwrap();

        let filled: Vec<OrderId> = result.trades.iter().map(|t| t.maker_order_id).collect();
        prop_assert_eq!(&filled[..], &makers[..filled.len()]);

        // Only the last touched maker may be partially filled
        for fill in result.maker_fills.iter().rev().skip(1) {
            prop_assert_eq!(fill.status, OrderStatus::Filled);
        }

        let total: i64 = sizes.iter().sum();
        prop_assert_eq!(result.filled_quantity(), Decimal::from(take.min(total)));
    }
}
