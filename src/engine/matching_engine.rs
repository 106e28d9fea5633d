// ============================================================================
// Matching Engine
// Core business logic for order matching, one instance per symbol
// ============================================================================

use crate::domain::{
    BookDelta, BookError, CancelReason, CancelResult, MatchResult, Order, OrderBook,
    OrderBookSnapshot, OrderId, OrderOutcome, Price, Side, Symbol, TimeInForce, VenueError,
};
use crate::interfaces::{
    Clock, EventSink, MatchingAlgorithm, MatchingEvent, MatchingEventKind, MatchingOutput,
    VenueEvent,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-symbol metrics, read without mutating the book
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BookStats {
    pub symbol: Symbol,
    pub resting_orders: usize,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Decimal>,
    pub trades_executed: u64,
    pub halted: bool,
}

/// Everything the book-scoped lock protects
struct EngineState {
    book: OrderBook,
    /// Every order id this engine has accepted
    seen: HashSet<OrderId>,
    sequence: u64,
    halted: Option<String>,
    trades_executed: u64,
}

/// Matching engine with pluggable matching algorithm.
///
/// Submits and cancels for one symbol run under a single mutex, so a whole
/// multi-fill match is one atomic step and readers never see a crossed book.
/// Events are published before the lock is released, keeping per-symbol
/// publication order equal to processing order.
pub struct MatchingEngine {
    symbol: Symbol,

    /// Pluggable matching algorithm
    algorithm: Box<dyn MatchingAlgorithm>,

    event_sink: Arc<dyn EventSink>,

    clock: Arc<dyn Clock>,

    state: Mutex<EngineState>,
}

impl MatchingEngine {
    /// Create a new matching engine
    pub fn new(
        symbol: Symbol,
        algorithm: Box<dyn MatchingAlgorithm>,
        event_sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState {
                book: OrderBook::new(symbol.clone()),
                seen: HashSet::new(),
                sequence: 0,
                halted: None,
                trades_executed: 0,
            }),
            symbol,
            algorithm,
            event_sink,
            clock,
        }
    }

    /// Match an admitted order and rest or cancel its remainder
    pub fn submit(&self, order: Order) -> Result<MatchResult, VenueError> {
        self.submit_with(order, |_| ()).map(|(result, ())| result)
    }

    /// Like `submit`, running `matched` on the result before the book lock
    /// is released. Nothing can observe the book between the match and
    /// `matched`.
    pub fn submit_with<R>(
        &self,
        order: Order,
        matched: impl FnOnce(&MatchResult) -> R,
    ) -> Result<(MatchResult, R), VenueError> {
        let mut state = self.state.lock();
        let result = self.match_locked(&mut state, order)?;
        let extra = matched(&result);
        Ok((result, extra))
    }

    fn match_locked(
        &self,
        state: &mut EngineState,
        order: Order,
    ) -> Result<MatchResult, VenueError> {
        self.ensure_running(state)?;

        if order.symbol != self.symbol {
            return Err(BookError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: order.symbol.clone(),
            }
            .into());
        }
        if !state.seen.insert(order.id) {
            return Err(BookError::DuplicateOrder(order.id).into());
        }

        let now = self.clock.now();
        let mut taker = order;
        let mut events = vec![MatchingEventKind::OrderAccepted {
            order_id: taker.id,
            account_id: taker.account_id.clone(),
            side: taker.side(),
            quantity: taker.quantity(),
        }];

        tracing::debug!(
            symbol = %self.symbol,
            order_id = %taker.id,
            side = ?taker.side(),
            quantity = %taker.quantity(),
            "Submitting order"
        );

        // Fill-or-kill never touches the book unless the whole quantity can trade
        if taker.time_in_force() == TimeInForce::FillOrKill
            && self.algorithm.available_liquidity(&taker, &state.book) < taker.remaining_quantity()
        {
            taker.cancel()?;
            events.push(MatchingEventKind::OrderCancelled {
                order_id: taker.id,
                reason: CancelReason::FillOrKill,
                remaining_quantity: taker.remaining_quantity(),
            });
            self.publish(state, events, now);
            return Ok(MatchResult {
                symbol: self.symbol.clone(),
                order: taker,
                trades: Default::default(),
                maker_fills: Vec::new(),
                book_deltas: Vec::new(),
                outcome: OrderOutcome::RemainderCancelled {
                    reason: CancelReason::FillOrKill,
                },
                skipped_self_trades: 0,
            });
        }

        let output = match self.algorithm.match_order(&mut taker, &mut state.book, now) {
            Ok(output) => output,
            Err(err) => return Err(self.halt(state, events, err.to_string(), now)),
        };

        let maker_side = taker.side().opposite();
        let mut book_deltas: Vec<BookDelta> = output
            .touched_levels
            .iter()
            .map(|price| level_delta(&state.book, maker_side, *price))
            .collect();

        let outcome = match self.dispose_remainder(&mut state.book, &mut taker, &output) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.halt(state, events, err.to_string(), now)),
        };
        if let (OrderOutcome::Resting | OrderOutcome::PartiallyFilledResting, Some(price)) =
            (outcome, taker.price())
        {
            book_deltas.push(level_delta(&state.book, taker.side(), price));
        }

        events.extend(
            output
                .trades
                .iter()
                .cloned()
                .map(MatchingEventKind::TradeExecuted),
        );
        match outcome {
            OrderOutcome::Resting | OrderOutcome::PartiallyFilledResting => {
                events.push(MatchingEventKind::OrderRested {
                    order_id: taker.id,
                    price: taker.price().unwrap_or_default(),
                    remaining_quantity: taker.remaining_quantity(),
                });
            },
            OrderOutcome::RemainderCancelled { reason } => {
                events.push(MatchingEventKind::OrderCancelled {
                    order_id: taker.id,
                    reason,
                    remaining_quantity: taker.remaining_quantity(),
                });
            },
            OrderOutcome::Filled => {},
        }
        events.extend(book_deltas.iter().copied().map(MatchingEventKind::BookDelta));

        if state.book.is_crossed() {
            let reason = format!("book crossed after order {}", taker.id);
            return Err(self.halt(state, events, reason, now));
        }

        state.trades_executed += output.trades.len() as u64;
        self.publish(state, events, now);

        Ok(MatchResult {
            symbol: self.symbol.clone(),
            order: taker,
            trades: output.trades,
            maker_fills: output.maker_fills,
            book_deltas,
            outcome,
            skipped_self_trades: output.skipped_self_trades,
        })
    }

    /// Cancel a resting order
    pub fn cancel(&self, order_id: OrderId) -> Result<CancelResult, VenueError> {
        let mut state = self.state.lock();
        self.ensure_running(&state)?;

        let mut order = state
            .book
            .remove(order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        order.cancel()?;

        let price = order.price().ok_or(BookError::NotRestable(order_id))?;
        let book_delta = level_delta(&state.book, order.side(), price);
        let now = self.clock.now();

        tracing::debug!(symbol = %self.symbol, order_id = %order_id, "Cancelled order");

        self.publish(
            &mut state,
            vec![
                MatchingEventKind::OrderCancelled {
                    order_id,
                    reason: CancelReason::UserRequested,
                    remaining_quantity: order.remaining_quantity(),
                },
                MatchingEventKind::BookDelta(book_delta),
            ],
            now,
        );

        Ok(CancelResult { order, book_delta })
    }

    /// Get order book snapshot
    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        self.state.lock().book.snapshot(depth)
    }

    pub fn stats(&self) -> BookStats {
        let state = self.state.lock();
        let book = &state.book;
        BookStats {
            symbol: self.symbol.clone(),
            resting_orders: book.order_count(),
            bid_levels: book.side(Side::Buy).level_count(),
            ask_levels: book.side(Side::Sell).level_count(),
            best_bid: book.side(Side::Buy).best_price(),
            best_ask: book.side(Side::Sell).best_price(),
            spread: book.spread(),
            trades_executed: state.trades_executed,
            halted: state.halted.is_some(),
        }
    }

    /// A resting order, if it is still in the book
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.state.lock().book.get(order_id).cloned()
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().halted.is_some()
    }

    /// Get the symbol
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn ensure_running(&self, state: &EngineState) -> Result<(), VenueError> {
        match &state.halted {
            Some(reason) => Err(VenueError::EngineHalted {
                symbol: self.symbol.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Rest or cancel whatever the match left over
    fn dispose_remainder(
        &self,
        book: &mut OrderBook,
        taker: &mut Order,
        output: &MatchingOutput,
    ) -> Result<OrderOutcome, VenueError> {
        if taker.remaining_quantity() == Decimal::ZERO {
            return Ok(OrderOutcome::Filled);
        }

        let cancel_reason = if output.halted_by_self_trade {
            Some(CancelReason::SelfTradePrevention)
        } else if taker.is_market_order() {
            Some(CancelReason::MarketRemainder)
        } else {
            match taker.time_in_force() {
                TimeInForce::ImmediateOrCancel => Some(CancelReason::ImmediateOrCancel),
                TimeInForce::FillOrKill => Some(CancelReason::FillOrKill),
                TimeInForce::GoodTillCancel => {
                    // Only a skipped own order can still cross the remainder
                    let crosses_own = book
                        .side(taker.side().opposite())
                        .best_price()
                        .is_some_and(|price| self.algorithm.prices_cross(taker, price));
                    crosses_own.then_some(CancelReason::SelfTradePrevention)
                },
            }
        };

        if let Some(reason) = cancel_reason {
            taker.cancel()?;
            return Ok(OrderOutcome::RemainderCancelled { reason });
        }

        let partially_filled = taker.filled_quantity() > Decimal::ZERO;
        taker.mark_resting()?;
        book.insert(taker.clone())?;

        Ok(if partially_filled {
            OrderOutcome::PartiallyFilledResting
        } else {
            OrderOutcome::Resting
        })
    }

    /// Refuse all further mutation. Events produced so far are still published.
    fn halt(
        &self,
        state: &mut EngineState,
        mut events: Vec<MatchingEventKind>,
        reason: String,
        now: DateTime<Utc>,
    ) -> VenueError {
        tracing::error!(symbol = %self.symbol, %reason, "Halting matching engine");

        state.halted = Some(reason.clone());
        events.push(MatchingEventKind::EngineHalted {
            reason: reason.clone(),
        });
        self.publish(state, events, now);

        VenueError::InvariantViolation {
            symbol: self.symbol.clone(),
            reason,
        }
    }

    fn publish(&self, state: &mut EngineState, kinds: Vec<MatchingEventKind>, now: DateTime<Utc>) {
        let events = kinds
            .into_iter()
            .map(|kind| {
                state.sequence += 1;
                VenueEvent::Matching(MatchingEvent {
                    symbol: self.symbol.clone(),
                    sequence: state.sequence,
                    timestamp: now,
                    kind,
                })
            })
            .collect();
        self.event_sink.publish_all(events);
    }
}

fn level_delta(book: &OrderBook, side: Side, price: Price) -> BookDelta {
    match book.side(side).level(price) {
        Some(level) => BookDelta {
            side,
            price,
            total_quantity: level.total_quantity(),
            order_count: level.len(),
        },
        None => BookDelta {
            side,
            price,
            total_quantity: Decimal::ZERO,
            order_count: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderIntent, OrderStatus, SelfTradePolicy};
    use crate::adapters::EventBus;
    use crate::engine::PriceTimePriority;
    use crate::interfaces::{NoOpEventSink, SystemClock};

    fn engine() -> MatchingEngine {
        engine_with(SelfTradePolicy::SkipMaker)
    }

    fn engine_with(policy: SelfTradePolicy) -> MatchingEngine {
        MatchingEngine::new(
            Symbol::new("BTC-USD"),
            Box::new(PriceTimePriority::new(policy)),
            Arc::new(NoOpEventSink),
            Arc::new(SystemClock),
        )
    }

    fn limit(account: &str, side: Side, price: i64, quantity: i64) -> Order {
        limit_with(account, side, price, quantity, TimeInForce::GoodTillCancel)
    }

    fn limit_with(
        account: &str,
        side: Side,
        price: i64,
        quantity: i64,
        time_in_force: TimeInForce,
    ) -> Order {
        Order::admit(
            OrderIntent::limit(
                account,
                "BTC-USD",
                side,
                Decimal::from(price),
                Decimal::from(quantity),
            )
            .with_time_in_force(time_in_force),
            Utc::now(),
        )
    }

    #[test]
    fn test_matching_engine_basic() {
        let engine = engine();
        engine.submit(limit("user1", Side::Sell, 50000, 1)).unwrap();

        let result = engine.submit(limit("user2", Side::Buy, 50000, 1)).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.outcome, OrderOutcome::Filled);
        assert_eq!(result.book_deltas.len(), 1);
        assert!(result.book_deltas[0].is_removal());

        // Snapshot should be empty
        let snapshot = engine.snapshot(10);
        assert_eq!(snapshot.bids.len(), 0);
        assert_eq!(snapshot.asks.len(), 0);
    }

    #[test]
    fn test_cancel_order() {
        let engine = engine();
        let order = limit("user1", Side::Buy, 50000, 1);
        let order_id = order.id;
        engine.submit(order).unwrap();

        let cancelled = engine.cancel(order_id).unwrap();
        assert_eq!(cancelled.order.status(), OrderStatus::Cancelled);
        assert!(cancelled.book_delta.is_removal());

        assert!(matches!(
            engine.cancel(order_id),
            Err(VenueError::Book(BookError::OrderNotFound(_)))
        ));
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let engine = engine();
        let order = limit("user1", Side::Buy, 100, 1);
        engine.submit(order.clone()).unwrap();
        engine.cancel(order.id).unwrap();

        // Still a duplicate after it left the book
        assert!(matches!(
            engine.submit(order),
            Err(VenueError::Book(BookError::DuplicateOrder(_)))
        ));
    }

    #[test]
    fn test_order_book_snapshot() {
        let engine = engine();

        for i in 0..5 {
            engine
                .submit(limit(&format!("user{i}"), Side::Buy, 50000 - i * 100, 1))
                .unwrap();
            engine
                .submit(limit(&format!("user{}", i + 10), Side::Sell, 50100 + i * 100, 1))
                .unwrap();
        }

        let snapshot = engine.snapshot(3);
        assert_eq!(snapshot.bids.len(), 3);
        assert_eq!(snapshot.asks.len(), 3);
        assert!(snapshot.spread.is_some());
        assert!(snapshot.mid_price.is_some());

        let stats = engine.stats();
        assert_eq!(stats.resting_orders, 10);
        assert_eq!(stats.bid_levels, 5);
        assert_eq!(stats.spread, Some(Decimal::from(100)));
    }

    #[test]
    fn test_ioc_remainder_cancelled() {
        let engine = engine();
        engine.submit(limit("maker", Side::Sell, 100, 2)).unwrap();

        let ioc = limit_with("taker", Side::Buy, 100, 5, TimeInForce::ImmediateOrCancel);
        let result = engine.submit(ioc).unwrap();

        assert_eq!(result.filled_quantity(), Decimal::from(2));
        assert_eq!(
            result.outcome,
            OrderOutcome::RemainderCancelled {
                reason: CancelReason::ImmediateOrCancel
            }
        );
        assert_eq!(engine.stats().resting_orders, 0);
    }

    #[test]
    fn test_fill_or_kill_without_liquidity_leaves_book_untouched() {
        let engine = engine();
        engine.submit(limit("maker", Side::Sell, 100, 2)).unwrap();

        let fok = limit_with("taker", Side::Buy, 100, 5, TimeInForce::FillOrKill);
        let result = engine.submit(fok).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.order.status(), OrderStatus::Cancelled);
        assert_eq!(
            engine.snapshot(1).asks,
            vec![(Decimal::from(100), Decimal::from(2))]
        );
    }

    #[test]
    fn test_skipped_self_trade_remainder_never_crosses() {
        let engine = engine();
        engine.submit(limit("x", Side::Sell, 100, 1)).unwrap();

        let result = engine.submit(limit("x", Side::Buy, 100, 1)).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.skipped_self_trades, 1);
        assert_eq!(
            result.outcome,
            OrderOutcome::RemainderCancelled {
                reason: CancelReason::SelfTradePrevention
            }
        );
        assert!(!engine.is_halted());
    }

    #[test]
    fn test_stalled_subscriber_does_not_stall_matching() {
        let bus = Arc::new(EventBus::new(1));
        let stalled = bus.subscribe("stalled");
        let engine = MatchingEngine::new(
            Symbol::new("BTC-USD"),
            Box::new(PriceTimePriority::new(SelfTradePolicy::SkipMaker)),
            bus.clone(),
            Arc::new(SystemClock),
        );

        for _ in 0..20 {
            engine.submit(limit("maker", Side::Sell, 100, 1)).unwrap();
            let result = engine.submit(limit("taker", Side::Buy, 100, 1)).unwrap();
            assert_eq!(result.trades.len(), 1);
        }

        assert_eq!(engine.stats().trades_executed, 20);
        assert_eq!(stalled.drain().len(), 1);
        assert!(bus.dropped(stalled.id()).unwrap() > 0);
    }

    #[test]
    fn test_symbol_mismatch_rejected() {
        let engine = engine();
        let order = Order::admit(
            OrderIntent::limit("a", "ETH-USD", Side::Buy, Decimal::ONE, Decimal::ONE),
            Utc::now(),
        );
        assert!(matches!(
            engine.submit(order),
            Err(VenueError::Book(BookError::SymbolMismatch { .. }))
        ));
    }
}
