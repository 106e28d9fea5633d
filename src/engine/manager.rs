// ============================================================================
// Order Book Manager
// One matching engine per symbol, created on first reference
// ============================================================================

use crate::domain::{
    CancelResult, MatchResult, Order, OrderBookSnapshot, OrderId, SelfTradePolicy, Symbol,
    VenueError,
};
use crate::engine::{BookStats, MatchingEngine, PriceTimePriority};
use crate::interfaces::{Clock, EventSink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Aggregate metrics across every symbol
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VenueStats {
    /// Per-symbol stats, ordered by symbol
    pub books: Vec<BookStats>,
    pub total_resting_orders: usize,
    pub total_trades_executed: u64,
    pub halted_books: usize,
}

impl VenueStats {
    pub fn book(&self, symbol: &Symbol) -> Option<&BookStats> {
        self.books.iter().find(|stats| &stats.symbol == symbol)
    }
}

/// Routes orders to per-symbol engines. Engines never share state, so the
/// map lock is only held long enough to find or create one.
pub struct OrderBookManager {
    engines: RwLock<HashMap<Symbol, Arc<MatchingEngine>>>,
    self_trade_policy: SelfTradePolicy,
    event_sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl OrderBookManager {
    pub fn new(
        self_trade_policy: SelfTradePolicy,
        event_sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            self_trade_policy,
            event_sink,
            clock,
        }
    }

    /// Dispatch to the symbol's engine, creating an empty book if needed
    pub fn route(&self, order: Order) -> Result<MatchResult, VenueError> {
        let engine = self.engine_or_create(&order.symbol);
        engine.submit(order)
    }

    /// `route`, with `matched` run while the symbol's book is still locked
    pub fn route_with<R>(
        &self,
        order: Order,
        matched: impl FnOnce(&MatchResult) -> R,
    ) -> Result<(MatchResult, R), VenueError> {
        let engine = self.engine_or_create(&order.symbol);
        engine.submit_with(order, matched)
    }

    pub fn cancel(&self, symbol: &Symbol, order_id: OrderId) -> Result<CancelResult, VenueError> {
        self.engine(symbol)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.clone()))?
            .cancel(order_id)
    }

    pub fn snapshot(&self, symbol: &Symbol, depth: usize) -> Result<OrderBookSnapshot, VenueError> {
        self.engine(symbol)
            .map(|engine| engine.snapshot(depth))
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.clone()))
    }

    pub fn get_stats(&self) -> VenueStats {
        let engines: Vec<Arc<MatchingEngine>> = self.engines.read().values().cloned().collect();

        let mut books: Vec<BookStats> = engines.iter().map(|engine| engine.stats()).collect();
        books.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        VenueStats {
            total_resting_orders: books.iter().map(|b| b.resting_orders).sum(),
            total_trades_executed: books.iter().map(|b| b.trades_executed).sum(),
            halted_books: books.iter().filter(|b| b.halted).count(),
            books,
        }
    }

    pub fn engine(&self, symbol: &Symbol) -> Option<Arc<MatchingEngine>> {
        self.engines.read().get(symbol).cloned()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.engines.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn engine_or_create(&self, symbol: &Symbol) -> Arc<MatchingEngine> {
        if let Some(engine) = self.engine(symbol) {
            return engine;
        }

        let mut engines = self.engines.write();
        Arc::clone(engines.entry(symbol.clone()).or_insert_with(|| {
            tracing::info!(symbol = %symbol, "Creating order book");
            Arc::new(MatchingEngine::new(
                symbol.clone(),
                Box::new(PriceTimePriority::new(self.self_trade_policy)),
                Arc::clone(&self.event_sink),
                Arc::clone(&self.clock),
            ))
        }))
    }
}
