// ============================================================================
// Order Book Domain Model
// ============================================================================

use super::errors::BookError;
use super::{Order, OrderId, Price, Quantity, Side, Symbol};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound::{Excluded, Unbounded};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Price Level
// ============================================================================

/// FIFO queue of resting orders at one price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<Order>,
    /// Sum of resident remaining quantity, maintained on every mutation
    total_quantity: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Oldest order at this price
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn get(&self, position: usize) -> Option<&Order> {
        self.orders.get(position)
    }

    /// Orders in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    fn push_back(&mut self, order: Order) {
        self.total_quantity += order.remaining_quantity();
        self.orders.push_back(order);
    }

    fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let position = self.orders.iter().position(|o| o.id == order_id)?;
        self.take_at(position)
    }

    fn take_at(&mut self, position: usize) -> Option<Order> {
        let order = self.orders.remove(position)?;
        self.total_quantity -= order.remaining_quantity();
        Some(order)
    }

    fn fill_at(
        &mut self,
        position: usize,
        order_id: OrderId,
        quantity: Quantity,
    ) -> Result<&Order, BookError> {
        let order = self
            .orders
            .get_mut(position)
            .filter(|order| order.id == order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        order.fill(quantity)?;
        self.total_quantity -= quantity;
        Ok(order)
    }
}

// ============================================================================
// Book Side
// ============================================================================

/// One side of the book (bids or asks), levels keyed by price
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
    order_count: usize,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            order_count: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn order_count(&self) -> usize {
        self.order_count
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Top-of-book level: highest bid or lowest ask
    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(PriceLevel::price)
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Next level price in priority order strictly after `after`
    /// (the best price when `after` is `None`).
    pub fn next_price(&self, after: Option<Price>) -> Option<Price> {
        match (self.side, after) {
            (Side::Buy, None) => self.levels.keys().next_back().copied(),
            (Side::Buy, Some(price)) => self.levels.range(..price).next_back().map(|(p, _)| *p),
            (Side::Sell, None) => self.levels.keys().next().copied(),
            (Side::Sell, Some(price)) => self
                .levels
                .range((Excluded(price), Unbounded))
                .next()
                .map(|(p, _)| *p),
        }
    }

    /// Levels in priority order
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// `(price, total quantity)` for the best `num_levels` levels
    pub fn depth(&self, num_levels: usize) -> Vec<(Price, Quantity)> {
        self.levels()
            .take(num_levels)
            .map(|level| (level.price(), level.total_quantity()))
            .collect()
    }

    fn insert(&mut self, price: Price, order: Order) {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(order);
        self.order_count += 1;
    }

    fn remove(&mut self, price: Price, order_id: OrderId) -> Option<Order> {
        let level = self.levels.get_mut(&price)?;
        let order = level.remove(order_id)?;
        self.order_count -= 1;
        self.prune(price);
        Some(order)
    }

    /// Fill the order at `position` within the level at `price`. Fails if
    /// that slot does not hold `order_id`.
    pub(crate) fn fill_at(
        &mut self,
        price: Price,
        position: usize,
        order_id: OrderId,
        quantity: Quantity,
    ) -> Result<&Order, BookError> {
        let level = self
            .levels
            .get_mut(&price)
            .ok_or(BookError::OrderNotFound(order_id))?;
        level.fill_at(position, order_id, quantity)
    }

    /// Detach the order at `position`; the level is kept even when it empties
    /// so positions stay stable until [`BookSide::prune`] is called.
    pub(crate) fn take_at(&mut self, price: Price, position: usize) -> Option<Order> {
        let order = self.levels.get_mut(&price)?.take_at(position)?;
        self.order_count -= 1;
        Some(order)
    }

    /// Drop the level at `price` if it holds no orders.
    pub(crate) fn prune(&mut self, price: Price) -> bool {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
            return true;
        }
        false
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Per-symbol book: bids descending, asks ascending, plus an id index
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    index: HashMap<OrderId, (Side, Price)>,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            index: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Append a resting limit order to the tail of its price level.
    pub fn insert(&mut self, order: Order) -> Result<(), BookError> {
        if order.symbol != self.symbol {
            return Err(BookError::SymbolMismatch {
                expected: self.symbol.clone(),
                actual: order.symbol.clone(),
            });
        }
        let price = order.price().ok_or(BookError::NotRestable(order.id))?;
        if order.remaining_quantity() <= Decimal::ZERO || order.status().is_terminal() {
            return Err(BookError::NotRestable(order.id));
        }
        if self.index.contains_key(&order.id) {
            return Err(BookError::DuplicateOrder(order.id));
        }

        self.index.insert(order.id, (order.side(), price));
        self.side_mut(order.side()).insert(price, order);
        Ok(())
    }

    /// Remove a resting order, pruning its level if it empties.
    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let (side, price) = self.index.remove(&order_id)?;
        self.side_mut(side).remove(price, order_id)
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.best_level()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.best_level()
    }

    /// Level an incoming order on `incoming` side would match against next
    pub fn peek_top(&self, incoming: Side) -> Option<&PriceLevel> {
        self.side(incoming.opposite()).best_level()
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Drop an order id from the index once the order has left its level.
    pub(crate) fn forget(&mut self, order_id: OrderId) {
        self.index.remove(&order_id);
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(&order_id)?;
        self.side(*side)
            .level(*price)?
            .iter()
            .find(|order| order.id == order_id)
    }

    pub fn order_count(&self) -> usize {
        self.bids.order_count() + self.asks.order_count()
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Best bid at or above best ask
    pub fn is_crossed(&self) -> bool {
        matches!(
            (self.bids.best_price(), self.asks.best_price()),
            (Some(bid), Some(ask)) if bid >= ask
        )
    }

    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot::with_depth(
            self.symbol.clone(),
            self.bids.depth(depth),
            self.asks.depth(depth),
        )
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Immutable snapshot of the order book state
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub symbol: Symbol,
    /// Bid levels (price, quantity), best first
    pub bids: Vec<(Price, Quantity)>,
    /// Ask levels (price, quantity), best first
    pub asks: Vec<(Price, Quantity)>,
    /// Current spread (ask - bid)
    pub spread: Option<Decimal>,
    /// Mid price
    pub mid_price: Option<Decimal>,
}

impl OrderBookSnapshot {
    pub fn with_depth(
        symbol: Symbol,
        bids: Vec<(Price, Quantity)>,
        asks: Vec<(Price, Quantity)>,
    ) -> Self {
        let (spread, mid_price) = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => {
                (Some(ask - bid), Some((bid + ask) / Decimal::TWO))
            },
            _ => (None, None),
        };

        Self {
            symbol,
            bids,
            asks,
            spread,
            mid_price,
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.iter().map(|(_, qty)| qty).sum()
    }

    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.iter().map(|(_, qty)| qty).sum()
    }
}
