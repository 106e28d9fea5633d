// ============================================================================
// Matching Algorithm Interface
// Defines the contract for pluggable matching algorithms
// ============================================================================

use crate::domain::{BookError, MakerFill, Order, OrderBook, Price, Quantity, Side, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use smallvec::SmallVec;

/// What a matching pass did to the taker and the opposite side of the book
#[derive(Debug, Clone, Default)]
pub struct MatchingOutput {
    pub trades: SmallVec<[Trade; 4]>,
    pub maker_fills: Vec<MakerFill>,
    /// Opposite-side levels whose aggregate changed, in visit order
    pub touched_levels: Vec<Price>,
    /// Same-account makers that were passed over
    pub skipped_self_trades: usize,
    /// Matching stopped because the self-trade policy cancels the taker
    pub halted_by_self_trade: bool,
}

/// Strategy pattern interface for matching algorithms
pub trait MatchingAlgorithm: Send + Sync {
    /// Match an incoming order against the opposite side of the book.
    ///
    /// Fills are applied to `taker` and to the resting makers in place; fully
    /// filled makers leave the book. The taker is never inserted here.
    fn match_order(
        &self,
        taker: &mut Order,
        book: &mut OrderBook,
        now: DateTime<Utc>,
    ) -> Result<MatchingOutput, BookError>;

    /// Quantity `taker` could execute right now, honoring self-trade handling
    fn available_liquidity(&self, taker: &Order, book: &OrderBook) -> Quantity;

    /// Get the algorithm name for logging/metrics
    fn name(&self) -> &str;

    /// Check if the incoming order's limit crosses a resting price.
    /// Market orders cross any price.
    fn prices_cross(&self, incoming: &Order, book_price: Price) -> bool {
        let incoming_price = incoming.price().unwrap_or(match incoming.side() {
            Side::Buy => Decimal::MAX,
            Side::Sell => Decimal::ZERO,
        });

        match incoming.side() {
            Side::Buy => incoming_price >= book_price,
            Side::Sell => incoming_price <= book_price,
        }
    }
}
