// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// Continuous matching with maker-price execution and self-trade prevention
// ============================================================================

use crate::domain::{
    BookError, MakerFill, Order, OrderBook, Quantity, SelfTradePolicy, Trade,
};
use crate::interfaces::{MatchingAlgorithm, MatchingOutput};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price/Time Priority (FIFO) matching algorithm
///
/// Orders at the same price level are matched in arrival order, better
/// prices first. Trades execute at the resting order's price.
///
/// # Example
/// ```text
/// Book:  50000 @ 1.0 BTC (Order A, t=100)
///        50000 @ 2.0 BTC (Order B, t=101)
///
/// Incoming: Buy 1.5 BTC @ 50000
/// Result: Match 1.0 with A, then 0.5 with B
/// ```
pub struct PriceTimePriority {
    self_trade_policy: SelfTradePolicy,
}

impl PriceTimePriority {
    pub fn new(self_trade_policy: SelfTradePolicy) -> Self {
        Self { self_trade_policy }
    }

    pub fn self_trade_policy(&self) -> SelfTradePolicy {
        self.self_trade_policy
    }
}

impl Default for PriceTimePriority {
    fn default() -> Self {
        Self::new(SelfTradePolicy::default())
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn match_order(
        &self,
        taker: &mut Order,
        book: &mut OrderBook,
        now: DateTime<Utc>,
    ) -> Result<MatchingOutput, BookError> {
        let mut output = MatchingOutput::default();
        let maker_side = taker.side().opposite();
        let mut cursor = book.side(maker_side).next_price(None);

        while let Some(price) = cursor {
            if taker.remaining_quantity() == Decimal::ZERO || !self.prices_cross(taker, price) {
                break;
            }

            // Walk the level head to tail; skipped makers keep their slot
            let mut position = 0;
            let mut touched = false;
            while taker.remaining_quantity() > Decimal::ZERO {
                let Some(maker) = book
                    .side(maker_side)
                    .level(price)
                    .and_then(|level| level.get(position))
                else {
                    break;
                };

                if maker.account_id == taker.account_id {
                    match self.self_trade_policy {
                        SelfTradePolicy::SkipMaker => {
                            output.skipped_self_trades += 1;
                            position += 1;
                            continue;
                        },
                        SelfTradePolicy::CancelTaker => {
                            output.halted_by_self_trade = true;
                            break;
                        },
                    }
                }

                let maker_id = maker.id;
                let maker_account = maker.account_id.clone();
                let quantity = taker.remaining_quantity().min(maker.remaining_quantity());

                let maker_after = book
                    .side_mut(maker_side)
                    .fill_at(price, position, maker_id, quantity)?;
                let fill = MakerFill {
                    order_id: maker_id,
                    account_id: maker_account.clone(),
                    quantity,
                    remaining_quantity: maker_after.remaining_quantity(),
                    status: maker_after.status(),
                };
                taker.fill(quantity)?;

                output.trades.push(Trade::new(
                    taker.symbol.clone(),
                    maker_id,
                    taker.id,
                    maker_account,
                    taker.account_id.clone(),
                    maker_side,
                    price,
                    quantity,
                    now,
                ));
                touched = true;

                if fill.remaining_quantity == Decimal::ZERO {
                    book.side_mut(maker_side).take_at(price, position);
                    book.forget(maker_id);
                } else {
                    position += 1;
                }
                output.maker_fills.push(fill);
            }

            if touched {
                output.touched_levels.push(price);
                book.side_mut(maker_side).prune(price);
            }
            if output.halted_by_self_trade {
                break;
            }
            cursor = book.side(maker_side).next_price(Some(price));
        }

        Ok(output)
    }

    fn available_liquidity(&self, taker: &Order, book: &OrderBook) -> Quantity {
        let mut available = Decimal::ZERO;

        for level in book.side(taker.side().opposite()).levels() {
            if !self.prices_cross(taker, level.price()) {
                break;
            }
            for maker in level.iter() {
                if maker.account_id == taker.account_id {
                    match self.self_trade_policy {
                        SelfTradePolicy::SkipMaker => continue,
                        SelfTradePolicy::CancelTaker => return available,
                    }
                }
                available += maker.remaining_quantity();
                if available >= taker.remaining_quantity() {
                    return available;
                }
            }
        }

        available
    }

    fn name(&self) -> &str {
        match self.self_trade_policy {
            SelfTradePolicy::SkipMaker => "PriceTime",
            SelfTradePolicy::CancelTaker => "PriceTime-CancelTaker",
        }
    }
}
