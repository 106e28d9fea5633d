// ============================================================================
// Trade Processor
// Fees, ledger settlement, persistence and trade lifecycle events
// ============================================================================

use crate::domain::{
    AccountId, LedgerError, OrderId, Side, Trade, TradeId, TradeStatus, VenueError,
};
use crate::engine::settlement::{AccountFences, FenceGuard};
use crate::engine::FeeCalculator;
use crate::interfaces::{
    BalanceDelta, Clock, EventSink, ExposureProjection, Ledger, LimitsSource, TradeEvent,
    TradeStore, VenueEvent,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SettlementOutcome {
    Settled,
    /// The trade id was already claimed; nothing was applied
    Duplicate(TradeStatus),
    Failed { reason: String },
}

/// Result of one `settle`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TradeSettlement {
    pub trade: Trade,
    pub outcome: SettlementOutcome,
}

impl TradeSettlement {
    pub fn is_settled(&self) -> bool {
        self.outcome == SettlementOutcome::Settled
    }
}

/// Failed trade kept with its execution data for manual or automated repair
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReconciliationItem {
    pub trade: Trade,
    pub reason: String,
    pub queued_at: DateTime<Utc>,
}

/// Settles trades exactly once. A trade that cannot be settled is marked
/// failed and queued for reconciliation; it is never retried here.
pub struct TradeProcessor {
    fees: FeeCalculator,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn TradeStore>,
    limits: Arc<dyn LimitsSource>,
    exposure: Arc<dyn ExposureProjection>,
    event_sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    fences: Arc<AccountFences>,
    /// Every trade id ever claimed, with its latest status
    claims: Mutex<HashMap<TradeId, TradeStatus>>,
    reconciliation: Mutex<Vec<ReconciliationItem>>,
}

impl TradeProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fees: FeeCalculator,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn TradeStore>,
        limits: Arc<dyn LimitsSource>,
        exposure: Arc<dyn ExposureProjection>,
        event_sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        fences: Arc<AccountFences>,
    ) -> Self {
        Self {
            fees,
            ledger,
            store,
            limits,
            exposure,
            event_sink,
            clock,
            fences,
            claims: Mutex::new(HashMap::new()),
            reconciliation: Mutex::new(Vec::new()),
        }
    }

    /// Settle one trade, holding both accounts' fences for the duration
    pub fn settle(&self, trade: Trade) -> TradeSettlement {
        let _fence = self.fence(&trade);
        self.settle_within_fence(trade)
    }

    /// Fence both parties of `trade` until the guard drops
    pub fn fence(&self, trade: &Trade) -> FenceGuard {
        self.fences
            .enter(&[&trade.maker_account_id, &trade.taker_account_id])
    }

    /// Settle a trade whose accounts are already fenced by the caller
    pub fn settle_within_fence(&self, mut trade: Trade) -> TradeSettlement {
        if let Some(status) = self.claim(trade.id) {
            tracing::debug!(trade_id = %trade.id, ?status, "Trade already processed");
            return TradeSettlement {
                trade,
                outcome: SettlementOutcome::Duplicate(status),
            };
        }

        let Some(fees) = self.fees.trade_fees(
            &trade,
            self.limits.fee_tier(&trade.maker_account_id),
            self.limits.fee_tier(&trade.taker_account_id),
        ) else {
            return self.fail(trade, "trade notional out of range".to_string());
        };
        trade.apply_fees(fees.maker_fee, fees.taker_fee);

        match self.apply(&mut trade) {
            Ok(()) => {
                self.exposure.record_fill(&trade);
                self.claims.lock().insert(trade.id, TradeStatus::Settled);

                tracing::info!(
                    trade_id = %trade.id,
                    symbol = %trade.symbol,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    "Trade settled"
                );
                self.event_sink
                    .publish(VenueEvent::Trade(TradeEvent::Settled(trade.clone())));

                TradeSettlement {
                    trade,
                    outcome: SettlementOutcome::Settled,
                }
            },
            Err(err) => self.fail(trade, err.to_string()),
        }
    }

    /// Return unused holds for orders that reached a terminal state
    pub fn release_holds(&self, closed_orders: &[(OrderId, AccountId)]) {
        for (order_id, account_id) in closed_orders {
            match self.ledger.release_funds(account_id, *order_id) {
                Ok(released) if released > Decimal::ZERO => {
                    tracing::debug!(%order_id, %account_id, %released, "Released hold");
                },
                Ok(_) => {},
                Err(err) => {
                    tracing::warn!(%order_id, %account_id, error = %err, "Failed to release hold");
                },
            }
        }
    }

    /// Status of a trade this processor has seen
    pub fn status(&self, trade_id: TradeId) -> Option<TradeStatus> {
        self.claims.lock().get(&trade_id).copied()
    }

    pub fn pending_reconciliation(&self) -> Vec<ReconciliationItem> {
        self.reconciliation.lock().clone()
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    /// Record the trade id; `Some` if it was claimed before
    fn claim(&self, trade_id: TradeId) -> Option<TradeStatus> {
        let mut claims = self.claims.lock();
        if let Some(status) = claims.get(&trade_id) {
            return Some(*status);
        }
        claims.insert(trade_id, TradeStatus::Pending);
        None
    }

    /// Persist as pending, move balances, then persist as settled
    fn apply(&self, trade: &mut Trade) -> Result<(), VenueError> {
        self.store.save(trade)?;

        let (maker, taker) = balance_deltas(trade)?;
        self.ledger.apply_trade_settlement(trade, &maker, &taker)?;

        // Not visible as settled until the settled record is durable
        trade.mark_settled(self.clock.now());
        self.store.save(trade)?;
        Ok(())
    }

    fn fail(&self, mut trade: Trade, reason: String) -> TradeSettlement {
        trade.mark_failed();
        if let Err(err) = self.store.save(&trade) {
            tracing::error!(trade_id = %trade.id, error = %err, "Failed to persist failed trade");
        }
        self.claims.lock().insert(trade.id, TradeStatus::Failed);

        tracing::warn!(trade_id = %trade.id, %reason, "Trade settlement failed, queued for reconciliation");

        self.reconciliation.lock().push(ReconciliationItem {
            trade: trade.clone(),
            reason: reason.clone(),
            queued_at: self.clock.now(),
        });
        self.event_sink.publish_all(vec![
            VenueEvent::Trade(TradeEvent::Failed {
                trade: trade.clone(),
                reason: reason.clone(),
            }),
            VenueEvent::Trade(TradeEvent::ReconciliationRequired {
                trade: trade.clone(),
                reason: reason.clone(),
            }),
        ]);

        TradeSettlement {
            trade,
            outcome: SettlementOutcome::Failed { reason },
        }
    }
}

/// Maker and taker balance changes, net of each side's fee.
/// The buyer receives base and pays notional plus fee in quote; the seller
/// gives base and receives notional minus fee.
pub fn balance_deltas(trade: &Trade) -> Result<(BalanceDelta, BalanceDelta), LedgerError> {
    let (base, quote) = trade
        .symbol
        .assets()
        .ok_or_else(|| LedgerError::UnsupportedSymbol(trade.symbol.clone()))?;
    let overflow = || LedgerError::AmountOverflow {
        asset: quote.to_string(),
    };
    let notional = trade.notional().ok_or_else(overflow)?;

    let delta = |account_id: &AccountId,
                 order_id: OrderId,
                 side: Side,
                 fee: Decimal|
     -> Result<BalanceDelta, LedgerError> {
        let (base_change, quote_change) = match side {
            Side::Buy => (trade.quantity, notional.checked_add(fee).map(|paid| -paid)),
            Side::Sell => (-trade.quantity, notional.checked_sub(fee)),
        };
        Ok(BalanceDelta {
            account_id: account_id.clone(),
            order_id,
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            base: base_change,
            quote: quote_change.ok_or_else(overflow)?,
        })
    };

    Ok((
        delta(
            &trade.maker_account_id,
            trade.maker_order_id,
            trade.maker_side,
            trade.maker_fee,
        )?,
        delta(
            &trade.taker_account_id,
            trade.taker_order_id,
            trade.taker_side(),
            trade.taker_fee,
        )?,
    ))
}
