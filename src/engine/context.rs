// ============================================================================
// Engine Context
// Explicit entry point wiring risk, matching and settlement together
// ============================================================================

use crate::adapters::{InMemoryExposure, InMemoryLedger, InMemoryTradeStore, StaticLimits};
use crate::domain::{
    AccountId, BookError, CancelResult, LedgerError, MatchResult, Order, OrderBookSnapshot,
    OrderId, OrderIntent, OrderType, PreTradeRiskAssessment, RiskCheckKind, RiskCheckStatus,
    SettlementMode, Side, Symbol, Trade, TradeId, TradeStatus, ValidationError, VenueConfig,
    VenueError,
};
use crate::engine::{
    AccountFences, AdmissionGates, FeeCalculator, FenceGuard, OrderBookManager, ReconciliationItem, RiskService,
    SettlementBatch, SettlementWorker, TradeProcessor, TradeSettlement, VenueStats,
};
use crate::interfaces::{
    Clock, EventSink, ExposureProjection, FundsHold, Ledger, LimitsSource, NoOpEventSink,
    RiskEvent, SystemClock, TradeStore, VenueEvent,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Everything one `submit_order` produced
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubmitReport {
    pub match_result: MatchResult,
    pub assessment: PreTradeRiskAssessment,
    /// Settlement results in trade order; empty when settlement runs in the
    /// background
    pub settlements: Vec<TradeSettlement>,
}

impl SubmitReport {
    pub fn trades(&self) -> &[Trade] {
        &self.match_result.trades
    }

    pub fn all_settled(&self) -> bool {
        self.settlements.iter().all(TradeSettlement::is_settled)
    }
}

/// Holds the book manager, risk service, trade processor and the external
/// capabilities. There is no global state; every caller goes through a
/// context.
pub struct EngineContext {
    config: VenueConfig,
    manager: OrderBookManager,
    risk: RiskService,
    processor: Arc<TradeProcessor>,
    ledger: Arc<dyn Ledger>,
    limits: Arc<dyn LimitsSource>,
    exposure: Arc<dyn ExposureProjection>,
    event_sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    fences: Arc<AccountFences>,
    admission: AdmissionGates,
    worker: Mutex<Option<SettlementWorker>>,
}

impl EngineContext {
    pub fn builder() -> EngineContextBuilder {
        EngineContextBuilder::new()
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Validate, risk-check, hold funds, match and settle one order.
    ///
    /// A risk rejection returns `VenueError::RiskRejected` with the full
    /// assessment and leaves no side effects besides the published risk
    /// events.
    pub fn submit_order(&self, intent: OrderIntent) -> Result<SubmitReport, VenueError> {
        intent.validate()?;

        // One admission at a time per account, from assessment to exposure update
        let gate = self.admission.gate(&intent.account_id);
        let _admission = gate.lock();

        // Settlement still in flight for this account must land first
        self.fences.wait_idle(&intent.account_id);

        let assessment = self.risk.assess(
            &intent,
            &self.limits.account_limits(&intent.account_id),
            &self.limits.symbol_limits(&intent.symbol),
            &self.exposure.account_exposure(&intent.account_id),
            &self.exposure.symbol_exposure(&intent.symbol),
        );
        self.publish_risk_events(&assessment);

        if !assessment.is_admitted() {
            let failed: Vec<&str> = assessment.failures().map(|c| c.kind.as_str()).collect();
            tracing::warn!(
                order_id = %intent.id,
                account_id = %intent.account_id,
                symbol = %intent.symbol,
                checks = ?failed,
                "Order rejected by pre-trade risk"
            );
            return Err(VenueError::RiskRejected(Box::new(assessment)));
        }

        let order = Order::admit(intent, self.clock.now());
        let hold = self.place_hold(&order)?;

        // Fence every party before the book unlocks, so no later assessment
        // can read exposure that this match has not yet settled into
        let routed = self
            .manager
            .route_with(order.clone(), |result| self.fence_parties(result));
        let (match_result, fence) = match routed {
            Ok(routed) => routed,
            Err(err) => {
                if hold {
                    self.processor.release_holds(&[(order.id, order.account_id.clone())]);
                }
                return Err(err);
            },
        };

        self.exposure.record_admission(&match_result.order);
        let closed_orders = match_result.closed_orders();
        for (_, account_id) in &closed_orders {
            self.exposure.record_order_closed(account_id);
        }

        let settlements = self.settle_result(&match_result, closed_orders, fence);

        Ok(SubmitReport {
            match_result,
            assessment,
            settlements,
        })
    }

    /// Cancel a resting order and return its unused hold
    pub fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: OrderId,
    ) -> Result<CancelResult, VenueError> {
        let result = self.manager.cancel(symbol, order_id)?;
        let account_id = &result.order.account_id;

        // Earlier fills of this order may still be consuming the hold
        self.fences.wait_idle(account_id);
        self.processor
            .release_holds(&[(result.order.id, account_id.clone())]);
        self.exposure.record_order_closed(account_id);

        Ok(result)
    }

    /// Settle a trade directly. A trade already processed is a no-op.
    pub fn settle(&self, trade: Trade) -> TradeSettlement {
        self.processor.settle(trade)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Book snapshot at `depth` levels, or the configured default depth
    pub fn snapshot(
        &self,
        symbol: &Symbol,
        depth: Option<usize>,
    ) -> Result<OrderBookSnapshot, VenueError> {
        self.manager
            .snapshot(symbol, depth.unwrap_or(self.config.snapshot_depth))
    }

    pub fn stats(&self) -> VenueStats {
        self.manager.get_stats()
    }

    pub fn trade_status(&self, trade_id: TradeId) -> Option<TradeStatus> {
        self.processor.status(trade_id)
    }

    pub fn pending_reconciliation(&self) -> Vec<ReconciliationItem> {
        self.processor.pending_reconciliation()
    }

    /// Block until every queued settlement has been applied
    pub fn wait_for_settlement(&self) {
        self.fences.wait_all_idle();
    }

    pub fn config(&self) -> &VenueConfig {
        &self.config
    }

    pub fn manager(&self) -> &OrderBookManager {
        &self.manager
    }

    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Drain the settlement queue and stop the worker, if one is running.
    /// Later submits settle inline.
    pub fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.shutdown();
            tracing::info!("Settlement worker stopped");
        }
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn publish_risk_events(&self, assessment: &PreTradeRiskAssessment) {
        let events: Vec<VenueEvent> = assessment
            .checks
            .iter()
            .filter_map(|check| {
                let event = match check.status {
                    RiskCheckStatus::Passed => return None,
                    RiskCheckStatus::Failed => RiskEvent::CheckFailed {
                        order_id: assessment.order_id,
                        account_id: assessment.account_id.clone(),
                        symbol: assessment.symbol.clone(),
                        check: check.clone(),
                    },
                    RiskCheckStatus::Warning
                        if check.kind == RiskCheckKind::MarginLevel =>
                    {
                        RiskEvent::MarginWarning {
                            order_id: assessment.order_id,
                            account_id: assessment.account_id.clone(),
                            check: check.clone(),
                        }
                    },
                    RiskCheckStatus::Warning => RiskEvent::CheckWarning {
                        order_id: assessment.order_id,
                        account_id: assessment.account_id.clone(),
                        symbol: assessment.symbol.clone(),
                        check: check.clone(),
                    },
                };
                Some(VenueEvent::Risk(event))
            })
            .collect();

        if !events.is_empty() {
            self.event_sink.publish_all(events);
        }
    }

    /// Reserve what the order can spend. Returns whether a hold was placed.
    fn place_hold(&self, order: &Order) -> Result<bool, VenueError> {
        if !self.config.hold_funds_on_admission {
            return Ok(false);
        }
        let (base, quote) = order
            .symbol
            .assets()
            .ok_or_else(|| LedgerError::UnsupportedSymbol(order.symbol.clone()))?;

        let (asset, amount) = match (order.side(), order.order_type()) {
            (Side::Sell, _) => (base, order.quantity()),
            (Side::Buy, OrderType::Limit { price }) => {
                let amount = price.checked_mul(order.quantity()).ok_or(
                    ValidationError::NotionalOverflow {
                        price,
                        quantity: order.quantity(),
                    },
                )?;
                (quote, amount)
            },
            // Market buys spend from available balance at settlement
            (Side::Buy, OrderType::Market) => return Ok(false),
        };

        let hold = FundsHold {
            account_id: order.account_id.clone(),
            order_id: order.id,
            asset: asset.to_string(),
            amount,
        };
        match self.ledger.hold_funds(hold) {
            Ok(()) => Ok(true),
            Err(LedgerError::DuplicateHold(order_id)) => {
                Err(BookError::DuplicateOrder(order_id).into())
            },
            Err(err) => {
                tracing::warn!(order_id = %order.id, account_id = %order.account_id, error = %err, "Hold rejected");
                Err(err.into())
            },
        }
    }

    /// Fence the taker and every maker it traded with
    fn fence_parties(&self, result: &MatchResult) -> FenceGuard {
        let mut accounts: Vec<&AccountId> = vec![&result.order.account_id];
        accounts.extend(result.trades.iter().map(|t| &t.maker_account_id));
        self.fences.enter(&accounts)
    }

    /// Settle under `fence`, which is released once the trades and holds
    /// have been applied
    fn settle_result(
        &self,
        result: &MatchResult,
        closed_orders: Vec<(OrderId, AccountId)>,
        fence: FenceGuard,
    ) -> Vec<TradeSettlement> {
        if result.trades.is_empty() && closed_orders.is_empty() {
            return Vec::new();
        }

        if self.config.settlement_mode == SettlementMode::Background {
            let worker = self.worker.lock();
            if let Some(worker) = worker.as_ref() {
                let batch = SettlementBatch {
                    fence,
                    trades: result.trades.to_vec(),
                    closed_orders,
                };
                return match worker.enqueue(batch) {
                    Ok(()) => Vec::new(),
                    Err(batch) => {
                        tracing::warn!("Settlement worker unavailable, settling inline");
                        let settlements = self.settle_inline(batch.trades, &batch.closed_orders);
                        drop(batch.fence);
                        settlements
                    },
                };
            }
        }

        let settlements = self.settle_inline(result.trades.to_vec(), &closed_orders);
        drop(fence);
        settlements
    }

    fn settle_inline(
        &self,
        trades: Vec<Trade>,
        closed_orders: &[(OrderId, AccountId)],
    ) -> Vec<TradeSettlement> {
        let settlements = trades
            .into_iter()
            .map(|trade| self.processor.settle(trade))
            .collect();
        self.processor.release_holds(closed_orders);
        settlements
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent construction of an `EngineContext`. Capabilities left unset get
/// in-memory defaults; note that the default ledger starts with no balances.
///
/// # Example
/// ```
/// use venue_core::prelude::*;
/// use std::sync::Arc;
///
/// let ledger = Arc::new(InMemoryLedger::new());
/// let context = EngineContext::builder()
///     .with_config(VenueConfig::default())
///     .with_ledger(ledger)
///     .build()
///     .unwrap();
/// assert!(context.stats().books.is_empty());
/// ```
pub struct EngineContextBuilder {
    config: VenueConfig,
    ledger: Option<Arc<dyn Ledger>>,
    store: Option<Arc<dyn TradeStore>>,
    limits: Option<Arc<dyn LimitsSource>>,
    exposure: Option<Arc<dyn ExposureProjection>>,
    event_sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineContextBuilder {
    pub fn new() -> Self {
        Self {
            config: VenueConfig::default(),
            ledger: None,
            store: None,
            limits: None,
            exposure: None,
            event_sink: None,
            clock: None,
        }
    }

    pub fn with_config(mut self, config: VenueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_trade_store(mut self, store: Arc<dyn TradeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_limits(mut self, limits: Arc<dyn LimitsSource>) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_exposure(mut self, exposure: Arc<dyn ExposureProjection>) -> Self {
        self.exposure = Some(exposure);
        self
    }

    pub fn with_event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(event_sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<EngineContext, VenueError> {
        self.config.validate()?;

        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryLedger::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTradeStore::new()));
        let limits = self
            .limits
            .unwrap_or_else(|| Arc::new(StaticLimits::permissive()));
        let exposure = self
            .exposure
            .unwrap_or_else(|| Arc::new(InMemoryExposure::new()));
        let event_sink = self.event_sink.unwrap_or_else(|| Arc::new(NoOpEventSink));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let fences = Arc::new(AccountFences::new());

        let processor = Arc::new(TradeProcessor::new(
            FeeCalculator::new(self.config.fee_schedule.clone()),
            Arc::clone(&ledger),
            store,
            Arc::clone(&limits),
            Arc::clone(&exposure),
            Arc::clone(&event_sink),
            Arc::clone(&clock),
            Arc::clone(&fences),
        ));

        let worker = match self.config.settlement_mode {
            SettlementMode::Background => Some(SettlementWorker::spawn(Arc::clone(&processor))?),
            SettlementMode::Inline => None,
        };

        tracing::info!(
            self_trade_policy = ?self.config.self_trade_policy,
            settlement_mode = ?self.config.settlement_mode,
            "Engine context ready"
        );

        Ok(EngineContext {
            manager: OrderBookManager::new(
                self.config.self_trade_policy,
                Arc::clone(&event_sink),
                Arc::clone(&clock),
            ),
            risk: RiskService::new(Arc::clone(&clock)),
            processor,
            ledger,
            limits,
            exposure,
            event_sink,
            clock,
            fences,
            admission: AdmissionGates::new(),
            worker: Mutex::new(worker),
            config: self.config,
        })
    }
}

impl Default for EngineContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountRiskLimits, FeeSchedule, OrderOutcome, SymbolRiskLimits};
    use rust_decimal::Decimal;

    fn funded_context(config: VenueConfig) -> (EngineContext, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        for account in ["alice", "bob"] {
            let account = AccountId::new(account);
            ledger.deposit(&account, "BTC", Decimal::from(10));
            ledger.deposit(&account, "USD", Decimal::from(10_000));
        }
        let context = EngineContext::builder()
            .with_config(config)
            .with_ledger(ledger.clone())
            .build()
            .unwrap();
        (context, ledger)
    }

    fn limit(account: &str, side: Side, price: i64, quantity: i64) -> OrderIntent {
        OrderIntent::limit(
            account,
            "BTC-USD",
            side,
            Decimal::from(price),
            Decimal::from(quantity),
        )
    }

    #[test]
    fn test_submit_settles_inline() {
        let (context, ledger) = funded_context(VenueConfig::new(FeeSchedule::zero()));

        context.submit_order(limit("alice", Side::Sell, 100, 2)).unwrap();
        let report = context.submit_order(limit("bob", Side::Buy, 100, 2)).unwrap();

        assert_eq!(report.match_result.outcome, OrderOutcome::Filled);
        assert_eq!(report.settlements.len(), 1);
        assert!(report.all_settled());

        let bob = AccountId::new("bob");
        assert_eq!(ledger.balance(&bob, "BTC").available, Decimal::from(12));
        assert_eq!(ledger.balance(&bob, "USD").total(), Decimal::from(9_800));
        // Alice's sell hold was consumed entirely
        assert_eq!(ledger.balance(&AccountId::new("alice"), "BTC").held, Decimal::ZERO);
    }

    #[test]
    fn test_hold_released_on_cancel() {
        let (context, ledger) = funded_context(VenueConfig::default());
        let report = context.submit_order(limit("alice", Side::Buy, 100, 3)).unwrap();
        let alice = AccountId::new("alice");
        assert_eq!(ledger.balance(&alice, "USD").held, Decimal::from(300));

        context
            .cancel_order(&Symbol::new("BTC-USD"), report.match_result.order.id)
            .unwrap();
        assert_eq!(ledger.balance(&alice, "USD").held, Decimal::ZERO);
        assert_eq!(ledger.balance(&alice, "USD").available, Decimal::from(10_000));
    }

    #[test]
    fn test_insufficient_funds_rejects_before_matching() {
        let (context, _) = funded_context(VenueConfig::default());
        let err = context
            .submit_order(limit("alice", Side::Sell, 100, 50))
            .unwrap_err();
        assert!(matches!(err, VenueError::Ledger(LedgerError::InsufficientFunds { .. })));
        assert!(context.stats().books.is_empty());
    }

    #[test]
    fn test_risk_rejection_has_no_side_effects() {
        let limits = Arc::new(StaticLimits::new(
            AccountRiskLimits::default(),
            SymbolRiskLimits::halted(),
        ));
        let context = EngineContext::builder()
            .with_config(VenueConfig::default().with_admission_holds(false))
            .with_limits(limits)
            .build()
            .unwrap();

        let err = context.submit_order(limit("alice", Side::Buy, 100, 1)).unwrap_err();
        let VenueError::RiskRejected(assessment) = err else {
            panic!("expected risk rejection");
        };
        assert!(assessment
            .check(RiskCheckKind::SymbolTradingEnabled)
            .is_some_and(|c| c.is_failed()));
        assert!(context.stats().books.is_empty());
    }

    #[test]
    fn test_background_settlement_drains_on_wait() {
        let (context, ledger) = funded_context(
            VenueConfig::default().with_settlement_mode(SettlementMode::Background),
        );

        context.submit_order(limit("alice", Side::Sell, 100, 1)).unwrap();
        let report = context.submit_order(limit("bob", Side::Buy, 100, 1)).unwrap();
        assert!(report.settlements.is_empty());

        context.wait_for_settlement();
        let trade_id = report.trades()[0].id;
        assert_eq!(context.trade_status(trade_id), Some(TradeStatus::Settled));
        assert_eq!(ledger.balance(&AccountId::new("bob"), "BTC").available, Decimal::from(11));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = EngineContext::builder()
            .with_config(VenueConfig::default().with_event_queue_capacity(0))
            .build();
        assert!(matches!(result, Err(VenueError::Config(_))));
    }
}
