// ============================================================================
// Settlement Scheduling
// Per-account fences and the background settlement thread
// ============================================================================

use crate::domain::{AccountId, OrderId, Trade, VenueError};
use crate::engine::TradeProcessor;
use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

// ============================================================================
// Account Fences
// ============================================================================

/// Counts in-flight settlements per account. Risk assessment for an account
/// waits until its count drops to zero, so exposure written by settlement is
/// always visible to the next assessment.
#[derive(Default)]
pub struct AccountFences {
    active: Mutex<HashMap<AccountId, usize>>,
    idle: Condvar,
}

impl AccountFences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `accounts` as having a settlement in flight until the guard drops
    pub fn enter(self: &Arc<Self>, accounts: &[&AccountId]) -> FenceGuard {
        let mut active = self.active.lock();
        let mut held: Vec<AccountId> = accounts.iter().map(|a| (*a).clone()).collect();
        held.sort();
        held.dedup();
        for account in &held {
            *active.entry(account.clone()).or_insert(0) += 1;
        }
        FenceGuard {
            fences: Arc::clone(self),
            accounts: held,
        }
    }

    /// Block until no settlement touching `account` is in flight
    pub fn wait_idle(&self, account: &AccountId) {
        let mut active = self.active.lock();
        while active.contains_key(account) {
            self.idle.wait(&mut active);
        }
    }

    /// Block until every in-flight settlement has finished
    pub fn wait_all_idle(&self) {
        let mut active = self.active.lock();
        while !active.is_empty() {
            self.idle.wait(&mut active);
        }
    }

    pub fn in_flight(&self, account: &AccountId) -> usize {
        self.active.lock().get(account).copied().unwrap_or(0)
    }

    fn exit(&self, accounts: &[AccountId]) {
        let mut active = self.active.lock();
        for account in accounts {
            if let Some(count) = active.get_mut(account) {
                *count -= 1;
                if *count == 0 {
                    active.remove(account);
                }
            }
        }
        self.idle.notify_all();
    }
}

// ============================================================================
// Admission Gates
// ============================================================================

/// One gate per account. Holding it serializes risk assessment, matching and
/// the exposure update of that account's orders.
#[derive(Default)]
pub struct AdmissionGates {
    gates: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl AdmissionGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// The account's gate; lock it for the duration of one admission
    pub fn gate(&self, account: &AccountId) -> Arc<Mutex<()>> {
        Arc::clone(self.gates.lock().entry(account.clone()).or_default())
    }
}

/// Releases its accounts' fences on drop
pub struct FenceGuard {
    fences: Arc<AccountFences>,
    accounts: Vec<AccountId>,
}

impl FenceGuard {
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }
}

impl Drop for FenceGuard {
    fn drop(&mut self) {
        self.fences.exit(&self.accounts);
    }
}

// ============================================================================
// Settlement Worker
// ============================================================================

/// Trades from one submit, settled in order, followed by hold release for
/// the orders that submit closed
pub struct SettlementBatch {
    pub trades: Vec<Trade>,
    pub closed_orders: Vec<(OrderId, AccountId)>,
    pub fence: FenceGuard,
}

/// Dedicated thread draining settlement batches in arrival order
pub struct SettlementWorker {
    sender: Option<Sender<SettlementBatch>>,
    handle: Option<JoinHandle<()>>,
}

impl SettlementWorker {
    pub fn spawn(processor: Arc<TradeProcessor>) -> Result<Self, VenueError> {
        let (sender, receiver) = channel::unbounded::<SettlementBatch>();

        let handle = std::thread::Builder::new()
            .name("venue-settlement".to_string())
            .spawn(move || {
                for batch in receiver.iter() {
                    for trade in batch.trades {
                        processor.settle_within_fence(trade);
                    }
                    processor.release_holds(&batch.closed_orders);
                    drop(batch.fence);
                }
                tracing::debug!("Settlement worker shutting down");
            })
            .map_err(|err| VenueError::SettlementWorker(err.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a batch; hands it back if the worker is gone
    pub fn enqueue(&self, batch: SettlementBatch) -> Result<(), SettlementBatch> {
        match &self.sender {
            Some(sender) => sender.send(batch).map_err(|err| err.into_inner()),
            None => Err(batch),
        }
    }

    /// Stop accepting batches and wait for the queue to drain
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Settlement worker panicked");
            }
        }
    }
}

impl Drop for SettlementWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
