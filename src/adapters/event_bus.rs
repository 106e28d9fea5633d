// ============================================================================
// Event Bus
// Bounded fan-out to subscribers; a full subscriber loses events, never
// blocks the publisher
// ============================================================================

use crate::interfaces::{EventSink, VenueEvent};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

struct Subscriber {
    id: u64,
    name: String,
    sender: Sender<VenueEvent>,
    dropped: u64,
}

/// Receiving end handed to a subscriber
pub struct EventSubscription {
    id: u64,
    receiver: Receiver<VenueEvent>,
}

impl EventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn receiver(&self) -> &Receiver<VenueEvent> {
        &self.receiver
    }

    /// Everything currently queued
    pub fn drain(&self) -> Vec<VenueEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<VenueEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, name: impl Into<String>) -> EventSubscription {
        let (sender, receiver) = channel::bounded(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();

        tracing::debug!(subscriber = %name, id, "Event subscriber added");
        self.subscribers.lock().push(Subscriber {
            id,
            name,
            sender,
            dropped: 0,
        });

        EventSubscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Events dropped for one subscriber because its queue was full
    pub fn dropped(&self, id: u64) -> Option<u64> {
        self.subscribers
            .lock()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.dropped)
    }

    pub fn total_dropped(&self) -> u64 {
        self.subscribers.lock().iter().map(|s| s.dropped).sum()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: VenueEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.lock();
        subscribers.retain_mut(|subscriber| {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    if subscriber.dropped == 0 {
                        tracing::warn!(subscriber = %subscriber.name, "Subscriber lagging, dropping events");
                    }
                    subscriber.dropped += 1;
                    true
                },
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!(subscriber = %subscriber.name, "Removing disconnected subscriber");
                    false
                },
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, TradeId};
    use crate::interfaces::RiskEvent;

    fn event() -> VenueEvent {
        VenueEvent::Risk(RiskEvent::CheckFailed {
            order_id: OrderId::new(),
            account_id: "a".into(),
            symbol: "BTC-USD".into(),
            check: crate::domain::RiskCheck::failed(
                crate::domain::RiskCheckKind::DailyVolume,
                TradeId::new().to_string(),
            ),
        })
    }

    #[test]
    fn test_fan_out_in_order() {
        let bus = EventBus::new(8);
        let first = bus.subscribe("first");
        let second = bus.subscribe("second");

        let events = vec![event(), event()];
        bus.publish_all(events.clone());

        assert_eq!(first.drain(), events);
        assert_eq!(second.drain(), events);
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_slow_subscriber_is_dropped_and_counted() {
        let bus = EventBus::new(2);
        let slow = bus.subscribe("slow");

        for _ in 0..5 {
            bus.publish(event());
        }

        assert_eq!(slow.drain().len(), 2);
        assert_eq!(bus.dropped(slow.id()), Some(3));
        assert_eq!(bus.total_dropped(), 3);
    }

    #[test]
    fn test_disconnected_subscriber_removed() {
        let bus = EventBus::new(2);
        let gone = bus.subscribe("gone");
        let _kept = bus.subscribe("kept");
        drop(gone);

        bus.publish(event());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new(2);
        let subscription = bus.subscribe("a");
        assert!(bus.unsubscribe(subscription.id()));
        assert!(!bus.unsubscribe(subscription.id()));
    }
}
