//! Event Bus (C6): in-process multi-topic pub/sub keyed by subscription id.
//!
//! Topics are per-subscription bounded `mpsc` channels. Publishing is
//! non-blocking: a full channel means a slow subscriber, and the event is
//! dropped for that subscriber and logged rather than backpressuring the
//! publisher. The registry lock is only ever held for synchronous map
//! operations, never across a send.

use crate::events::Event;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Minimum channel capacity per subscriber, per the bus contract.
pub const MIN_CHANNEL_CAPACITY: usize = 100;

/// A subscriber's receiving half, returned from [`EventBus::subscribe`].
pub type Subscriber = mpsc::Receiver<Event>;

/// `dashmap`-backed subscriber registry.
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<u64, mpsc::Sender<Event>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Registers a new subscriber channel for `subscription_id`, replacing
    /// any existing one. `capacity` is clamped up to
    /// [`MIN_CHANNEL_CAPACITY`].
    pub fn subscribe(&self, subscription_id: u64, capacity: usize) -> Subscriber {
        let (tx, rx) = mpsc::channel(capacity.max(MIN_CHANNEL_CAPACITY));
        self.subscribers.insert(subscription_id, tx);
        rx
    }

    /// Removes `subscription_id`'s channel, dropping the sender and closing
    /// the receiver side for any in-flight recv.
    pub fn unsubscribe(&self, subscription_id: u64) {
        self.subscribers.remove(&subscription_id);
    }

    /// `true` if `subscription_id` currently has a registered subscriber.
    #[must_use]
    pub fn is_subscribed(&self, subscription_id: u64) -> bool {
        self.subscribers.contains_key(&subscription_id)
    }

    /// Publishes `event` to its subscriber, if any. Non-blocking: a full
    /// channel drops the event and logs rather than waiting. Returns `true`
    /// if the event was enqueued.
    pub fn publish(&self, subscription_id: u64, event: Event) -> bool {
        let Some(sender) = self.subscribers.get(&subscription_id) else {
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscription_id, "event bus channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                drop(sender);
                self.subscribers.remove(&subscription_id);
                false
            }
        }
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_delivers_in_fifo_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(1, MIN_CHANNEL_CAPACITY);

        for i in 0..5 {
            bus.publish(1, Event::fetch_start(1, Utc::now()));
            let _ = i;
        }

        let mut received = 0;
        while received < 5 {
            rx.recv().await.unwrap();
            received += 1;
        }
    }

    #[tokio::test]
    async fn publish_to_unknown_subscription_is_a_noop() {
        let bus = EventBus::new();
        assert!(!bus.publish(999, Event::fetch_start(999, Utc::now())));
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let bus = EventBus::new();
        let _rx = bus.subscribe(1, MIN_CHANNEL_CAPACITY);

        for _ in 0..MIN_CHANNEL_CAPACITY {
            bus.publish(1, Event::fetch_start(1, Utc::now()));
        }
        let delivered = bus.publish(1, Event::fetch_start(1, Utc::now()));
        assert!(!delivered);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_channel() {
        let bus = EventBus::new();
        let _rx = bus.subscribe(1, MIN_CHANNEL_CAPACITY);
        assert!(bus.is_subscribed(1));

        bus.unsubscribe(1);
        assert!(!bus.is_subscribed(1));
        assert!(!bus.publish(1, Event::fetch_start(1, Utc::now())));
    }

    #[tokio::test]
    async fn channel_capacity_is_floored() {
        let bus = EventBus::new();
        let _rx = bus.subscribe(1, 1);

        let mut delivered = 0;
        for _ in 0..MIN_CHANNEL_CAPACITY {
            if bus.publish(1, Event::fetch_start(1, Utc::now())) {
                delivered += 1;
            }
        }
        assert_eq!(delivered, MIN_CHANNEL_CAPACITY);
    }
}
