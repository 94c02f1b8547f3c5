//! Typed fan-out event bus with explicit subscriber lifecycle.
//!
//! Built on `tokio::sync::broadcast`: every open subscription receives every
//! value published after it subscribed, in publish order. Buffering is
//! bounded with drop-oldest semantics — a subscriber that falls behind by
//! more than the bus capacity skips the overwritten events instead of
//! blocking producers.

use log::warn;
use tokio::sync::broadcast;

/// Fan-out broadcaster for one event type. Cheap to clone; clones publish
/// into the same subscriber set.
#[derive(Debug)]
pub struct EventBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        EventBus {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Creates a bus whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    /// Delivers `value` to every currently open subscription. Never blocks
    /// and never fails; returns how many subscribers will observe the value.
    pub fn publish(&self, value: T) -> usize {
        self.sender.send(value).unwrap_or(0)
    }

    /// Opens an independent event stream containing only values published
    /// after this call.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Consumer-held handle for one subscription. Closing detaches from the bus
/// without affecting other subscribers; close is idempotent.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: Option<broadcast::Receiver<T>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Waits for the next event. Lag is skipped with a warning; returns
    /// `None` once the subscription is closed or the bus is gone.
    pub async fn recv(&mut self) -> Option<T> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged on event bus, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when no event
    /// is pending.
    pub fn try_recv(&mut self) -> Option<T> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged on event bus, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }

    /// Detaches from the bus. Safe to call more than once; a publish racing
    /// with close is either delivered first or silently dropped.
    pub fn close(&mut self) {
        self.receiver = None;
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn every_subscriber_receives_every_event() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(1), 2);
        assert_eq!(bus.publish(2), 2);

        assert_eq!(first.try_recv(), Some(1));
        assert_eq!(first.try_recv(), Some(2));
        assert_eq!(second.try_recv(), Some(1));
        assert_eq!(second.try_recv(), Some(2));
        assert_eq!(first.try_recv(), None);
    }

    #[test]
    fn subscription_only_sees_events_published_after_subscribe() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut early = bus.subscribe();
        bus.publish(1);
        let mut late = bus.subscribe();
        bus.publish(2);

        assert_eq!(early.try_recv(), Some(1));
        assert_eq!(early.try_recv(), Some(2));
        assert_eq!(late.try_recv(), Some(2));
        assert_eq!(late.try_recv(), None);
    }

    #[test]
    fn close_is_idempotent_and_leaves_other_subscribers_open() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut closing = bus.subscribe();
        let mut open = bus.subscribe();

        closing.close();
        closing.close();
        assert!(closing.is_closed());
        assert_eq!(closing.try_recv(), None);

        assert_eq!(bus.publish(7), 1);
        assert_eq!(open.try_recv(), Some(7));
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus: EventBus<u32> = EventBus::new(16);
        assert_eq!(bus.publish(1), 0);
    }

    #[test]
    fn close_racing_with_publish_never_panics() {
        let bus: EventBus<u32> = EventBus::new(16);
        let publisher = bus.clone();
        let mut subscription = bus.subscribe();

        let handle = thread::spawn(move || {
            for value in 0..1000 {
                publisher.publish(value);
            }
        });
        subscription.close();
        handle.join().expect("publisher thread panicked");
        assert_eq!(subscription.try_recv(), None);
    }

    #[test]
    fn lagged_subscriber_skips_to_newest_events() {
        let bus: EventBus<u32> = EventBus::new(2);
        let mut slow = bus.subscribe();
        for value in 0..5 {
            bus.publish(value);
        }
        // Capacity 2: events 0..=2 were overwritten.
        assert_eq!(slow.try_recv(), Some(3));
        assert_eq!(slow.try_recv(), Some(4));
        assert_eq!(slow.try_recv(), None);
    }

    #[test]
    fn async_recv_returns_none_after_close() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("failed to build runtime");
        runtime.block_on(async {
            let bus: EventBus<u32> = EventBus::new(4);
            let mut subscription = bus.subscribe();
            bus.publish(5);
            assert_eq!(subscription.recv().await, Some(5));
            subscription.close();
            assert_eq!(subscription.recv().await, None);
        });
    }
}
