//! UI-thread marshalling contract.
//!
//! All view-state mutation must run on one logical UI context. Concurrent
//! tasks that discover the need for a mutation enqueue a callback here
//! instead of mutating directly; enqueue is non-blocking and callbacks run
//! in enqueue order.

use std::sync::Mutex;

use log::warn;
use tokio::sync::mpsc;

/// A deferred view mutation.
pub type UiCallback = Box<dyn FnOnce() + Send>;

/// Single logical execution context for view mutations. Implementations
/// wrap the toolkit's event loop (e.g. an `invoke_from_event_loop`-style
/// entry point); [`EventLoopQueue`] is the toolkit-free implementation.
pub trait UiMarshaller: Send + Sync {
    /// Schedules `callback` on the UI-thread context. Must not block the
    /// caller beyond enqueueing.
    fn enqueue(&self, callback: UiCallback);
}

/// Queue-backed marshaller pumped by the embedder's frame loop.
///
/// Producers enqueue from any thread; the owner of the UI context calls
/// [`process_pending`](Self::process_pending) once per frame. Callbacks must
/// not pump the queue themselves.
pub struct EventLoopQueue {
    sender: mpsc::UnboundedSender<UiCallback>,
    receiver: Mutex<mpsc::UnboundedReceiver<UiCallback>>,
}

impl EventLoopQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        EventLoopQueue {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Runs every queued callback in enqueue order, including callbacks
    /// enqueued while processing. Returns how many ran.
    pub fn process_pending(&self) -> usize {
        let mut receiver = self.receiver.lock().expect("ui queue lock poisoned");
        let mut ran = 0;
        while let Ok(callback) = receiver.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }
}

impl Default for EventLoopQueue {
    fn default() -> Self {
        EventLoopQueue::new()
    }
}

impl UiMarshaller for EventLoopQueue {
    fn enqueue(&self, callback: UiCallback) {
        if self.sender.send(callback).is_err() {
            warn!("UI queue receiver gone, dropping callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::thread;

    #[test]
    fn callbacks_run_in_enqueue_order() {
        let queue = EventLoopQueue::new();
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        for value in 0..5 {
            let seen = Arc::clone(&seen);
            queue.enqueue(Box::new(move || {
                seen.lock().expect("seen lock poisoned").push(value);
            }));
        }
        assert_eq!(queue.process_pending(), 5);
        assert_eq!(*seen.lock().expect("seen lock poisoned"), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn enqueue_from_other_threads_is_non_blocking() {
        let queue = Arc::new(EventLoopQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let counter = Arc::clone(&counter);
                        queue.enqueue(Box::new(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread panicked");
        }

        assert_eq!(queue.process_pending(), 200);
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn callbacks_enqueued_while_processing_run_same_pass() {
        let queue = Arc::new(EventLoopQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue_inner = Arc::clone(&queue);
            let counter_inner = Arc::clone(&counter);
            queue.enqueue(Box::new(move || {
                let counter = Arc::clone(&counter_inner);
                queue_inner.enqueue(Box::new(move || {
                    counter.fetch_add(10, Ordering::SeqCst);
                }));
                counter_inner.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(queue.process_pending(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }
}
