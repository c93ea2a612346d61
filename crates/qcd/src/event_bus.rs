//! In-process fan-out of lifecycle events.
//!
//! Publish never blocks: each subscriber gets an unbounded channel, and a
//! disconnected receiver is pruned on the next publish. A slow subscriber
//! therefore buffers, it cannot stall run execution.

use qc_core::events::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<Event>>>>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .expect("event bus subscribers poisoned")
            .push(tx);
        rx
    }

    /// Deliver to every live subscriber, pruning dead ones.
    pub fn publish(&self, event: &Event) {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("event bus subscribers poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Monotonic id for the next event published through this bus.
    pub fn next_event_id(&self) -> qc_core::types::EventId {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        qc_core::types::EventId(format!("E-{n:08}"))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus subscribers poisoned")
            .len()
    }
}
