use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use ncl_types::ConsentUpdated;

/// Bounded single-consumer queue behind one subscription.
pub(crate) struct SubscriberQueue {
    pub(crate) id: u64,
    events: Mutex<VecDeque<ConsentUpdated>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl SubscriberQueue {
    pub(crate) fn new(id: u64, capacity: usize) -> Self {
        Self {
            id,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event, evicting the oldest one when full. Returns the
    /// evicted event, if any.
    pub(crate) fn push(&self, event: ConsentUpdated) -> Option<ConsentUpdated> {
        let evicted = {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if events.len() >= self.capacity {
                events.pop_front()
            } else {
                None
            };
            events.push_back(event);
            evicted
        };
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    pub(crate) fn pop(&self) -> Option<ConsentUpdated> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait for the next push or close. A wakeup sent while nobody was
    /// waiting is kept, so none is lost between a failed pop and the wait.
    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}
