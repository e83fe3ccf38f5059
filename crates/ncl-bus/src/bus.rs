use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use ncl_types::ConsentUpdated;

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::filter::EventFilter;
use crate::queue::SubscriberQueue;
use crate::subscription::Subscription;

/// Outcome of one [`EventBus::publish`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Events released to subscribers by this call (0 if the event is held).
    pub released: usize,
    /// Subscriber deliveries made.
    pub delivered: usize,
    /// Older events evicted from full subscriber queues.
    pub dropped: usize,
    /// Events still waiting in the reorder buffer.
    pub held: usize,
    /// Missing sequences given up on by this call.
    pub skipped: u64,
}

struct Subscriber {
    filter: EventFilter,
    queue: Weak<SubscriberQueue>,
}

struct BusState {
    /// Lowest sequence not yet released.
    next_sequence: u64,
    held: BTreeMap<u64, ConsentUpdated>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    closed: bool,
}

/// Fan-out of committed consent updates to subscribers.
///
/// Publishing never waits on a subscriber: each one has a bounded queue and
/// loses its oldest event on overflow. Events leave the bus in sequence
/// order; an event ahead of a missing sequence waits in a reorder buffer
/// until the gap fills or the buffer exceeds `reorder_window`.
pub struct EventBus {
    config: BusConfig,
    state: Mutex<BusState>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// A bus whose first expected event has sequence `next_sequence`.
    pub fn new(config: BusConfig, next_sequence: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(BusState {
                next_sequence,
                held: BTreeMap::new(),
                subscribers: Vec::new(),
                next_subscriber_id: 1,
                closed: false,
            }),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Register a subscriber.
    pub fn subscribe(&self, filter: EventFilter) -> Result<Subscription> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;

        let queue = Arc::new(SubscriberQueue::new(id, self.config.capacity));
        let after_sequence = filter.after_sequence;
        state.subscribers.push(Subscriber {
            filter,
            queue: Arc::downgrade(&queue),
        });
        debug!(subscriber = id, "subscriber registered");
        Ok(Subscription::new(queue, after_sequence))
    }

    /// Publish an update. Events already released are delivered again.
    pub fn publish(&self, event: ConsentUpdated) -> Result<PublishReport> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut report = PublishReport::default();
        let mut ready = Vec::new();
        let sequence = event.sequence;

        if sequence < state.next_sequence {
            ready.push(event);
        } else {
            state.held.insert(sequence, event);
            Self::release_contiguous(&mut state, &mut ready);

            if state.held.len() > self.config.reorder_window {
                let from = state.next_sequence;
                let held = std::mem::take(&mut state.held);
                let mut expected = from;
                for (seq, event) in held {
                    report.skipped += seq - expected;
                    expected = seq + 1;
                    ready.push(event);
                }
                state.next_sequence = expected;
                warn!(
                    from,
                    to = expected - 1,
                    skipped = report.skipped,
                    "reorder window exceeded; releasing past missing sequences"
                );
            }
        }

        report.released = ready.len();
        report.held = state.held.len();
        for event in &ready {
            self.deliver(&mut state, event, &mut report);
        }

        debug!(
            sequence,
            released = report.released,
            delivered = report.delivered,
            held = report.held,
            "event published"
        );
        Ok(report)
    }

    fn release_contiguous(state: &mut BusState, ready: &mut Vec<ConsentUpdated>) {
        while let Some(event) = state.held.remove(&state.next_sequence) {
            state.next_sequence += 1;
            ready.push(event);
        }
    }

    /// Route an event to all matching subscribers, pruning closed ones.
    fn deliver(&self, state: &mut BusState, event: &ConsentUpdated, report: &mut PublishReport) {
        state.subscribers.retain(|sub| {
            let Some(queue) = sub.queue.upgrade() else {
                return false;
            };
            if sub.filter.matches(event) {
                report.delivered += 1;
                if let Some(evicted) = queue.push(event.clone()) {
                    report.dropped += 1;
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = queue.id,
                        evicted = evicted.sequence,
                        capacity = self.config.capacity,
                        "subscriber queue full; dropped oldest event"
                    );
                }
            }
            true
        });
    }

    /// Stop accepting events and wake every subscriber. Queued events can
    /// still be drained. Held events are released first.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        let held = std::mem::take(&mut state.held);
        let mut report = PublishReport::default();
        for event in held.values() {
            self.deliver(&mut state, event, &mut report);
        }
        state.closed = true;
        for sub in state.subscribers.drain(..) {
            if let Some(queue) = sub.queue.upgrade() {
                queue.close();
            }
        }
        info!(
            published = self.published.load(Ordering::Relaxed),
            dropped = self.dropped_events(),
            "event bus closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state()
            .subscribers
            .iter()
            .filter(|sub| sub.queue.strong_count() > 0)
            .count()
    }

    /// Events evicted from subscriber queues since the bus started.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn published_events(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Lowest sequence not yet released.
    pub fn next_sequence(&self) -> u64 {
        self.state().next_sequence
    }

    /// Events waiting in the reorder buffer.
    pub fn held_events(&self) -> usize {
        self.state().held.len()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
