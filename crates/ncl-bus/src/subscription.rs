use std::collections::VecDeque;
use std::sync::Arc;

use ncl_types::ConsentUpdated;

use crate::error::TryRecvError;
use crate::queue::SubscriberQueue;

/// Receiving end of a bus subscription.
///
/// Yields updates in strictly increasing sequence order: anything at or
/// below the last yielded sequence (a redelivery, or an event already
/// served from the backlog) is discarded. Dropping the subscription
/// unregisters it on the bus's next publish.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
    backlog: VecDeque<ConsentUpdated>,
    last_sequence: Option<u64>,
}

impl Subscription {
    pub(crate) fn new(queue: Arc<SubscriberQueue>, after_sequence: Option<u64>) -> Self {
        Self {
            queue,
            backlog: VecDeque::new(),
            last_sequence: after_sequence,
        }
    }

    /// Serve `events` (already committed, in sequence order) before
    /// anything from the live queue.
    pub fn with_backlog(mut self, events: impl IntoIterator<Item = ConsentUpdated>) -> Self {
        self.backlog.extend(events);
        self
    }

    /// Wait for the next update. Returns `None` once the bus is closed and
    /// everything queued has been drained.
    pub async fn recv(&mut self) -> Option<ConsentUpdated> {
        loop {
            if let Some(event) = self.next_ready() {
                return Some(event);
            }
            if self.queue.is_closed() {
                return None;
            }
            self.queue.wait().await;
        }
    }

    /// Take the next update without waiting.
    pub fn try_recv(&mut self) -> Result<ConsentUpdated, TryRecvError> {
        match self.next_ready() {
            Some(event) => Ok(event),
            None if self.queue.is_closed() => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Events this subscriber lost to queue overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Sequence of the last update yielded (or the starting point).
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Updates waiting to be received, including redeliveries that will be
    /// discarded.
    pub fn pending(&self) -> usize {
        self.backlog.len() + self.queue.len()
    }

    fn next_ready(&mut self) -> Option<ConsentUpdated> {
        loop {
            let event = match self.backlog.pop_front() {
                Some(event) => event,
                None => self.queue.pop()?,
            };
            if self.last_sequence.is_some_and(|last| event.sequence <= last) {
                continue;
            }
            self.last_sequence = Some(event.sequence);
            return Some(event);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.queue.id)
            .field("last_sequence", &self.last_sequence)
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .finish()
    }
}
