//! Pending offline payloads.
//!
//! Payloads posted by pages while offline wait here for replay. The queue
//! lives for the proxy's process lifetime only; nothing survives a restart.

use std::collections::VecDeque;

use serde_json::Value as JsonValue;
use tracing::warn;

/// Default queue capacity.
pub const DEFAULT_PENDING_CAPACITY: usize = 64;

/// Bounded FIFO of payloads awaiting replay.
///
/// Created empty at proxy construction, appended to on page messages, and
/// drained only by the external replay collaborator via [`drain`].
///
/// [`drain`]: PendingQueue::drain
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<JsonValue>,
    capacity: usize,
    dropped: u64,
}

impl PendingQueue {
    /// Create an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append a payload; at capacity the oldest payload is dropped.
    pub fn push(&mut self, payload: JsonValue) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.dropped += 1;
            warn!(
                capacity = self.capacity,
                dropped = self.dropped,
                "Pending queue full, dropped oldest payload"
            );
        }
        self.items.push_back(payload);
    }

    /// Number of queued payloads.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Payloads dropped to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Hand over all queued payloads, oldest first, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<JsonValue> {
        self.items.drain(..).collect()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}
