//! Pure sequence-reordering state machine.
//!
//! [`SequenceBuffer`] holds no channels, timers, or locks: it receives one
//! sequenced frame at a time and reports what should happen as an
//! [`EnqueueOutcome`]. The owning actor in [`engine`](super::engine) turns
//! those outcomes into deliveries, log lines, and reconnect escalations,
//! which keeps every ordering rule here synchronously testable.

use std::collections::HashMap;

use serde_json::Value;

use super::OverflowPolicy;

/// One ordered delivery unit: a sequence number and its opaque payload.
pub type SequencedItem = (u64, Value);

/// What one `enqueue` call decided.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The frame (and any buffered successors) can be released in order.
    Deliver(Vec<SequencedItem>),
    /// The frame arrived ahead of a gap and was buffered.
    Buffered,
    /// The frame is stale or a duplicate of something already delivered.
    Stale,
    /// Buffer full; [`OverflowPolicy::DropIncoming`] discarded the frame.
    OverflowDropped,
    /// Buffer full; [`OverflowPolicy::ShiftOne`] released the evicted frame
    /// out of order and buffered the incoming one in its place.
    OverflowShifted {
        /// The frame forced out ahead of its turn.
        evicted: SequencedItem,
    },
    /// Buffer full; [`OverflowPolicy::RequestReconnect`] wants a session
    /// restart. The incoming frame was discarded.
    OverflowReconnect,
    /// Buffer full; [`OverflowPolicy::ThrowException`] treats this as a
    /// fatal capacity error.
    Exhausted,
}

/// Bounded out-of-order buffer with wraparound-aware sequence tracking.
#[derive(Debug)]
pub struct SequenceBuffer {
    next_expected: Option<u64>,
    pending: HashMap<u64, Value>,
    capacity: usize,
    modulus: u64,
}

impl SequenceBuffer {
    /// Create an uninitialized buffer.
    ///
    /// The first enqueued sequence becomes the session's starting point.
    /// `capacity` must be at least 1 and `max_sequence` below `2^63`; both
    /// are enforced by [`PipelineConfig`](crate::config::PipelineConfig).
    #[must_use]
    pub fn new(capacity: usize, max_sequence: u64) -> Self {
        Self {
            next_expected: None,
            pending: HashMap::new(),
            capacity,
            modulus: max_sequence + 1,
        }
    }

    /// Sequence number the buffer will release next, if initialized.
    #[must_use]
    pub fn next_expected(&self) -> Option<u64> {
        self.next_expected
    }

    /// Number of frames currently buffered ahead of a gap.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no frames are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forget all state; sequence numbers only mean something within one
    /// session, so every reconnect or resume starts from uninitialized.
    pub fn reset(&mut self) {
        self.next_expected = None;
        self.pending.clear();
    }

    /// Accept one sequenced frame and decide its fate.
    pub fn enqueue(
        &mut self,
        sequence: u64,
        payload: Value,
        policy: OverflowPolicy,
    ) -> EnqueueOutcome {
        let sequence = sequence % self.modulus;
        let next = *self.next_expected.get_or_insert(sequence);
        let diff = self.distance(next, sequence);

        if diff == 0 {
            let mut released = vec![(sequence, payload)];
            self.advance();
            self.drain_into(&mut released);
            return EnqueueOutcome::Deliver(released);
        }
        if diff >= self.modulus / 2 {
            // Behind under wraparound comparison: a retransmission of
            // something already released.
            return EnqueueOutcome::Stale;
        }
        if self.pending.len() < self.capacity || self.pending.contains_key(&sequence) {
            self.pending.insert(sequence, payload);
            return EnqueueOutcome::Buffered;
        }

        match policy {
            OverflowPolicy::DropIncoming => EnqueueOutcome::OverflowDropped,
            OverflowPolicy::ShiftOne => self.shift_one(sequence, payload),
            OverflowPolicy::ThrowException => EnqueueOutcome::Exhausted,
            OverflowPolicy::RequestReconnect => EnqueueOutcome::OverflowReconnect,
        }
    }

    /// Abandon the current gap: jump `next_expected` to the nearest
    /// buffered sequence and release everything contiguous from there.
    pub fn skip_missing(&mut self) -> Vec<SequencedItem> {
        let Some(next) = self.next_expected else {
            return Vec::new();
        };
        let Some(closest) = self.closest_pending(next) else {
            return Vec::new();
        };
        self.next_expected = Some(closest);
        let mut released = Vec::new();
        self.drain_into(&mut released);
        released
    }

    /// Circular distance from `from` to `to` under the session modulus.
    fn distance(&self, from: u64, to: u64) -> u64 {
        (to + self.modulus - from) % self.modulus
    }

    /// Buffered sequence with the smallest circular distance from `from`.
    fn closest_pending(&self, from: u64) -> Option<u64> {
        self.pending
            .keys()
            .copied()
            .min_by_key(|seq| self.distance(from, *seq))
    }

    fn advance(&mut self) {
        if let Some(next) = self.next_expected {
            self.next_expected = Some((next + 1) % self.modulus);
        }
    }

    /// Release buffered frames for as long as they stay contiguous.
    fn drain_into(&mut self, released: &mut Vec<SequencedItem>) {
        while let Some(next) = self.next_expected {
            match self.pending.remove(&next) {
                Some(payload) => {
                    released.push((next, payload));
                    self.advance();
                }
                None => break,
            }
        }
    }

    /// Evict the oldest outstanding frame to make room for the new one.
    fn shift_one(&mut self, sequence: u64, payload: Value) -> EnqueueOutcome {
        let next = self.next_expected.unwrap_or(sequence);
        let Some(oldest) = self.closest_pending(next) else {
            // Capacity is at least 1, so a full buffer always has a victim;
            // fall back to buffering if that ever stops holding.
            self.pending.insert(sequence, payload);
            return EnqueueOutcome::Buffered;
        };
        let Some(evicted) = self.pending.remove(&oldest) else {
            self.pending.insert(sequence, payload);
            return EnqueueOutcome::Buffered;
        };
        self.pending.insert(sequence, payload);
        EnqueueOutcome::OverflowShifted {
            evicted: (oldest, evicted),
        }
    }
}
