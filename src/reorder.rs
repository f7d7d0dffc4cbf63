//! Sequence reordering for the gateway event stream.
//!
//! The transport may deliver event frames out of order, duplicated, or not
//! at all. This module restores a gap-free, strictly ordered stream: a pure
//! [`SequenceBuffer`] state machine decides what each incoming frame means,
//! and a single-owner [`engine`] actor serializes every mutation, applies
//! the overflow and stall-timeout policies, and escalates to the connection
//! manager when it cannot recover a gap locally.

pub mod buffer;
pub mod engine;

pub use buffer::{EnqueueOutcome, SequenceBuffer, SequencedItem};
pub use engine::{ReconnectReason, ReconnectSignal, ReorderEngine, ReorderError, ReorderHandle};

#[cfg(test)]
mod tests;

/// Behaviour when the out-of-order buffer is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the incoming frame and leave the buffer unchanged.
    DropIncoming,
    /// Release the buffered frame nearest the expected sequence, out of
    /// order, and buffer the incoming frame in its place.
    ///
    /// This is the one policy permitted to violate strict ordering; it
    /// trades the guarantee for a hard memory bound.
    ShiftOne,
    /// Treat a full buffer as a fatal capacity misconfiguration.
    ThrowException,
    /// Ask the connection manager to restart the session and discard the
    /// incoming frame.
    RequestReconnect,
}

/// Behaviour when a gap persists past the configured wait timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitTimeoutPolicy {
    /// Abandon the gap as lost: jump to the nearest buffered sequence and
    /// resume in-order delivery from there.
    SkipMissing,
    /// Ask the connection manager to restart the session, leaving the
    /// buffer untouched for the resume to replay.
    RequestReconnect,
}
