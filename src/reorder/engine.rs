//! Single-owner actor that serializes all reorder state mutation.
//!
//! Producers may call [`ReorderHandle::enqueue`] from many tasks at once;
//! the engine receives every command and its own stall deadline through one
//! `tokio::select!` loop, so the [`SequenceBuffer`] is only ever touched
//! from this task. Deliveries are written to the conduit after each
//! decision, and each `enqueue` is acknowledged once its command has been
//! processed so callers observe policy errors and capacity bounds
//! synchronously.

use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Duration, Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    OverflowPolicy, WaitTimeoutPolicy,
    buffer::{EnqueueOutcome, SequenceBuffer, SequencedItem},
};
use crate::config::PipelineConfig;

/// Why the engine asked for a session restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectReason {
    /// The out-of-order buffer overflowed under
    /// [`OverflowPolicy::RequestReconnect`].
    BufferOverflow,
    /// A gap outlived the stall timer under
    /// [`WaitTimeoutPolicy::RequestReconnect`].
    WaitTimeout,
}

/// Escalation raised when the engine cannot recover a gap locally.
///
/// Consumed by the external connection manager, which is expected to
/// re-establish the session and [`reset`](ReorderHandle::reset) the engine.
#[derive(Clone, Debug)]
pub struct ReconnectSignal {
    /// What gave up.
    pub reason: ReconnectReason,
    /// Human-readable cause for logs and diagnostics.
    pub detail: String,
}

/// Errors surfaced to `enqueue` callers.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReorderError {
    /// The buffer filled up under [`OverflowPolicy::ThrowException`].
    #[error("reorder buffer exhausted at capacity {capacity}")]
    BufferExhausted {
        /// Configured buffer capacity.
        capacity: usize,
    },
    /// The engine task has stopped.
    #[error("reorder engine stopped")]
    EngineStopped,
}

enum Command {
    Enqueue {
        sequence: u64,
        payload: Value,
        ack: oneshot::Sender<Result<(), ReorderError>>,
    },
    Reset,
}

/// Cloneable producer-side handle to the engine actor.
#[derive(Clone)]
pub struct ReorderHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ReorderHandle {
    /// Submit one sequenced frame and wait for the engine to process it.
    ///
    /// The returned future resolves as soon as the engine has decided the
    /// frame's fate; it does not wait for the downstream sink to run.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError::BufferExhausted`] when the buffer is full
    /// under [`OverflowPolicy::ThrowException`], or
    /// [`ReorderError::EngineStopped`] if the engine task is gone.
    pub async fn enqueue(&self, sequence: u64, payload: Value) -> Result<(), ReorderError> {
        let (ack, acked) = oneshot::channel();
        self.commands
            .send(Command::Enqueue {
                sequence,
                payload,
                ack,
            })
            .map_err(|_| ReorderError::EngineStopped)?;
        acked.await.map_err(|_| ReorderError::EngineStopped)?
    }

    /// Return the engine to its uninitialized state for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError::EngineStopped`] if the engine task is gone.
    pub fn reset(&self) -> Result<(), ReorderError> {
        self.commands
            .send(Command::Reset)
            .map_err(|_| ReorderError::EngineStopped)
    }
}

/// Actor owning the [`SequenceBuffer`] for one gateway session.
pub struct ReorderEngine {
    buffer: SequenceBuffer,
    overflow_policy: OverflowPolicy,
    wait_timeout: Option<Duration>,
    wait_timeout_policy: WaitTimeoutPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    deliveries: mpsc::UnboundedSender<SequencedItem>,
    reconnect: mpsc::UnboundedSender<ReconnectSignal>,
    /// Single outstanding stall deadline; arming while set is a no-op.
    deadline: Option<Instant>,
    shutdown: CancellationToken,
}

impl ReorderEngine {
    /// Spawn the engine task for a session.
    ///
    /// `deliveries` is the producer side of the delivery conduit and
    /// `reconnect` the escalation channel consumed by the connection
    /// manager. The task exits when `shutdown` is cancelled or every
    /// [`ReorderHandle`] clone is dropped.
    #[must_use]
    pub fn spawn(
        config: &PipelineConfig,
        deliveries: mpsc::UnboundedSender<SequencedItem>,
        reconnect: mpsc::UnboundedSender<ReconnectSignal>,
        shutdown: CancellationToken,
    ) -> (ReorderHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            buffer: SequenceBuffer::new(config.buffer_capacity, config.max_sequence),
            overflow_policy: config.overflow_policy,
            wait_timeout: config.wait_timeout,
            wait_timeout_policy: config.wait_timeout_policy,
            commands: rx,
            deliveries,
            reconnect,
            deadline: None,
            shutdown,
        };
        let task = tokio::spawn(engine.run());
        (ReorderHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    debug!("reorder engine shutting down");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                () = Self::wait(self.deadline), if self.deadline.is_some() => {
                    self.handle_timeout();
                }
            }
        }
    }

    async fn wait(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue {
                sequence,
                payload,
                ack,
            } => {
                let result = self.enqueue(sequence, payload);
                // A dropped ack means the producer gave up waiting; the
                // frame has already been handled either way.
                let _ = ack.send(result);
            }
            Command::Reset => {
                debug!("reorder state reset for new session");
                self.buffer.reset();
                self.deadline = None;
            }
        }
    }

    fn enqueue(&mut self, sequence: u64, payload: Value) -> Result<(), ReorderError> {
        match self.buffer.enqueue(sequence, payload, self.overflow_policy) {
            EnqueueOutcome::Deliver(items) => {
                self.deliver(items);
                if self.buffer.is_empty() {
                    self.deadline = None;
                }
                Ok(())
            }
            EnqueueOutcome::Buffered => {
                debug!(
                    sequence,
                    pending = self.buffer.pending_len(),
                    "frame buffered ahead of gap"
                );
                self.arm_timer();
                Ok(())
            }
            EnqueueOutcome::Stale => {
                debug!(sequence, "stale or duplicate frame dropped");
                Ok(())
            }
            EnqueueOutcome::OverflowDropped => {
                warn!(sequence, "reorder buffer full; incoming frame dropped");
                self.arm_timer();
                Ok(())
            }
            EnqueueOutcome::OverflowShifted { evicted } => {
                warn!(
                    sequence,
                    evicted = evicted.0,
                    "reorder buffer full; releasing frame out of order"
                );
                self.deliver(vec![evicted]);
                self.arm_timer();
                Ok(())
            }
            EnqueueOutcome::OverflowReconnect => {
                self.escalate(
                    ReconnectReason::BufferOverflow,
                    format!("buffer full at capacity {}", self.buffer.pending_len()),
                );
                self.arm_timer();
                Ok(())
            }
            EnqueueOutcome::Exhausted => Err(ReorderError::BufferExhausted {
                capacity: self.buffer.pending_len(),
            }),
        }
    }

    fn handle_timeout(&mut self) {
        self.deadline = None;
        match self.wait_timeout_policy {
            WaitTimeoutPolicy::SkipMissing => {
                let expected = self.buffer.next_expected();
                let released = self.buffer.skip_missing();
                if let Some((first, _)) = released.first() {
                    warn!(
                        expected = ?expected,
                        resumed_at = first,
                        released = released.len(),
                        "gap outlived wait timeout; skipping missing frames"
                    );
                }
                self.deliver(released);
                if !self.buffer.is_empty() {
                    self.arm_timer();
                }
            }
            WaitTimeoutPolicy::RequestReconnect => {
                // Buffer and expected sequence stay untouched; recovery is
                // the connection manager's job from here.
                self.escalate(
                    ReconnectReason::WaitTimeout,
                    format!("gap at {:?} outlived wait timeout", self.buffer.next_expected()),
                );
            }
        }
    }

    fn deliver(&mut self, items: Vec<SequencedItem>) {
        for item in items {
            if self.deliveries.send(item).is_err() {
                debug!("delivery conduit closed; dropping remaining releases");
                return;
            }
        }
    }

    fn escalate(&mut self, reason: ReconnectReason, detail: String) {
        warn!(?reason, detail = %detail, "requesting session reconnect");
        if self
            .reconnect
            .send(ReconnectSignal { reason, detail })
            .is_err()
        {
            warn!("reconnect signal receiver dropped; escalation lost");
        }
    }

    fn arm_timer(&mut self) {
        if self.deadline.is_none()
            && !self.buffer.is_empty()
            && let Some(timeout) = self.wait_timeout
        {
            self.deadline = Some(Instant::now() + timeout);
        }
    }
}
