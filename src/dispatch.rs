//! Delivery conduit between the reorder engine and the downstream sink.
//!
//! The conduit is an unbounded, order-preserving MPSC channel: the engine
//! (and only the engine) writes released frames, and exactly one dispatch
//! task reads them and invokes the [`EventSink`] per item in FIFO order. A
//! sink failure is logged and the loop continues; closing every sender lets
//! the task drain whatever remains and exit on its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::reorder::SequencedItem;

/// Error type returned by [`EventSink`] implementations.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Downstream consumer of the ordered event stream.
///
/// Implemented by the SDK's event dispatcher; invoked once per frame, in
/// strictly ascending modular sequence order (except under
/// [`OverflowPolicy::ShiftOne`](crate::reorder::OverflowPolicy::ShiftOne)).
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Handle one ordered event payload.
    ///
    /// # Errors
    ///
    /// Errors are logged with the offending sequence number and do not
    /// stop dispatch.
    async fn deliver(&self, sequence: u64, payload: Value) -> Result<(), SinkError>;
}

/// Create the conduit pair wired between the engine and the dispatch task.
pub(crate) fn conduit() -> (
    mpsc::UnboundedSender<SequencedItem>,
    mpsc::UnboundedReceiver<SequencedItem>,
) {
    mpsc::unbounded_channel()
}

/// Drain the conduit, invoking the sink for each frame in order.
///
/// Runs until every sender is dropped; no in-flight sink invocation is
/// aborted.
pub(crate) async fn run(
    mut conduit: mpsc::UnboundedReceiver<SequencedItem>,
    sink: Arc<dyn EventSink>,
) {
    while let Some((sequence, payload)) = conduit.recv().await {
        if let Err(error) = sink.deliver(sequence, payload).await {
            warn!(sequence, %error, "event sink failed; continuing dispatch");
        }
    }
    debug!("delivery conduit closed; dispatch task exiting");
}
