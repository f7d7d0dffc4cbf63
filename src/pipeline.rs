//! Wiring façade tying the codec, reorder engine, and dispatch together.
//!
//! [`GatewayPipeline::start`] spawns the engine actor and the dispatch task
//! and hands back the pipeline plus the [`ReconnectSignals`] stream for the
//! connection manager. Transports feed raw frames through
//! [`GatewayPipeline::feed`]; webhook callers additionally write the
//! returned challenge body back as the HTTP response.

use std::sync::Arc;

use log::info;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    codec::{Decoded, EnvelopeCodec},
    config::PipelineConfig,
    dispatch::{self, EventSink},
    frame::{ChallengeReply, Opcode, RawFrame},
    reorder::{ReconnectSignal, ReorderEngine, ReorderError, ReorderHandle},
};

/// What [`GatewayPipeline::feed`] did with one raw frame.
#[derive(Debug)]
pub enum FeedOutcome {
    /// Sequenced event accepted by the reorder engine.
    Accepted,
    /// Verified webhook challenge; the string is the exact HTTP response
    /// body for the triggering request.
    ChallengeReply(String),
    /// Session control frame, surfaced for the connection manager.
    Control {
        /// Signal opcode of the frame.
        opcode: Opcode,
        /// Opaque control payload.
        payload: serde_json::Value,
    },
    /// Malformed or undecryptable frame, dropped and logged.
    Discarded,
}

/// Errors surfaced by [`GatewayPipeline::feed`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FeedError {
    /// The webhook challenge failed verification; no response body may be
    /// emitted for the request.
    #[error("challenge verification failed")]
    ChallengeVerification,
    /// The reorder engine refused the frame.
    #[error(transparent)]
    Reorder(#[from] ReorderError),
}

/// Receiver side of the reconnect escalation channel.
pub struct ReconnectSignals {
    signals: mpsc::UnboundedReceiver<ReconnectSignal>,
}

impl ReconnectSignals {
    /// Wait for the next escalation; `None` once the pipeline has shut
    /// down.
    pub async fn recv(&mut self) -> Option<ReconnectSignal> {
        self.signals.recv().await
    }
}

/// Gateway frame ingestion pipeline for one session.
///
/// Cheap to share: transports hold the pipeline behind an `Arc` and call
/// [`feed`](Self::feed) concurrently; the engine actor linearizes them.
pub struct GatewayPipeline {
    codec: EnvelopeCodec,
    reorder: ReorderHandle,
    shutdown: CancellationToken,
    engine_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

impl GatewayPipeline {
    /// Spawn the pipeline tasks for one gateway session.
    ///
    /// Returns the pipeline and the escalation stream the connection
    /// manager must consume.
    #[must_use]
    pub fn start(config: &PipelineConfig, sink: Arc<dyn EventSink>) -> (Self, ReconnectSignals) {
        let (delivery_tx, delivery_rx) = dispatch::conduit();
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let (reorder, engine_task) =
            ReorderEngine::spawn(config, delivery_tx, reconnect_tx, shutdown.clone());
        let dispatch_task = tokio::spawn(dispatch::run(delivery_rx, sink));
        info!(
            "gateway pipeline started: capacity={}, max_sequence={}",
            config.buffer_capacity, config.max_sequence
        );

        (
            Self {
                codec: EnvelopeCodec::new(config),
                reorder,
                shutdown,
                engine_task,
                dispatch_task,
            },
            ReconnectSignals {
                signals: reconnect_rx,
            },
        )
    }

    /// Ingest one raw transport frame.
    ///
    /// Frame-level decode failures are dropped and logged here, never
    /// surfaced: the transport keeps feeding regardless of individual bad
    /// frames.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ChallengeVerification`] when a webhook
    /// challenge carries the wrong verify token, and
    /// [`FeedError::Reorder`] when the engine is stopped or rejects the
    /// frame under [`OverflowPolicy::ThrowException`](crate::reorder::OverflowPolicy::ThrowException).
    pub async fn feed(&self, frame: RawFrame) -> Result<FeedOutcome, FeedError> {
        match self.codec.decode(frame) {
            Ok(Decoded::Event { sequence, payload }) => {
                self.reorder.enqueue(sequence, payload).await?;
                Ok(FeedOutcome::Accepted)
            }
            Ok(Decoded::Challenge(challenge)) => {
                let body = ChallengeReply { challenge }.to_body();
                Ok(FeedOutcome::ChallengeReply(body))
            }
            Ok(Decoded::Control { opcode, payload }) => {
                debug!(?opcode, "control frame passed through");
                Ok(FeedOutcome::Control { opcode, payload })
            }
            Err(error) if error.is_recoverable() => {
                warn!(%error, "dropping undecodable frame");
                Ok(FeedOutcome::Discarded)
            }
            Err(_) => Err(FeedError::ChallengeVerification),
        }
    }

    /// Reset ordering state to uninitialized after a reconnect or resume.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError::EngineStopped`] if the engine task is gone.
    pub fn reset(&self) -> Result<(), ReorderError> {
        self.reorder.reset()
    }

    /// Stop the pipeline: cancel the engine, close the conduit for
    /// writing, and wait for the dispatch task to drain and exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.engine_task.await;
        let _ = self.dispatch_task.await;
        info!("gateway pipeline stopped");
    }
}
