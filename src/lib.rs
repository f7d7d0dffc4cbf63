//! Gateway frame ingestion pipeline for a real-time chat client SDK.
//!
//! The transport (persistent socket or inbound webhook requests) delivers
//! frames that may be compressed, encrypted, reordered, duplicated, or
//! lost. This crate presents them downstream as a single gap-free,
//! duplicate-free, strictly ordered stream:
//!
//! - [`codec`] decompresses and decrypts the wire envelope and answers the
//!   webhook ownership-verification challenge.
//! - [`reorder`] buffers out-of-order frames and releases them in order,
//!   with configurable overflow and stall-timeout policies.
//! - [`dispatch`] carries released frames over an unbounded FIFO conduit to
//!   one task invoking the downstream [`EventSink`].
//! - [`pipeline`] wires the pieces together behind [`GatewayPipeline`] and
//!   exposes the reconnect escalation stream for the connection manager.

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod frame;
pub mod pipeline;
pub mod reorder;

pub use codec::{CodecError, Decoded, DecryptError, EnvelopeCodec};
pub use config::{ConfigError, PipelineConfig, PipelineConfigBuilder};
pub use dispatch::{EventSink, SinkError};
pub use frame::{ChallengeReply, Envelope, Opcode, RawFrame, SocketFrame};
pub use pipeline::{FeedError, FeedOutcome, GatewayPipeline, ReconnectSignals};
pub use reorder::{
    OverflowPolicy,
    ReconnectReason,
    ReconnectSignal,
    ReorderError,
    ReorderHandle,
    WaitTimeoutPolicy,
};
