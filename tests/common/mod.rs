//! Shared utilities for integration tests.
//!
//! Provides envelope sealing that mirrors the service's wire format, a
//! config fixture, and channel-backed [`EventSink`] implementations so
//! tests can observe dispatch order.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use aes::Aes256;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use gatewire::{EventSink, PipelineConfigBuilder, RawFrame, SinkError};
use serde_json::{Value, json};
use tokio::sync::mpsc;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

pub const KEY: &str = "integration-key";
pub const TOKEN: &str = "integration-token";
const IV: &str = "fedcba9876543210";

/// Encrypt a plaintext frame into the envelope's `encrypted` field value.
pub fn seal(key: &str, plaintext: &str) -> String {
    let mut padded = [0u8; 32];
    padded[..key.len()].copy_from_slice(key.as_bytes());
    let cipher =
        Aes256CbcEnc::new_from_slices(&padded, IV.as_bytes()).expect("fixed key and IV sizes");
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    BASE64.encode(format!("{IV}{}", BASE64.encode(ciphertext)))
}

/// A complete text frame carrying the given decrypted socket frame.
pub fn sealed_frame(frame: &Value) -> RawFrame {
    RawFrame::Text(json!({ "encrypted": seal(KEY, &frame.to_string()) }).to_string())
}

/// An event frame with the given sequence number.
pub fn event(sequence: u64) -> RawFrame {
    sealed_frame(&json!({
        "type": 0,
        "sequence": sequence,
        "payload": { "content": format!("event {sequence}") },
    }))
}

/// A webhook challenge frame carrying the given verify token.
pub fn challenge(verify_token: &str, challenge: &str) -> RawFrame {
    sealed_frame(&json!({
        "type": 0,
        "payload": {
            "type": 255,
            "channel_type": "WEBHOOK_CHALLENGE",
            "verify_token": verify_token,
            "challenge": challenge,
        },
    }))
}

/// Install a per-test subscriber so `tracing` output is captured.
///
/// Safe to call repeatedly; only the first call in a process wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Builder preloaded with the shared test secrets.
///
/// Also installs the test subscriber, as every integration test starts
/// here.
pub fn config() -> PipelineConfigBuilder {
    init_tracing();
    gatewire::PipelineConfig::builder()
        .encrypt_key(KEY)
        .verify_token(TOKEN)
}

/// Sink that forwards every delivery into a channel for assertions.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(u64, Value)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(u64, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, sequence: u64, payload: Value) -> Result<(), SinkError> {
        self.tx
            .send((sequence, payload))
            .map_err(|_| "test receiver dropped".into())
    }
}

/// Sink that fails on one chosen sequence and records the rest.
pub struct FaultySink {
    tx: mpsc::UnboundedSender<(u64, Value)>,
    fail_on: u64,
}

impl FaultySink {
    pub fn new(fail_on: u64) -> (Self, mpsc::UnboundedReceiver<(u64, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail_on }, rx)
    }
}

#[async_trait]
impl EventSink for FaultySink {
    async fn deliver(&self, sequence: u64, payload: Value) -> Result<(), SinkError> {
        if sequence == self.fail_on {
            return Err(format!("injected failure at {sequence}").into());
        }
        self.tx
            .send((sequence, payload))
            .map_err(|_| "test receiver dropped".into())
    }
}
