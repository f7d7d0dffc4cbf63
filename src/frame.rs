//! Wire-level data model for gateway frames.
//!
//! The transport hands the pipeline [`RawFrame`]s: binary socket messages
//! (possibly zlib-compressed) or already-decompressed webhook bodies. Each
//! carries an [`Envelope`] of base64 ciphertext which decrypts to a
//! [`SocketFrame`] tagged with an [`Opcode`]. Only `Event` frames are
//! sequenced; everything else is session-layer control traffic.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved payload `type` marking the webhook ownership challenge.
pub const CHALLENGE_TYPE: u64 = 255;

/// `channel_type` discriminator carried by the challenge payload.
pub const CHALLENGE_CHANNEL_TYPE: &str = "WEBHOOK_CHALLENGE";

/// One unit of data delivered by the transport.
#[derive(Clone, Debug)]
pub enum RawFrame {
    /// Binary socket message; may be zlib-compressed on the wire.
    Binary(Bytes),
    /// Text that has already been decompressed, e.g. a webhook HTTP body.
    Text(String),
}

/// Outer JSON wrapper carrying base64 ciphertext.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Envelope {
    /// Base64 of the IV-prefixed ciphertext string.
    pub encrypted: String,
}

/// Signal opcode of a decrypted socket frame.
///
/// The set of known opcodes is closed; anything else is preserved as
/// [`Opcode::Unknown`] rather than rejected, so newer control frames pass
/// through to the session layer untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Opcode {
    /// Sequenced event frame; the only opcode the reorder engine sees.
    Event,
    /// Server greeting after connect.
    Hello,
    /// Client heartbeat.
    Ping,
    /// Heartbeat acknowledgement.
    Pong,
    /// Client request to resume a session.
    Resume,
    /// Server request that the client reconnect.
    Reconnect,
    /// Server acknowledgement of a resume.
    ResumeAck,
    /// Opcode not known to this version of the SDK.
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Event,
            1 => Self::Hello,
            2 => Self::Ping,
            3 => Self::Pong,
            4 => Self::Resume,
            5 => Self::Reconnect,
            6 => Self::ResumeAck,
            other => Self::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Event => 0,
            Opcode::Hello => 1,
            Opcode::Ping => 2,
            Opcode::Pong => 3,
            Opcode::Resume => 4,
            Opcode::Reconnect => 5,
            Opcode::ResumeAck => 6,
            Opcode::Unknown(other) => other,
        }
    }
}

/// Decrypted socket frame.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SocketFrame {
    /// Distinguishes events from session control frames.
    #[serde(rename = "type")]
    pub opcode: Opcode,
    /// Stream position, present only on `Event` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Opaque event or control payload.
    #[serde(default)]
    pub payload: Value,
}

/// Reserved event payload used by the webhook transport to prove endpoint
/// ownership.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChallengePayload {
    /// Always [`CHALLENGE_TYPE`].
    #[serde(rename = "type")]
    pub payload_type: u64,
    /// Always [`CHALLENGE_CHANNEL_TYPE`].
    pub channel_type: String,
    /// Token that must match the configured verify token.
    pub verify_token: String,
    /// Value to echo back in the HTTP response body.
    pub challenge: String,
}

impl ChallengePayload {
    /// Whether a raw payload value carries the challenge discriminators.
    #[must_use]
    pub fn matches(payload: &Value) -> bool {
        payload.get("type").and_then(Value::as_u64) == Some(CHALLENGE_TYPE)
            && payload.get("channel_type").and_then(Value::as_str) == Some(CHALLENGE_CHANNEL_TYPE)
    }
}

/// Reply to a verified challenge.
///
/// Its JSON serialization is the exact HTTP response body the webhook
/// transport must return for the triggering request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeReply {
    /// Echoed challenge value.
    pub challenge: String,
}

impl ChallengeReply {
    /// Render the literal response body, `{"challenge":"<value>"}`.
    #[must_use]
    pub fn to_body(&self) -> String {
        serde_json::json!({ "challenge": self.challenge }).to_string()
    }
}
