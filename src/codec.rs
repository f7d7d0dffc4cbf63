//! Envelope codec: decompression, decryption, and the challenge handshake.
//!
//! [`EnvelopeCodec::decode`] turns one raw transport frame into either a
//! sequenced event bound for the reorder engine, a control frame for the
//! session layer, or a verified webhook challenge. Frame-level failures are
//! reported as [`CodecError`] values; only challenge verification is a hard
//! error, everything else describes a single droppable frame.

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::PipelineConfig,
    frame::{ChallengePayload, Envelope, Opcode, RawFrame, SocketFrame},
};

mod crypto;
pub use crypto::DecryptError;
pub(crate) use crypto::KEY_LEN;


/// Leading byte of a zlib stream, used to detect transport compression.
const ZLIB_HEADER: u8 = 0x78;

/// Outcome of decoding one raw transport frame.
#[derive(Debug)]
pub enum Decoded {
    /// Verified webhook challenge value to echo back to the caller.
    Challenge(String),
    /// Sequenced event frame bound for the reorder engine.
    Event {
        /// Stream position of the event.
        sequence: u64,
        /// Opaque event payload.
        payload: Value,
    },
    /// Non-event control frame, consumed by the session layer.
    Control {
        /// Signal opcode of the frame.
        opcode: Opcode,
        /// Opaque control payload.
        payload: Value,
    },
}

/// Errors raised while decoding a raw frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// zlib inflation of a compressed binary frame failed.
    #[error("failed to inflate compressed frame: {0}")]
    Inflate(#[from] std::io::Error),
    /// The envelope or decrypted socket frame was not valid JSON.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    /// The envelope ciphertext could not be decrypted.
    #[error("failed to decrypt envelope: {0}")]
    DecryptionFailure(#[from] DecryptError),
    /// An event frame arrived without a sequence number.
    #[error("event frame missing sequence number")]
    MissingSequence,
    /// The webhook challenge carried an unexpected verify token.
    ///
    /// Failing open here would let a third party register a spoofed
    /// endpoint, so this is the one codec error treated as fatal.
    #[error("challenge verify token mismatch")]
    ChallengeVerification,
}

impl CodecError {
    /// Whether the error describes a single bad frame that the pipeline
    /// drops and logs rather than surfacing to the caller.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ChallengeVerification)
    }
}

/// Stateless decoder for the gateway wire envelope.
pub struct EnvelopeCodec {
    encrypt_key: String,
    verify_token: String,
}

impl EnvelopeCodec {
    /// Create a codec from validated pipeline configuration.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            encrypt_key: config.encrypt_key.clone(),
            verify_token: config.verify_token.clone(),
        }
    }

    /// Decode one raw transport frame.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] for frames that cannot be inflated, parsed,
    /// or decrypted, for event frames without a sequence number, and for
    /// challenge payloads whose verify token does not match.
    pub fn decode(&self, frame: RawFrame) -> Result<Decoded, CodecError> {
        let bytes = Self::inflate(frame)?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        let plaintext = crypto::decrypt(&self.encrypt_key, &envelope.encrypted)?;
        let frame: SocketFrame = serde_json::from_slice(&plaintext)?;

        if ChallengePayload::matches(&frame.payload) {
            return self.verify_challenge(frame.payload);
        }

        match frame.opcode {
            Opcode::Event => {
                let sequence = frame.sequence.ok_or(CodecError::MissingSequence)?;
                Ok(Decoded::Event {
                    sequence,
                    payload: frame.payload,
                })
            }
            opcode => Ok(Decoded::Control {
                opcode,
                payload: frame.payload,
            }),
        }
    }

    /// Check a challenge payload against the configured verify token.
    fn verify_challenge(&self, payload: Value) -> Result<Decoded, CodecError> {
        let challenge: ChallengePayload = serde_json::from_value(payload)?;
        if challenge.verify_token != self.verify_token {
            return Err(CodecError::ChallengeVerification);
        }
        debug!(challenge = %challenge.challenge, "webhook challenge verified");
        Ok(Decoded::Challenge(challenge.challenge))
    }

    /// Obtain envelope JSON bytes, inflating zlib-compressed binary frames.
    fn inflate(frame: RawFrame) -> Result<Vec<u8>, CodecError> {
        match frame {
            RawFrame::Text(text) => Ok(text.into_bytes()),
            RawFrame::Binary(bytes) => {
                if bytes.first() == Some(&ZLIB_HEADER) {
                    let mut inflated = Vec::new();
                    ZlibDecoder::new(bytes.as_ref()).read_to_end(&mut inflated)?;
                    Ok(inflated)
                } else {
                    Ok(bytes.to_vec())
                }
            }
        }
    }
}
