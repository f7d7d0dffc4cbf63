//! Pipeline configuration and validation.
//!
//! [`PipelineConfig`] gathers everything one gateway session needs: the
//! reorder buffer sizing and policies, the sequence wraparound modulus, and
//! the pre-shared secrets used by the envelope codec. Construction goes
//! through [`PipelineConfigBuilder`] so invalid combinations are rejected
//! before any task is spawned.

use std::time::Duration;

use thiserror::Error;

use crate::{
    codec::KEY_LEN,
    reorder::{OverflowPolicy, WaitTimeoutPolicy},
};

/// Default out-of-order buffer capacity.
const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Default sequence wraparound point.
const DEFAULT_MAX_SEQUENCE: u64 = 65_535;

/// Errors returned when building a [`PipelineConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No encrypt key was provided.
    #[error("encrypt key is required")]
    MissingEncryptKey,
    /// The encrypt key exceeds the AES-256 key length.
    #[error("encrypt key is {len} bytes; must be at most {KEY_LEN}")]
    EncryptKeyTooLong {
        /// Length of the rejected key in bytes.
        len: usize,
    },
    /// No verify token was provided.
    #[error("verify token is required")]
    MissingVerifyToken,
    /// The buffer capacity was zero.
    #[error("buffer capacity must be at least 1")]
    ZeroCapacity,
    /// The maximum sequence number leaves no room for a modulus.
    #[error("max sequence {0} out of range; must be between 1 and 2^63 - 1")]
    MaxSequenceOutOfRange(u64),
}

/// Validated configuration for one gateway ingestion pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Maximum number of out-of-order frames held while waiting for a gap.
    pub buffer_capacity: usize,
    /// Behaviour when the buffer is full.
    pub overflow_policy: OverflowPolicy,
    /// How long a gap may stall the stream; `None` disables the timer.
    pub wait_timeout: Option<Duration>,
    /// Behaviour when a gap outlives `wait_timeout`.
    pub wait_timeout_policy: WaitTimeoutPolicy,
    /// Largest sequence number before wraparound to zero.
    pub max_sequence: u64,
    /// Pre-shared envelope decryption key.
    pub encrypt_key: String,
    /// Token expected in webhook challenge payloads.
    pub verify_token: String,
}

impl PipelineConfig {
    /// Begin building a configuration.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    buffer_capacity: usize,
    overflow_policy: OverflowPolicy,
    wait_timeout: Option<Duration>,
    wait_timeout_policy: WaitTimeoutPolicy,
    max_sequence: u64,
    encrypt_key: Option<String>,
    verify_token: Option<String>,
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            overflow_policy: OverflowPolicy::DropIncoming,
            wait_timeout: None,
            wait_timeout_policy: WaitTimeoutPolicy::SkipMissing,
            max_sequence: DEFAULT_MAX_SEQUENCE,
            encrypt_key: None,
            verify_token: None,
        }
    }
}

impl PipelineConfigBuilder {
    /// Set the out-of-order buffer capacity.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Choose the behaviour applied when the buffer is full.
    #[must_use]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Enable the stall timer with the given duration.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Disable the stall timer.
    #[must_use]
    pub fn no_wait_timeout(mut self) -> Self {
        self.wait_timeout = None;
        self
    }

    /// Choose the behaviour applied when a gap outlives the stall timer.
    #[must_use]
    pub fn wait_timeout_policy(mut self, policy: WaitTimeoutPolicy) -> Self {
        self.wait_timeout_policy = policy;
        self
    }

    /// Set the largest sequence number before wraparound.
    #[must_use]
    pub fn max_sequence(mut self, max_sequence: u64) -> Self {
        self.max_sequence = max_sequence;
        self
    }

    /// Provide the pre-shared envelope decryption key.
    #[must_use]
    pub fn encrypt_key(mut self, key: impl Into<String>) -> Self {
        self.encrypt_key = Some(key.into());
        self
    }

    /// Provide the webhook verify token.
    #[must_use]
    pub fn verify_token(mut self, token: impl Into<String>) -> Self {
        self.verify_token = Some(token.into());
        self
    }

    /// Validate the settings and produce a [`PipelineConfig`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required secret is missing or empty,
    /// the encrypt key is longer than 32 bytes, the buffer capacity is
    /// zero, or the maximum sequence number cannot form a
    /// circular-distance modulus.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let encrypt_key = self
            .encrypt_key
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingEncryptKey)?;
        if encrypt_key.len() > KEY_LEN {
            return Err(ConfigError::EncryptKeyTooLong {
                len: encrypt_key.len(),
            });
        }
        let verify_token = self
            .verify_token
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingVerifyToken)?;
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        // Circular distance doubles the modulus in intermediate sums, so the
        // wraparound point must leave headroom in a u64.
        if self.max_sequence == 0 || self.max_sequence >= u64::MAX / 2 {
            return Err(ConfigError::MaxSequenceOutOfRange(self.max_sequence));
        }

        Ok(PipelineConfig {
            buffer_capacity: self.buffer_capacity,
            overflow_policy: self.overflow_policy,
            wait_timeout: self.wait_timeout,
            wait_timeout_policy: self.wait_timeout_policy,
            max_sequence: self.max_sequence,
            encrypt_key,
            verify_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn builder() -> PipelineConfigBuilder {
        PipelineConfig::builder()
            .encrypt_key("key")
            .verify_token("token")
    }

    #[test]
    fn defaults_are_applied() {
        let config = builder().build().expect("build should succeed");
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.max_sequence, DEFAULT_MAX_SEQUENCE);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropIncoming);
        assert_eq!(config.wait_timeout, None);
        assert_eq!(config.wait_timeout_policy, WaitTimeoutPolicy::SkipMissing);
    }

    #[rstest]
    #[case::missing_key(PipelineConfig::builder().verify_token("t"), ConfigError::MissingEncryptKey)]
    #[case::empty_key(builder().encrypt_key(""), ConfigError::MissingEncryptKey)]
    #[case::missing_token(PipelineConfig::builder().encrypt_key("k"), ConfigError::MissingVerifyToken)]
    #[case::long_key(
        builder().encrypt_key("k".repeat(33)),
        ConfigError::EncryptKeyTooLong { len: 33 }
    )]
    #[case::zero_capacity(builder().buffer_capacity(0), ConfigError::ZeroCapacity)]
    #[case::zero_max_sequence(builder().max_sequence(0), ConfigError::MaxSequenceOutOfRange(0))]
    #[case::huge_max_sequence(
        builder().max_sequence(u64::MAX),
        ConfigError::MaxSequenceOutOfRange(u64::MAX)
    )]
    fn invalid_settings_are_rejected(
        #[case] candidate: PipelineConfigBuilder,
        #[case] expected: ConfigError,
    ) {
        assert_eq!(candidate.build().expect_err("build should fail"), expected);
    }
}
