//! AES-256-CBC envelope decryption.
//!
//! The wire format is nonstandard and reproduced here exactly for
//! compatibility: the envelope's `encrypted` field base64-decodes to an
//! ASCII string whose first sixteen characters are the IV; the remainder is
//! itself base64 ciphertext. The symmetric key is the pre-shared encrypt
//! key right-padded with NUL bytes to 32 bytes. This padding scheme is not
//! a real KDF and must not be copied into new designs.

use aes::Aes256;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use thiserror::Error;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Fixed AES-256 key length after padding.
pub(crate) const KEY_LEN: usize = 32;

/// Length of the IV prefix inside the decoded envelope string.
const IV_LEN: usize = 16;

/// Errors raised while decrypting an envelope.
///
/// All variants describe a single bad frame; none are fatal to the
/// pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecryptError {
    /// The outer or inner base64 layer was invalid.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded string was shorter than the IV prefix.
    #[error("ciphertext shorter than {IV_LEN}-byte IV prefix")]
    TooShort,
    /// Block decryption or PKCS#7 unpadding failed, e.g. wrong key.
    #[error("bad ciphertext or key: unpadding failed")]
    Unpad,
}

/// Right-pad the pre-shared key with NUL bytes to exactly [`KEY_LEN`] bytes.
///
/// Callers must have validated that the key fits; see
/// [`ConfigError::EncryptKeyTooLong`](crate::config::ConfigError).
pub(crate) fn derive_key(encrypt_key: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let bytes = encrypt_key.as_bytes();
    key[..bytes.len().min(KEY_LEN)].copy_from_slice(&bytes[..bytes.len().min(KEY_LEN)]);
    key
}

/// Decrypt one envelope's `encrypted` field into plaintext JSON bytes.
///
/// # Errors
///
/// Returns a [`DecryptError`] if either base64 layer is invalid, the IV
/// prefix is missing, or AES-256-CBC unpadding fails.
pub(crate) fn decrypt(encrypt_key: &str, encrypted: &str) -> Result<Vec<u8>, DecryptError> {
    let outer = BASE64.decode(encrypted)?;
    if outer.len() < IV_LEN {
        return Err(DecryptError::TooShort);
    }
    let (iv, inner) = outer.split_at(IV_LEN);
    let ciphertext = BASE64.decode(inner)?;

    let key = derive_key(encrypt_key);
    let cipher = Aes256CbcDec::new_from_slices(&key, iv).map_err(|_| DecryptError::TooShort)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| DecryptError::Unpad)
}
