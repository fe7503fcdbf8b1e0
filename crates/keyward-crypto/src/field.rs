//! Field envelope encoding.
//!
//! A field envelope is the ASCII string `v{N}:{nonce}:{ciphertext}` where `N`
//! is the decimal key version and the other two parts are standard padded
//! base64. The version is also authenticated: the AEAD associated data is the
//! big-endian version followed by the caller's associated data, so editing
//! the version tag breaks the tag even before the wrong key is derived.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{
    aead::{self, KEY_SIZE, NONCE_SIZE, TAG_SIZE},
    error::CryptoError,
};

/// Parsed field envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEnvelope {
    /// Key version that produced the ciphertext
    pub version: u32,
    /// AEAD nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext including the 16-byte tag
    pub ciphertext: Vec<u8>,
}

impl FieldEnvelope {
    /// Parse `v{N}:{nonce}:{ciphertext}`.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if any part is missing or malformed
    pub fn parse(envelope: &str) -> Result<Self, CryptoError> {
        let mut parts = envelope.split(':');
        let (Some(version), Some(nonce), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::decryption("malformed envelope"));
        };

        let version = parse_version(version)?;

        let nonce: [u8; NONCE_SIZE] = STANDARD
            .decode(nonce)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| CryptoError::decryption("malformed envelope nonce"))?;

        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|_| CryptoError::decryption("malformed envelope ciphertext"))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::decryption("malformed envelope ciphertext"));
        }

        Ok(Self { version, nonce, ciphertext })
    }

    /// Version number embedded in an envelope string, without decoding the rest.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the version tag is malformed
    pub fn peek_version(envelope: &str) -> Result<u32, CryptoError> {
        let tag = envelope.split(':').next().unwrap_or_default();
        parse_version(tag)
    }
}

impl fmt::Display for FieldEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}:{}:{}",
            self.version,
            STANDARD.encode(self.nonce),
            STANDARD.encode(&self.ciphertext)
        )
    }
}

/// Canonical decimal only: no sign, no leading zeros, nonzero.
fn parse_version(tag: &str) -> Result<u32, CryptoError> {
    let digits = tag.strip_prefix('v').unwrap_or_default();
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(CryptoError::decryption("malformed envelope version"));
    }
    digits.parse().map_err(|_| CryptoError::decryption("malformed envelope version"))
}

fn associated_data(version: u32, aad: Option<&str>) -> Vec<u8> {
    let aad = aad.unwrap_or_default().as_bytes();
    let mut bound = Vec::with_capacity(4 + aad.len());
    bound.extend_from_slice(&version.to_be_bytes());
    bound.extend_from_slice(aad);
    bound
}

/// Encrypt a text field under `key` and wrap it in an envelope.
///
/// # Errors
///
/// - `EncryptionFailed` if the AEAD rejects the input
pub fn seal_field(
    key: &[u8; KEY_SIZE],
    version: u32,
    nonce: [u8; NONCE_SIZE],
    plaintext: &str,
    aad: Option<&str>,
) -> Result<FieldEnvelope, CryptoError> {
    let ciphertext =
        aead::seal(key, &nonce, plaintext.as_bytes(), &associated_data(version, aad))?;
    Ok(FieldEnvelope { version, nonce, ciphertext })
}

/// Decrypt an envelope under `key`.
///
/// # Errors
///
/// - `DecryptionFailed` if authentication fails or the plaintext is not UTF-8
pub fn open_field(
    key: &[u8; KEY_SIZE],
    envelope: &FieldEnvelope,
    aad: Option<&str>,
) -> Result<String, CryptoError> {
    let plaintext = aead::open(
        key,
        &envelope.nonce,
        &envelope.ciphertext,
        &associated_data(envelope.version, aad),
    )?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::decryption("plaintext is not UTF-8"))
}
