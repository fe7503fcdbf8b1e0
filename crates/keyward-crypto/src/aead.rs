//! Authenticated encryption using `ChaCha20-Poly1305`
//!
//! All functions are pure - nonces must be provided by the caller. The
//! encryption service draws them from its [`Environment`](keyward_core::Environment).

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::error::CryptoError;

/// Key size (256 bits)
pub const KEY_SIZE: usize = 32;

/// Nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size
pub const TAG_SIZE: usize = 16;

/// Encrypt and authenticate `plaintext`, authenticating `aad` alongside.
///
/// Returns ciphertext with the 16-byte tag appended.
///
/// # Security
///
/// - A `(key, nonce)` pair MUST never be reused; callers supply 96 random bits
///   per call
///
/// # Errors
///
/// - `EncryptionFailed` if the plaintext exceeds the cipher's length limit
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::encryption("plaintext too large for AEAD"))
}

/// Verify and decrypt `ciphertext` (tag included).
///
/// # Errors
///
/// - `DecryptionFailed` if the tag does not verify under `key`, `nonce` and
///   `aad`. No plaintext is released in that case.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::decryption("ciphertext shorter than authentication tag"));
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::decryption("authentication failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const NONCE: [u8; 12] = [7; 12];

    #[test]
    fn seal_appends_tag() {
        let ciphertext = seal(&KEY, &NONCE, b"hello", b"").unwrap();
        assert_eq!(ciphertext.len(), 5 + TAG_SIZE);
        assert_eq!(open(&KEY, &NONCE, &ciphertext, b"").unwrap(), b"hello");
    }

    #[test]
    fn wrong_key_fails() {
        let ciphertext = seal(&KEY, &NONCE, b"secret", b"").unwrap();
        let result = open(&[0x43; 32], &NONCE, &ciphertext, b"");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn wrong_aad_fails() {
        let ciphertext = seal(&KEY, &NONCE, b"secret", b"record-1").unwrap();
        assert!(open(&KEY, &NONCE, &ciphertext, b"record-2").is_err());
        assert!(open(&KEY, &NONCE, &ciphertext, b"record-1").is_ok());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        assert!(open(&KEY, &NONCE, &[0u8; TAG_SIZE - 1], b"").is_err());
    }
}
