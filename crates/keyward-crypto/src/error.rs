//! Error types for the encryption service.

use thiserror::Error;

/// Errors raised by key derivation and field or envelope encryption.
///
/// Reasons are short static descriptions. They never carry key bytes,
/// plaintext or ciphertext, so they are safe to log and to return to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Service cannot be constructed with the supplied configuration.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was wrong with the configuration
        reason: String,
    },

    /// Encryption could not be performed.
    #[error("encryption failed: {reason}")]
    EncryptionFailed {
        /// Why encryption failed
        reason: String,
    },

    /// Ciphertext was malformed, tampered with, or produced under another key.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Why decryption failed
        reason: String,
    },

    /// Global key version cannot advance any further.
    #[error("key version overflow at {current}")]
    VersionOverflow {
        /// Version at which rotation was attempted
        current: u32,
    },
}

impl CryptoError {
    /// Shorthand for [`CryptoError::DecryptionFailed`].
    pub(crate) fn decryption(reason: &str) -> Self {
        Self::DecryptionFailed { reason: reason.to_string() }
    }

    /// Shorthand for [`CryptoError::EncryptionFailed`].
    pub(crate) fn encryption(reason: &str) -> Self {
        Self::EncryptionFailed { reason: reason.to_string() }
    }

    /// Whether the error reflects a condition that retrying cannot fix.
    ///
    /// Every cryptographic failure is fatal for the call that produced it:
    /// retrying with the same inputs yields the same result.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::EncryptionFailed { .. }
            | Self::DecryptionFailed { .. }
            | Self::VersionOverflow { .. } => true,
        }
    }
}
