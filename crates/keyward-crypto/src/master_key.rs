//! Master key provisioning.
//!
//! The master key is the root of every purpose key. It arrives out-of-band as
//! base64 text, lives in zeroizing memory for the lifetime of the service, and
//! is never printed: `Debug` is redacted and no accessor hands out the encoded
//! form.

use std::{collections::BTreeSet, fmt};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use keyward_core::Environment;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Required master key length (256 bits).
pub const MASTER_KEY_SIZE: usize = 32;

/// Fewer distinct byte values than this marks a key as misconfigured.
///
/// 32 uniformly random bytes contain about 30 distinct values; a key below 8
/// is a placeholder, a repeated pattern or an encoding mistake.
const MIN_DISTINCT_BYTES: usize = 8;

/// Root secret from which purpose keys are derived.
///
/// # Security
///
/// - Memory is zeroized on drop
/// - `Debug` output never includes key bytes
pub struct MasterKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl MasterKey {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// - `Configuration` if fewer than 256 bits are supplied
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MASTER_KEY_SIZE {
            return Err(CryptoError::Configuration {
                reason: format!(
                    "master key must be at least {MASTER_KEY_SIZE} bytes, got {}",
                    bytes.len()
                ),
            });
        }

        Ok(Self { bytes: Zeroizing::new(bytes.to_vec()) })
    }

    /// Decode a base64 (standard alphabet, padded) master key.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the text is empty, not base64, or too short
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::Configuration { reason: "master key missing".to_string() });
        }

        let decoded = Zeroizing::new(STANDARD.decode(encoded).map_err(|_| {
            CryptoError::Configuration { reason: "master key is not valid base64".to_string() }
        })?);

        Self::from_bytes(&decoded)
    }

    /// Fresh random master key.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let bytes = Zeroizing::new(env.random_array::<MASTER_KEY_SIZE>());
        Self { bytes: Zeroizing::new(bytes.to_vec()) }
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: construction rejects short keys.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey").field("len", &self.bytes.len()).finish_non_exhaustive()
    }
}

/// Generate a new 256-bit master key, base64 encoded for transport.
pub fn generate_master_key<E: Environment>(env: &E) -> String {
    let bytes = Zeroizing::new(env.random_array::<MASTER_KEY_SIZE>());
    STANDARD.encode(bytes.as_slice())
}

/// Reject master keys that are malformed or obviously weak.
///
/// Checks that the text is base64, decodes to exactly 256 bits, and has
/// enough distinct byte values to rule out placeholders such as all-zero or
/// repeating patterns.
///
/// # Errors
///
/// - `Configuration` describing the first check that failed
pub fn validate_key_strength(encoded: &str) -> Result<(), CryptoError> {
    let decoded = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|_| {
        CryptoError::Configuration { reason: "key is not valid base64".to_string() }
    })?);

    if decoded.len() != MASTER_KEY_SIZE {
        return Err(CryptoError::Configuration {
            reason: format!("key must be {MASTER_KEY_SIZE} bytes, got {}", decoded.len()),
        });
    }

    let distinct: BTreeSet<u8> = decoded.iter().copied().collect();
    if distinct.len() < MIN_DISTINCT_BYTES {
        return Err(CryptoError::Configuration {
            reason: format!("key has low entropy ({} distinct byte values)", distinct.len()),
        });
    }

    Ok(())
}
