//! Key management error types.

use keyward_crypto::CryptoError;
use thiserror::Error;

use crate::{
    storage::StorageError,
    types::{KeyStatus, KeyUsage},
};

/// Errors returned by the key management service.
///
/// Messages name keys, versions and statuses only. Key material and
/// confirmation tokens never appear.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyManagementError {
    /// Key or key version does not exist
    #[error("key not found: {key_id}{}", version_suffix(.version_id))]
    NotFound {
        /// Requested key
        key_id: String,
        /// Requested version, if one was named
        version_id: Option<u32>,
    },

    /// A key with this id already exists
    #[error("key already exists: {key_id}")]
    AlreadyExists {
        /// Conflicting key
        key_id: String,
    },

    /// Targeted version is revoked or destroyed
    #[error("key revoked: {key_id} v{version_id} is {status}")]
    Revoked {
        /// Key that was targeted
        key_id: String,
        /// Version that was targeted
        version_id: u32,
        /// Its current status
        status: KeyStatus,
    },

    /// Revocation targeted versions that are already revoked
    #[error("key already revoked: {key_id}{}", version_suffix(.version_id))]
    AlreadyRevoked {
        /// Key that was targeted
        key_id: String,
        /// Version that was targeted, if one was named
        version_id: Option<u32>,
    },

    /// Operation requires a status the version does not have
    #[error("key {key_id} v{version_id} is {status}, operation requires {required}")]
    InvalidStatus {
        /// Key that was targeted
        key_id: String,
        /// Version that was targeted
        version_id: u32,
        /// Its current status
        status: KeyStatus,
        /// Status the operation requires
        required: KeyStatus,
    },

    /// Key has no active version to serve the request
    #[error("key {key_id} has no active version")]
    NoActiveVersion {
        /// Key that was targeted
        key_id: String,
    },

    /// Destruction confirmation token did not match
    #[error("invalid confirmation token for {key_id} v{version_id}")]
    InvalidConfirmation {
        /// Key that was targeted
        key_id: String,
        /// Version that was targeted
        version_id: u32,
    },

    /// Caller is confined to a tenant that does not own the key
    #[error("caller {caller_id} may not access key {key_id}")]
    TenantMismatch {
        /// Key that was targeted
        key_id: String,
        /// Caller that was refused
        caller_id: String,
    },

    /// Key's allow-list does not include the requested usage
    #[error("key {key_id} does not allow {usage}")]
    UsageNotAllowed {
        /// Key that was targeted
        key_id: String,
        /// Usage that was refused
        usage: KeyUsage,
    },

    /// Request is malformed
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong
        reason: String,
    },

    /// Key store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cryptographic failure while using a managed key
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl KeyManagementError {
    /// Whether retrying the same call may succeed.
    ///
    /// True only for transient storage failures. Lifecycle rejections and
    /// cryptographic failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_transient(),
            _ => false,
        }
    }
}

fn version_suffix(version_id: &Option<u32>) -> String {
    version_id.map(|v| format!(" v{v}")).unwrap_or_default()
}
