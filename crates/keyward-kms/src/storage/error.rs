//! Storage error types.
//!
//! Defines errors that can occur during key store operations:
//! - `NotFound`: Key version to update doesn't exist
//! - `Conflict`: Key version to insert already exists
//! - `StatusChanged`: Another writer changed a version's status first
//! - `Serialization`: Failed to encode/decode a record
//! - `Io`: Underlying storage system errors

use thiserror::Error;

use crate::types::KeyStatus;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Key version not found
    #[error("key version not found: {key_id} v{version_id}")]
    NotFound {
        /// Key ID that was not found
        key_id: String,
        /// Version that was not found
        version_id: u32,
    },

    /// Key version already exists
    ///
    /// Versions are immutable identifiers: inserting the same
    /// `(key_id, version_id)` twice is a sequencing bug or a lost race with
    /// another writer.
    #[error("key version already exists: {key_id} v{version_id}")]
    Conflict {
        /// Key ID of the existing record
        key_id: String,
        /// Version of the existing record
        version_id: u32,
    },

    /// Conditional write found a different status than expected
    ///
    /// The record was changed by another writer after the caller read it.
    /// Nothing was written.
    #[error("key version {key_id} v{version_id} is {found}, expected {expected}")]
    StatusChanged {
        /// Key ID of the record
        key_id: String,
        /// Version of the record
        version_id: u32,
        /// Status the caller read
        expected: KeyStatus,
        /// Status found at write time
        found: KeyStatus,
    },

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Whether the same call may succeed if retried.
    ///
    /// Only I/O failures are transient. The key management service never
    /// retries on its own; callers decide.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Whether the write lost a race with another writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::StatusChanged { .. })
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
