//! Managed key records.
//!
//! A managed key is identified by `(key_id, version_id)`. Each version carries
//! its own status, so rotation adds a version instead of mutating one, and
//! revocation can target a single version or all of them.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Managed key material size (256 bits)
pub const KEY_MATERIAL_SIZE: usize = 32;

/// Role of a managed key. Independent from its purpose label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Key-encrypting key
    Master,
    /// Data-encrypting key
    Data,
    /// Short-lived session key
    Session,
    /// API credential key
    Api,
    /// Token signing key
    Token,
}

impl KeyType {
    /// Usages granted when a request does not name any.
    pub fn default_usage(self) -> BTreeSet<KeyUsage> {
        match self {
            Self::Master => BTreeSet::from([KeyUsage::Wrap, KeyUsage::Unwrap]),
            Self::Data | Self::Session => BTreeSet::from([KeyUsage::Encrypt, KeyUsage::Decrypt]),
            Self::Api | Self::Token => BTreeSet::from([KeyUsage::Sign, KeyUsage::Verify]),
        }
    }
}

/// Lifecycle status of one key version.
///
/// Ordered by lifecycle progression. Transitions only move forward, except
/// that a version left `Rotating` by a failed rotation may return to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Serves encryption and decryption; exactly one per key id
    Active,
    /// Being replaced by a new version
    Rotating,
    /// Replaced; still decrypts data encrypted under it
    Deprecated,
    /// Rejects all use; kept for audit
    Revoked,
    /// Material erased
    Destroyed,
}

impl KeyStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Rotating | Self::Revoked)
                | (Self::Rotating, Self::Active | Self::Deprecated | Self::Revoked)
                | (Self::Deprecated, Self::Revoked)
                | (Self::Revoked, Self::Destroyed)
        )
    }

    /// New encryptions may only draw on active keys.
    pub fn allows_encrypt(self) -> bool {
        self == Self::Active
    }

    /// Existing ciphertext stays decryptable until revocation.
    pub fn allows_decrypt(self) -> bool {
        matches!(self, Self::Active | Self::Rotating | Self::Deprecated)
    }

    /// Revoked or destroyed.
    pub fn is_revoked(self) -> bool {
        self >= Self::Revoked
    }
}

/// Operations a key may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    /// Encrypt data
    Encrypt,
    /// Decrypt data
    Decrypt,
    /// Produce signatures or MACs
    Sign,
    /// Check signatures or MACs
    Verify,
    /// Wrap other keys
    Wrap,
    /// Unwrap other keys
    Unwrap,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Master => "master",
            Self::Data => "data",
            Self::Session => "session",
            Self::Api => "api",
            Self::Token => "token",
        })
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Rotating => "rotating",
            Self::Deprecated => "deprecated",
            Self::Revoked => "revoked",
            Self::Destroyed => "destroyed",
        })
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Wrap => "wrap",
            Self::Unwrap => "unwrap",
        })
    }
}

/// Raw key bytes of one managed key version.
///
/// # Security
///
/// - Zeroized on drop and on destruction
/// - `Debug` output never includes key bytes
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_MATERIAL_SIZE],
}

impl KeyMaterial {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_MATERIAL_SIZE]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_MATERIAL_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Public attributes of one key version. Never contains key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Stable key identifier shared by all versions
    pub key_id: String,
    /// Version number, starting at 1
    pub version_id: u32,
    /// Role of the key
    pub key_type: KeyType,
    /// Free-form purpose label (e.g. "documents")
    pub purpose: String,
    /// Lifecycle status
    pub status: KeyStatus,
    /// Operations this key may serve
    pub allowed_usage: BTreeSet<KeyUsage>,
    /// Owning tenant; `None` for platform keys
    pub tenant_id: Option<String>,
    /// Creation time (Unix seconds)
    pub created_at_secs: u64,
    /// Time after which rotation is due (Unix seconds)
    pub rotation_due_secs: u64,
    /// Revocation time (Unix seconds)
    pub revoked_at_secs: Option<u64>,
    /// Reason given at revocation
    pub revocation_reason: Option<String>,
    /// Free-form key/value attributes
    pub metadata: BTreeMap<String, String>,
}

impl KeyInfo {
    /// Whether this key may serve `usage`.
    pub fn allows(&self, usage: KeyUsage) -> bool {
        self.allowed_usage.contains(&usage)
    }
}

/// Persisted form of a key version: attributes plus material.
///
/// `material` is `None` once the version has been destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Public attributes
    pub info: KeyInfo,
    /// Key bytes, absent after destruction
    pub material: Option<KeyMaterial>,
}

impl KeyRecord {
    /// `(key_id, version_id)` of this record.
    pub fn id(&self) -> (&str, u32) {
        (&self.info.key_id, self.info.version_id)
    }
}
