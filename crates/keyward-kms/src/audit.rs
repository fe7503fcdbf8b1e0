//! Access auditing.
//!
//! Every key retrieval and every use of a managed key through the service is
//! appended to the audit trail before key material or plaintext is released.
//! Lifecycle changes are recorded as well, so the trail is a complete history
//! of who touched which key version and when.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{KeyStatus, KeyType};

/// Identity on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Caller identifier recorded in the audit trail
    pub id: String,
    /// Tenant the caller is confined to; `None` for platform operators
    pub tenant_id: Option<String>,
}

impl Caller {
    /// Platform operator with access to every tenant's keys.
    pub fn operator(id: impl Into<String>) -> Self {
        Self { id: id.into(), tenant_id: None }
    }

    /// Caller confined to one tenant's keys.
    pub fn tenant(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self { id: id.into(), tenant_id: Some(tenant_id.into()) }
    }

    /// Whether this caller may act on a key owned by `key_tenant`.
    pub fn can_access(&self, key_tenant: Option<&str>) -> bool {
        match &self.tenant_id {
            None => true,
            Some(own) => key_tenant == Some(own.as_str()),
        }
    }
}

/// Kind of audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// Key material handed to a caller
    Retrieve,
    /// Data encrypted under a managed key
    Encrypt,
    /// Data decrypted under a managed key
    Decrypt,
    /// Key created
    Generate,
    /// New version created by rotation
    Rotate,
    /// Version revoked
    Revoke,
    /// Version material erased
    Destroy,
}

impl AccessKind {
    /// Whether this access counts as key usage in reports.
    pub fn is_usage(self) -> bool {
        matches!(self, Self::Retrieve | Self::Encrypt | Self::Decrypt)
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Key that was accessed
    pub key_id: String,
    /// Version that was accessed
    pub version_id: u32,
    /// Tenant owning the key
    pub tenant_id: Option<String>,
    /// Caller that performed the access
    pub caller_id: String,
    /// What was done
    pub kind: AccessKind,
    /// When (Unix seconds)
    pub at_secs: u64,
}

/// Aggregate key and usage statistics for a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsageReport {
    /// Start of the period (inclusive, Unix seconds)
    pub start_secs: u64,
    /// End of the period (exclusive, Unix seconds)
    pub end_secs: u64,
    /// Key versions in scope that existed before the end of the period
    pub total_keys: usize,
    /// Key versions by type
    pub keys_by_type: BTreeMap<KeyType, usize>,
    /// Key versions by status
    pub keys_by_status: BTreeMap<KeyStatus, usize>,
    /// Retrievals, encryptions and decryptions in the period
    pub total_usage: u64,
    /// Usage broken down by key id
    pub usage_by_key: BTreeMap<String, u64>,
}
