//! Request and filter types for the key management service.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{KeyInfo, KeyStatus, KeyType, KeyUsage};

/// Parameters for creating a new managed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateKeyRequest {
    /// Role of the key
    pub key_type: KeyType,
    /// Identifier shared by all future versions
    pub key_id: String,
    /// Purpose label (e.g. "documents")
    pub purpose: String,
    /// Owning tenant; defaults to the caller's tenant
    pub tenant_id: Option<String>,
    /// Usage allow-list; defaults to [`KeyType::default_usage`]
    pub allowed_usage: Option<BTreeSet<KeyUsage>>,
    /// Free-form attributes
    pub metadata: BTreeMap<String, String>,
}

impl GenerateKeyRequest {
    /// Request with default usage, no tenant and no metadata.
    pub fn new(key_type: KeyType, key_id: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            key_type,
            key_id: key_id.into(),
            purpose: purpose.into(),
            tenant_id: None,
            allowed_usage: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Assign the key to a tenant.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Replace the usage allow-list.
    #[must_use]
    pub fn usage(mut self, usages: impl IntoIterator<Item = KeyUsage>) -> Self {
        self.allowed_usage = Some(usages.into_iter().collect());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// AND-combined filter for `list_keys`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    /// Only keys owned by this tenant
    pub tenant_id: Option<String>,
    /// Only keys of this type
    pub key_type: Option<KeyType>,
    /// Only versions in this status
    pub status: Option<KeyStatus>,
}

impl KeyFilter {
    /// Filter matching every key version.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a tenant.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Restrict to a key type.
    #[must_use]
    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = Some(key_type);
        self
    }

    /// Restrict to a status.
    #[must_use]
    pub fn status(mut self, status: KeyStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether `info` passes every set criterion.
    pub fn matches(&self, info: &KeyInfo) -> bool {
        self.tenant_id.as_deref().is_none_or(|tenant| info.tenant_id.as_deref() == Some(tenant))
            && self.key_type.is_none_or(|key_type| info.key_type == key_type)
            && self.status.is_none_or(|status| info.status == status)
    }
}
