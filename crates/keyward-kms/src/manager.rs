//! Key Management Service
//!
//! System of record for named, versioned keys. Owns key material at rest (via
//! a [`KeyStore`]) and drives each version through its lifecycle:
//!
//! ```text
//! ACTIVE ──rotate──► ROTATING ──► DEPRECATED ──revoke──► REVOKED ──destroy──► DESTROYED
//!    └──────────────────revoke──────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one version per key id is `Active`; after a successful
//!   `generate_key` or `rotate_key` exactly one is
//! - Revoked and destroyed versions never release material or serve
//!   encryption or decryption
//! - Destruction requires prior revocation and an exact confirmation token
//! - Every retrieval, encryption and decryption is audited before its result
//!   is returned; if the audit write fails the call fails
//! - A tenant-scoped caller never observes another tenant's keys
//! - Status changes only apply if the stored status is still the one that was
//!   read, so concurrent handles cannot undo each other's transitions

use keyward_core::{Environment, SystemEnv};
use keyward_crypto::{FieldEnvelope, open_field, seal_field, secure_compare};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::{
    audit::{AccessKind, AccessRecord, Caller, KeyUsageReport},
    config::KmsConfig,
    error::KeyManagementError,
    request::{GenerateKeyRequest, KeyFilter},
    storage::{KeyStore, StorageError},
    types::{KeyInfo, KeyMaterial, KeyRecord, KeyStatus, KeyUsage},
};

/// Longest accepted key id, in bytes.
pub const MAX_KEY_ID_LEN: usize = 256;

type Result<T> = std::result::Result<T, KeyManagementError>;

/// Key lifecycle management over a [`KeyStore`].
///
/// Generic over the store and the environment so that tests can run against
/// in-memory or fault-injecting storage with a controlled clock.
pub struct KeyManagementService<S: KeyStore, E: Environment = SystemEnv> {
    store: S,
    env: E,
    config: KmsConfig,
}

impl<S: KeyStore, E: Environment> KeyManagementService<S, E> {
    /// Service with the default configuration.
    pub fn new(store: S, env: E) -> Self {
        Self::with_config(store, env, KmsConfig::default())
    }

    /// Service with an explicit configuration.
    pub fn with_config(store: S, env: E, config: KmsConfig) -> Self {
        Self { store, env, config }
    }

    /// Underlying key store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &KmsConfig {
        &self.config
    }

    /// Create version 1 of a new key in `Active` status.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if any version of `key_id` exists
    /// - `TenantMismatch` if a tenant-scoped caller names another tenant
    /// - `InvalidRequest` if the id or purpose is empty, the id is too long,
    ///   or the usage list is empty
    pub fn generate_key(&self, request: GenerateKeyRequest, caller: &Caller) -> Result<KeyInfo> {
        validate_request(&request)?;

        let tenant_id = match (&caller.tenant_id, request.tenant_id) {
            (None, requested) => requested,
            (Some(own), None) => Some(own.clone()),
            (Some(own), Some(requested)) if *own == requested => Some(requested),
            (Some(_), Some(_)) => {
                return Err(KeyManagementError::TenantMismatch {
                    key_id: request.key_id,
                    caller_id: caller.id.clone(),
                });
            },
        };

        if !self.store.load_versions(&request.key_id)?.is_empty() {
            return Err(KeyManagementError::AlreadyExists { key_id: request.key_id });
        }

        let now = self.env.wall_clock_secs();
        let record = KeyRecord {
            info: KeyInfo {
                allowed_usage: request
                    .allowed_usage
                    .unwrap_or_else(|| request.key_type.default_usage()),
                key_id: request.key_id,
                version_id: 1,
                key_type: request.key_type,
                purpose: request.purpose,
                status: KeyStatus::Active,
                tenant_id,
                created_at_secs: now,
                rotation_due_secs: self.rotation_due(now),
                revoked_at_secs: None,
                revocation_reason: None,
                metadata: request.metadata,
            },
            material: Some(self.generate_material()),
        };

        self.store.insert_key(&record).map_err(|err| match err {
            StorageError::Conflict { key_id, .. } => KeyManagementError::AlreadyExists { key_id },
            other => other.into(),
        })?;

        info!(
            key_id = %record.info.key_id,
            key_type = %record.info.key_type,
            caller = %caller.id,
            "generated key"
        );
        self.audit_lifecycle(&record.info, caller, AccessKind::Generate);

        Ok(record.info.clone())
    }

    /// Key material for `key_id`, by default its active version.
    ///
    /// Returns `Ok(None)` for an unknown key or version. Every successful
    /// retrieval is recorded in the audit trail under `caller`.
    ///
    /// # Errors
    ///
    /// - `Revoked` if the targeted version is revoked or destroyed, or no
    ///   version was named and every version is revoked
    /// - `NoActiveVersion` if no version was named and none is active
    /// - `TenantMismatch` if the caller may not access the key
    pub fn get_key(
        &self,
        key_id: &str,
        version_id: Option<u32>,
        caller: &Caller,
    ) -> Result<Option<KeyMaterial>> {
        let versions = self.load_scoped(key_id, caller)?;
        if versions.is_empty() {
            return Ok(None);
        }

        let record = match version_id {
            Some(version_id) => {
                match versions.into_iter().find(|r| r.info.version_id == version_id) {
                    Some(record) => record,
                    None => return Ok(None),
                }
            },
            None => select_active(key_id, versions)?,
        };

        let material = usable_material(&record)?;
        self.audit_use(&record.info, caller, AccessKind::Retrieve)?;
        debug!(key_id, version_id = record.info.version_id, caller = %caller.id, "key retrieved");

        Ok(Some(material))
    }

    /// Public attributes of a key version, by default the latest.
    ///
    /// Returns `Ok(None)` for an unknown key or version.
    ///
    /// # Errors
    ///
    /// - `TenantMismatch` if the caller may not access the key
    pub fn key_info(
        &self,
        key_id: &str,
        version_id: Option<u32>,
        caller: &Caller,
    ) -> Result<Option<KeyInfo>> {
        let versions = self.load_scoped(key_id, caller)?;
        let record = match version_id {
            Some(version_id) => versions.into_iter().find(|r| r.info.version_id == version_id),
            None => versions.into_iter().last(),
        };
        Ok(record.map(|r| r.info))
    }

    /// Create a new active version and retire the current one.
    ///
    /// The previous version is first claimed by moving it from `Active` to
    /// `Rotating`. The new version is then inserted and the previous one
    /// deprecated in a single store commit, after which the previous version
    /// stays retrievable by explicit version. If that commit fails
    /// transiently, the previous version is restored to `Active`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the key doesn't exist
    /// - `Revoked` or `NoActiveVersion` if there is no version to rotate from
    /// - `Storage` with a [conflict](StorageError::is_conflict) if another
    ///   writer rotated or revoked the key first; this call changed nothing
    /// - `Storage` if the store fails; the key is left with its previous
    ///   active version whenever the store allows it
    pub fn rotate_key(&self, key_id: &str, caller: &Caller) -> Result<KeyInfo> {
        let versions = self.load_scoped(key_id, caller)?;
        let Some(latest_version) = versions.last().map(|r| r.info.version_id) else {
            return Err(KeyManagementError::NotFound { key_id: key_id.to_string(), version_id: None });
        };

        // An interrupted rotation leaves its previous version Rotating and no
        // version Active. Resume from it.
        let current = versions
            .iter()
            .find(|r| r.info.status == KeyStatus::Active)
            .or_else(|| versions.iter().rfind(|r| r.info.status == KeyStatus::Rotating))
            .cloned();
        let Some(mut current) = current else {
            return Err(no_active_error(key_id, &versions));
        };

        let next_version = latest_version.checked_add(1).ok_or_else(|| {
            KeyManagementError::InvalidRequest { reason: format!("key {key_id} has no versions left") }
        })?;

        let claimed = current.info.status == KeyStatus::Active;
        if claimed {
            transition(&mut current, KeyStatus::Rotating);
            self.store.update_key_if(&current, KeyStatus::Active)?;
        }

        let now = self.env.wall_clock_secs();
        let next = KeyRecord {
            info: KeyInfo {
                version_id: next_version,
                status: KeyStatus::Active,
                created_at_secs: now,
                rotation_due_secs: self.rotation_due(now),
                revoked_at_secs: None,
                revocation_reason: None,
                ..current.info.clone()
            },
            material: Some(self.generate_material()),
        };

        let mut retired = current.clone();
        transition(&mut retired, KeyStatus::Deprecated);
        if let Err(err) = self.store.commit_rotation(&retired, KeyStatus::Rotating, &next) {
            // A conflict means another writer now owns the key's lifecycle.
            if claimed && err.is_transient() {
                transition(&mut current, KeyStatus::Active);
                if let Err(revert) = self.store.update_key_if(&current, KeyStatus::Rotating) {
                    warn!(
                        key_id,
                        version_id = current.info.version_id,
                        error = %revert,
                        "could not restore active version after failed rotation"
                    );
                }
            }
            return Err(err.into());
        }

        info!(
            key_id,
            from_version = retired.info.version_id,
            to_version = next_version,
            caller = %caller.id,
            "rotated key"
        );
        self.audit_lifecycle(&next.info, caller, AccessKind::Rotate);

        Ok(next.info)
    }

    /// Revoke one version, or every not-yet-revoked version if `version_id`
    /// is `None`.
    ///
    /// Returns the attributes of the versions that were revoked.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the key or version doesn't exist
    /// - `AlreadyRevoked` if nothing is left to revoke
    /// - `InvalidRequest` if `reason` is blank
    /// - `Storage` with a [conflict](StorageError::is_conflict) if a version
    ///   changed status after it was read; earlier versions in the same call
    ///   stay revoked
    pub fn revoke_key(
        &self,
        key_id: &str,
        version_id: Option<u32>,
        reason: &str,
        caller: &Caller,
    ) -> Result<Vec<KeyInfo>> {
        if reason.trim().is_empty() {
            return Err(KeyManagementError::InvalidRequest {
                reason: "revocation reason is required".to_string(),
            });
        }

        let versions = self.load_scoped(key_id, caller)?;
        if versions.is_empty() {
            return Err(KeyManagementError::NotFound { key_id: key_id.to_string(), version_id });
        }

        let targets: Vec<KeyRecord> = match version_id {
            Some(version_id) => {
                let Some(record) = versions.into_iter().find(|r| r.info.version_id == version_id)
                else {
                    return Err(KeyManagementError::NotFound {
                        key_id: key_id.to_string(),
                        version_id: Some(version_id),
                    });
                };
                vec![record]
            },
            None => versions.into_iter().collect(),
        };

        let targets: Vec<KeyRecord> =
            targets.into_iter().filter(|r| !r.info.status.is_revoked()).collect();
        if targets.is_empty() {
            return Err(KeyManagementError::AlreadyRevoked { key_id: key_id.to_string(), version_id });
        }

        let now = self.env.wall_clock_secs();
        let mut revoked = Vec::with_capacity(targets.len());
        for mut record in targets {
            let expected = record.info.status;
            transition(&mut record, KeyStatus::Revoked);
            record.info.revoked_at_secs = Some(now);
            record.info.revocation_reason = Some(reason.to_string());
            self.store.update_key_if(&record, expected)?;

            info!(
                key_id,
                version_id = record.info.version_id,
                caller = %caller.id,
                reason,
                "revoked key"
            );
            self.audit_lifecycle(&record.info, caller, AccessKind::Revoke);
            revoked.push(record.info.clone());
        }

        Ok(revoked)
    }

    /// Irreversibly erase the material of a revoked version.
    ///
    /// `confirmation` must equal `"DESTROY:{key_id}:{version_id}"`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the version doesn't exist
    /// - `InvalidConfirmation` if the token doesn't match
    /// - `InvalidStatus` if the version is not `Revoked` (including already
    ///   destroyed versions)
    /// - `Storage` with a [conflict](StorageError::is_conflict) if another
    ///   caller destroyed the version first
    pub fn destroy_key(
        &self,
        key_id: &str,
        version_id: u32,
        confirmation: &str,
        caller: &Caller,
    ) -> Result<KeyInfo> {
        let Some(mut record) = self.store.load_key(key_id, version_id)? else {
            return Err(KeyManagementError::NotFound {
                key_id: key_id.to_string(),
                version_id: Some(version_id),
            });
        };
        check_tenant(&record.info, caller)?;

        let expected = format!("DESTROY:{key_id}:{version_id}");
        if !secure_compare(confirmation, &expected) {
            return Err(KeyManagementError::InvalidConfirmation {
                key_id: key_id.to_string(),
                version_id,
            });
        }

        if record.info.status != KeyStatus::Revoked {
            return Err(KeyManagementError::InvalidStatus {
                key_id: key_id.to_string(),
                version_id,
                status: record.info.status,
                required: KeyStatus::Revoked,
            });
        }

        if let Some(mut material) = record.material.take() {
            material.zeroize();
        }
        transition(&mut record, KeyStatus::Destroyed);
        self.store.update_key_if(&record, KeyStatus::Revoked)?;

        info!(key_id, version_id, caller = %caller.id, "destroyed key material");
        self.audit_lifecycle(&record.info, caller, AccessKind::Destroy);

        Ok(record.info)
    }

    /// Every key version matching `filter` that the caller may see, ordered
    /// by key id then version.
    ///
    /// A tenant-scoped caller only sees its own tenant's keys, whatever the
    /// filter names.
    pub fn list_keys(&self, filter: &KeyFilter, caller: &Caller) -> Result<Vec<KeyInfo>> {
        let mut keys: Vec<KeyInfo> = self
            .store
            .list_keys()?
            .into_iter()
            .map(|r| r.info.clone())
            .filter(|info| caller.can_access(info.tenant_id.as_deref()) && filter.matches(info))
            .collect();
        keys.sort_by(|a, b| (&a.key_id, a.version_id).cmp(&(&b.key_id, b.version_id)));
        Ok(keys)
    }

    /// Key ids whose active version is older than the rotation interval.
    pub fn check_rotation_needed(&self) -> Result<Vec<String>> {
        let now = self.env.wall_clock_secs();
        let interval = self.config.rotation_interval.as_secs();

        let mut due: Vec<String> = self
            .store
            .list_keys()?
            .into_iter()
            .filter(|r| {
                r.info.status == KeyStatus::Active
                    && now.saturating_sub(r.info.created_at_secs) > interval
            })
            .map(|r| r.info.key_id.clone())
            .collect();
        due.sort_unstable();
        due.dedup();
        Ok(due)
    }

    /// Key inventory and usage statistics for `[start_secs, end_secs)`.
    ///
    /// Key counts cover versions created before `end_secs`; usage counts
    /// retrievals, encryptions and decryptions inside the period. With a
    /// tenant, both are restricted to that tenant's keys. A tenant-scoped
    /// caller is always restricted to its own tenant, so naming another
    /// tenant yields an empty report.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `start_secs > end_secs`
    pub fn get_key_usage_report(
        &self,
        start_secs: u64,
        end_secs: u64,
        tenant_id: Option<&str>,
        caller: &Caller,
    ) -> Result<KeyUsageReport> {
        if start_secs > end_secs {
            return Err(KeyManagementError::InvalidRequest {
                reason: format!("report period starts after it ends ({start_secs} > {end_secs})"),
            });
        }

        let in_scope = |key_tenant: Option<&str>| {
            caller.can_access(key_tenant) && tenant_id.is_none_or(|t| key_tenant == Some(t))
        };
        let mut report = KeyUsageReport { start_secs, end_secs, ..KeyUsageReport::default() };

        for record in self.store.list_keys()? {
            let info = &record.info;
            if !in_scope(info.tenant_id.as_deref()) || info.created_at_secs >= end_secs {
                continue;
            }
            report.total_keys += 1;
            *report.keys_by_type.entry(info.key_type).or_default() += 1;
            *report.keys_by_status.entry(info.status).or_default() += 1;
        }

        for access in self.store.load_access(start_secs, end_secs)? {
            if !access.kind.is_usage() || !in_scope(access.tenant_id.as_deref()) {
                continue;
            }
            report.total_usage += 1;
            *report.usage_by_key.entry(access.key_id).or_default() += 1;
        }

        Ok(report)
    }

    /// Encrypt a text field under a managed key.
    ///
    /// Uses the active version unless `version_id` names another; only an
    /// `Active` version may encrypt. The envelope is tagged with the version
    /// so [`Self::decrypt`] finds the right material after rotation.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the key or version doesn't exist
    /// - `Revoked` if the version is revoked or destroyed
    /// - `InvalidStatus` if the version is no longer active
    /// - `UsageNotAllowed` if the key may not encrypt
    pub fn encrypt(
        &self,
        key_id: &str,
        version_id: Option<u32>,
        plaintext: &str,
        associated_data: Option<&str>,
        caller: &Caller,
    ) -> Result<String> {
        let record = self.load_for_use(key_id, version_id, caller, KeyUsage::Encrypt)?;
        if !record.info.status.allows_encrypt() {
            return Err(KeyManagementError::InvalidStatus {
                key_id: key_id.to_string(),
                version_id: record.info.version_id,
                status: record.info.status,
                required: KeyStatus::Active,
            });
        }

        let material = usable_material(&record)?;
        let envelope = seal_field(
            material.as_bytes(),
            record.info.version_id,
            self.env.random_array(),
            plaintext,
            associated_data,
        )?;

        self.audit_use(&record.info, caller, AccessKind::Encrypt)?;
        Ok(envelope.to_string())
    }

    /// Decrypt an envelope produced by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// - `Crypto` if the envelope is malformed or fails authentication
    /// - `NotFound` if the key or the envelope's version doesn't exist
    /// - `Revoked` if that version is revoked or destroyed
    /// - `UsageNotAllowed` if the key may not decrypt
    pub fn decrypt(
        &self,
        key_id: &str,
        envelope: &str,
        associated_data: Option<&str>,
        caller: &Caller,
    ) -> Result<String> {
        let envelope = FieldEnvelope::parse(envelope)?;
        let record =
            self.load_for_use(key_id, Some(envelope.version), caller, KeyUsage::Decrypt)?;

        let material = usable_material(&record)?;
        let plaintext = open_field(material.as_bytes(), &envelope, associated_data)?;

        self.audit_use(&record.info, caller, AccessKind::Decrypt)?;
        Ok(plaintext)
    }

    /// All versions of `key_id`, after checking the caller may see them.
    fn load_scoped(&self, key_id: &str, caller: &Caller) -> Result<Vec<KeyRecord>> {
        let versions = self.store.load_versions(key_id)?;
        if let Some(first) = versions.first() {
            check_tenant(&first.info, caller)?;
        }
        Ok(versions)
    }

    /// Version of `key_id` that may serve `usage`.
    fn load_for_use(
        &self,
        key_id: &str,
        version_id: Option<u32>,
        caller: &Caller,
        usage: KeyUsage,
    ) -> Result<KeyRecord> {
        let versions = self.load_scoped(key_id, caller)?;
        if versions.is_empty() {
            return Err(KeyManagementError::NotFound { key_id: key_id.to_string(), version_id });
        }

        let record = match version_id {
            Some(version_id) => versions
                .into_iter()
                .find(|r| r.info.version_id == version_id)
                .ok_or_else(|| KeyManagementError::NotFound {
                    key_id: key_id.to_string(),
                    version_id: Some(version_id),
                })?,
            None => select_active(key_id, versions)?,
        };

        if record.info.status.is_revoked() {
            return Err(revoked_error(&record.info));
        }
        if !record.info.allows(usage) {
            return Err(KeyManagementError::UsageNotAllowed { key_id: key_id.to_string(), usage });
        }

        Ok(record)
    }

    fn generate_material(&self) -> KeyMaterial {
        KeyMaterial::from_bytes(self.env.random_array())
    }

    fn rotation_due(&self, created_at_secs: u64) -> u64 {
        created_at_secs.saturating_add(self.config.rotation_interval.as_secs())
    }

    /// Record a use of key material. Failure fails the operation.
    fn audit_use(&self, info: &KeyInfo, caller: &Caller, kind: AccessKind) -> Result<()> {
        self.store.append_access(&access_record(info, caller, kind, self.env.wall_clock_secs()))?;
        Ok(())
    }

    /// Record a lifecycle change that has already been committed.
    ///
    /// A failure is logged rather than returned: reporting an error for a
    /// committed change invites a retry that would repeat it.
    fn audit_lifecycle(&self, info: &KeyInfo, caller: &Caller, kind: AccessKind) {
        let record = access_record(info, caller, kind, self.env.wall_clock_secs());
        if let Err(err) = self.store.append_access(&record) {
            warn!(
                key_id = %info.key_id,
                version_id = info.version_id,
                kind = ?kind,
                error = %err,
                "failed to record lifecycle audit entry"
            );
        }
    }
}

/// Move a record to `next`, which must be a legal lifecycle step.
fn transition(record: &mut KeyRecord, next: KeyStatus) {
    debug_assert!(
        record.info.status.can_transition_to(next),
        "illegal transition {} -> {next}",
        record.info.status
    );
    record.info.status = next;
}

fn access_record(info: &KeyInfo, caller: &Caller, kind: AccessKind, at_secs: u64) -> AccessRecord {
    AccessRecord {
        key_id: info.key_id.clone(),
        version_id: info.version_id,
        tenant_id: info.tenant_id.clone(),
        caller_id: caller.id.clone(),
        kind,
        at_secs,
    }
}

fn check_tenant(info: &KeyInfo, caller: &Caller) -> Result<()> {
    if caller.can_access(info.tenant_id.as_deref()) {
        Ok(())
    } else {
        Err(KeyManagementError::TenantMismatch {
            key_id: info.key_id.clone(),
            caller_id: caller.id.clone(),
        })
    }
}

fn validate_request(request: &GenerateKeyRequest) -> Result<()> {
    let reason = if request.key_id.trim().is_empty() {
        "key id must not be empty".to_string()
    } else if request.key_id.len() > MAX_KEY_ID_LEN {
        format!("key id longer than {MAX_KEY_ID_LEN} bytes")
    } else if request.purpose.trim().is_empty() {
        "purpose must not be empty".to_string()
    } else if request.allowed_usage.as_ref().is_some_and(std::collections::BTreeSet::is_empty) {
        "allowed usage must not be empty".to_string()
    } else {
        return Ok(());
    };
    Err(KeyManagementError::InvalidRequest { reason })
}

/// The active version, or the error explaining why there is none.
fn select_active(key_id: &str, versions: Vec<KeyRecord>) -> Result<KeyRecord> {
    if let Some(index) = versions.iter().position(|r| r.info.status == KeyStatus::Active) {
        let mut versions = versions;
        return Ok(versions.swap_remove(index));
    }
    Err(no_active_error(key_id, &versions))
}

fn no_active_error(key_id: &str, versions: &[KeyRecord]) -> KeyManagementError {
    match versions.last() {
        Some(latest) if versions.iter().all(|r| r.info.status.is_revoked()) => {
            revoked_error(&latest.info)
        },
        _ => KeyManagementError::NoActiveVersion { key_id: key_id.to_string() },
    }
}

fn revoked_error(info: &KeyInfo) -> KeyManagementError {
    KeyManagementError::Revoked {
        key_id: info.key_id.clone(),
        version_id: info.version_id,
        status: info.status,
    }
}

/// Material of a version that is allowed to release it.
fn usable_material(record: &KeyRecord) -> Result<KeyMaterial> {
    if record.info.status.is_revoked() {
        return Err(revoked_error(&record.info));
    }
    record.material.clone().ok_or_else(|| revoked_error(&record.info))
}
