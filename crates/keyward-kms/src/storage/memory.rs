#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use super::{KeyStore, StorageError};
use crate::{
    audit::AccessRecord,
    types::{KeyRecord, KeyStatus},
};

/// In-memory key store for testing and single-process use
///
/// Records are kept in a `BTreeMap` ordered by `(key_id, version_id)`, so
/// per-key version scans are range queries. The audit trail is an append-only
/// Vec. All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent
/// access; `lock().expect()` panics if the mutex is poisoned, which is
/// acceptable for test code.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// Key records by (`key_id`, `version_id`)
    keys: BTreeMap<(String, u32), KeyRecord>,

    /// Audit trail in append order
    access: Vec<AccessRecord>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored key versions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn key_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").keys.len()
    }

    /// Number of audit entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn access_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").access.len()
    }
}

impl MemoryStorageInner {
    /// Fails unless the stored copy of `record` has status `expected`.
    fn check_status(&self, record: &KeyRecord, expected: KeyStatus) -> Result<(), StorageError> {
        let (key_id, version_id) = record.id();
        match self.keys.get(&record_id(record)) {
            Some(stored) if stored.info.status == expected => Ok(()),
            Some(stored) => Err(StorageError::StatusChanged {
                key_id: key_id.to_string(),
                version_id,
                expected,
                found: stored.info.status,
            }),
            None => Err(StorageError::NotFound { key_id: key_id.to_string(), version_id }),
        }
    }
}

fn record_id(record: &KeyRecord) -> (String, u32) {
    (record.info.key_id.clone(), record.info.version_id)
}

impl KeyStore for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn insert_key(&self, record: &KeyRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let id = record_id(record);

        if inner.keys.contains_key(&id) {
            return Err(StorageError::Conflict { key_id: id.0, version_id: id.1 });
        }

        inner.keys.insert(id, record.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn update_key_if(&self, record: &KeyRecord, expected: KeyStatus) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.check_status(record, expected)?;
        inner.keys.insert(record_id(record), record.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn commit_rotation(
        &self,
        previous: &KeyRecord,
        expected: KeyStatus,
        next: &KeyRecord,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.check_status(previous, expected)?;

        let next_id = record_id(next);
        if inner.keys.contains_key(&next_id) {
            return Err(StorageError::Conflict { key_id: next_id.0, version_id: next_id.1 });
        }

        inner.keys.insert(record_id(previous), previous.clone());
        inner.keys.insert(next_id, next.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_key(&self, key_id: &str, version_id: u32) -> Result<Option<KeyRecord>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.keys.get(&(key_id.to_string(), version_id)).cloned())
    }

    #[allow(clippy::expect_used)]
    fn load_versions(&self, key_id: &str) -> Result<Vec<KeyRecord>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        let start = (key_id.to_string(), 0);
        let end = (key_id.to_string(), u32::MAX);

        Ok(inner.keys.range(start..=end).map(|(_, record)| record.clone()).collect())
    }

    #[allow(clippy::expect_used)]
    fn list_keys(&self) -> Result<Vec<KeyRecord>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.keys.values().cloned().collect())
    }

    #[allow(clippy::expect_used)]
    fn append_access(&self, record: &AccessRecord) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").access.push(record.clone());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_access(
        &self,
        from_secs: u64,
        until_secs: u64,
    ) -> Result<Vec<AccessRecord>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        let mut records: Vec<AccessRecord> = inner
            .access
            .iter()
            .filter(|record| (from_secs..until_secs).contains(&record.at_secs))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.at_secs);
        Ok(records)
    }
}
