//! Redb-backed durable key store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Key
//! records and the audit trail survive restarts. Values are CBOR.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, ReadableTableMetadata, Table, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{KeyStore, StorageError};
use crate::{
    audit::AccessRecord,
    types::{KeyRecord, KeyStatus},
};

/// Table: keys
/// Key: [key_id length: 4 bytes BE][key_id bytes][version_id: 4 bytes BE]
/// Value: CBOR-encoded KeyRecord
const KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("keys");

/// Table: access
/// Key: [at_secs: 8 bytes BE][sequence: 8 bytes BE]
/// Value: CBOR-encoded AccessRecord
const ACCESS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("access");

/// Durable key store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (KEYS, ACCESS).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(KEYS).map_err(io)?;
            let _ = txn.open_table(ACCESS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

/// Fails unless the stored copy of `record` has status `expected`.
///
/// Runs inside the caller's write transaction, so the check and the
/// following write are atomic.
fn check_status(
    table: &Table<'_, &'static [u8], &'static [u8]>,
    record: &KeyRecord,
    expected: KeyStatus,
) -> Result<(), StorageError> {
    let (key_id, version_id) = record.id();
    let key = encode_key_id(key_id, version_id);

    let Some(stored) = table.get(key.as_slice()).map_err(io)? else {
        return Err(StorageError::NotFound { key_id: key_id.to_string(), version_id });
    };
    let stored: KeyRecord = decode_value(stored.value())?;

    if stored.info.status == expected {
        Ok(())
    } else {
        Err(StorageError::StatusChanged {
            key_id: key_id.to_string(),
            version_id,
            expected,
            found: stored.info.status,
        })
    }
}

impl KeyStore for RedbStorage {
    fn insert_key(&self, record: &KeyRecord) -> Result<(), StorageError> {
        let (key_id, version_id) = record.id();
        let key = encode_key_id(key_id, version_id);
        let value = encode_value(record)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(KEYS).map_err(io)?;

            if table.get(key.as_slice()).map_err(io)?.is_some() {
                return Err(StorageError::Conflict { key_id: key_id.to_string(), version_id });
            }

            table.insert(key.as_slice(), value.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn update_key_if(&self, record: &KeyRecord, expected: KeyStatus) -> Result<(), StorageError> {
        let (key_id, version_id) = record.id();
        let key = encode_key_id(key_id, version_id);
        let value = encode_value(record)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(KEYS).map_err(io)?;
            check_status(&table, record, expected)?;
            table.insert(key.as_slice(), value.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn commit_rotation(
        &self,
        previous: &KeyRecord,
        expected: KeyStatus,
        next: &KeyRecord,
    ) -> Result<(), StorageError> {
        let (prev_id, prev_version) = previous.id();
        let prev_key = encode_key_id(prev_id, prev_version);
        let prev_value = encode_value(previous)?;

        let (next_id, next_version) = next.id();
        let next_key = encode_key_id(next_id, next_version);
        let next_value = encode_value(next)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(KEYS).map_err(io)?;
            check_status(&table, previous, expected)?;

            if table.get(next_key.as_slice()).map_err(io)?.is_some() {
                return Err(StorageError::Conflict {
                    key_id: next_id.to_string(),
                    version_id: next_version,
                });
            }

            table.insert(prev_key.as_slice(), prev_value.as_slice()).map_err(io)?;
            table.insert(next_key.as_slice(), next_value.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn load_key(&self, key_id: &str, version_id: u32) -> Result<Option<KeyRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(KEYS).map_err(io)?;

        let key = encode_key_id(key_id, version_id);
        match table.get(key.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode_value(value.value())?)),
            None => Ok(None),
        }
    }

    fn load_versions(&self, key_id: &str) -> Result<Vec<KeyRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(KEYS).map_err(io)?;

        let start_key = encode_key_id(key_id, 0);
        let end_key = encode_key_id(key_id, u32::MAX);

        let mut records = Vec::new();
        for result in table.range(start_key.as_slice()..=end_key.as_slice()).map_err(io)? {
            let (_, value) = result.map_err(io)?;
            records.push(decode_value(value.value())?);
        }

        Ok(records)
    }

    fn list_keys(&self) -> Result<Vec<KeyRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(KEYS).map_err(io)?;

        let mut records = Vec::new();
        for result in table.iter().map_err(io)? {
            let (_, value) = result.map_err(io)?;
            records.push(decode_value(value.value())?);
        }

        Ok(records)
    }

    fn append_access(&self, record: &AccessRecord) -> Result<(), StorageError> {
        let value = encode_value(record)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(ACCESS).map_err(io)?;

            // Table length is a unique, increasing sequence for an append-only table.
            let sequence = table.len().map_err(io)?;
            let key = encode_access_key(record.at_secs, sequence);

            table.insert(key.as_slice(), value.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn load_access(
        &self,
        from_secs: u64,
        until_secs: u64,
    ) -> Result<Vec<AccessRecord>, StorageError> {
        if from_secs >= until_secs {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ACCESS).map_err(io)?;

        let start_key = encode_access_key(from_secs, 0);
        let end_key = encode_access_key(until_secs, 0);

        let mut records = Vec::new();
        for result in table.range(start_key.as_slice()..end_key.as_slice()).map_err(io)? {
            let (_, value) = result.map_err(io)?;
            records.push(decode_value(value.value())?);
        }

        Ok(records)
    }
}

fn io(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encode (key_id, version_id) as a length-prefixed key.
///
/// Layout: [key_id length: 4 bytes BE][key_id bytes][version_id: 4 bytes BE]
/// The length prefix keeps one key id from being a range prefix of another,
/// and the big-endian version keeps versions in numeric order.
fn encode_key_id(key_id: &str, version_id: u32) -> Vec<u8> {
    let id = key_id.as_bytes();
    let mut key = Vec::with_capacity(8 + id.len());
    key.extend_from_slice(&(id.len() as u32).to_be_bytes());
    key.extend_from_slice(id);
    key.extend_from_slice(&version_id.to_be_bytes());
    key
}

/// Encode (at_secs, sequence) as a 16-byte big-endian key.
fn encode_access_key(at_secs: u64, sequence: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&at_secs.to_be_bytes());
    key[8..].copy_from_slice(&sequence.to_be_bytes());
    key
}
