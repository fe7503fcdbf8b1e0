//! Storage abstraction for managed keys
//!
//! Trait-based abstraction for persisting key records and the access audit
//! trail. The trait is synchronous: key management calls are short, and a
//! durable backend blocks only for its own transaction.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;
use crate::{
    audit::AccessRecord,
    types::{KeyRecord, KeyStatus},
};

/// Storage abstraction for key records and access records
///
/// Must be Clone (shared between service handles), Send + Sync (thread-safe),
/// and synchronous. Implementations typically share internal state via Arc,
/// so clones access the same underlying storage.
///
/// Every call is fallible and may be retried by the caller when the error is
/// [transient](StorageError::is_transient).
pub trait KeyStore: Clone + Send + Sync + 'static {
    /// Persist a new key version.
    ///
    /// # Invariants
    ///
    /// - Pre: no record exists for `(key_id, version_id)`
    /// - Post: record is persisted; otherwise `Conflict` and nothing changes
    fn insert_key(&self, record: &KeyRecord) -> Result<(), StorageError>;

    /// Overwrite an existing key version if its stored status is still
    /// `expected`.
    ///
    /// The status check and the write happen atomically, so a writer acting
    /// on a stale read cannot undo another writer's transition.
    ///
    /// # Invariants
    ///
    /// - Pre: the version exists, otherwise `NotFound`
    /// - Pre: its stored status is `expected`, otherwise `StatusChanged`
    /// - Post: record is persisted; on any error nothing changes
    fn update_key_if(&self, record: &KeyRecord, expected: KeyStatus) -> Result<(), StorageError>;

    /// Retire `previous` and insert `next` in one atomic step.
    ///
    /// Used to complete a rotation: `previous` carries its retired status and
    /// `next` is the new active version.
    ///
    /// # Invariants
    ///
    /// - Pre: `previous` exists with stored status `expected`, otherwise
    ///   `NotFound` or `StatusChanged`
    /// - Pre: `next` does not exist, otherwise `Conflict`
    /// - Post: both records are persisted; on any error nothing changes
    fn commit_rotation(
        &self,
        previous: &KeyRecord,
        expected: KeyStatus,
        next: &KeyRecord,
    ) -> Result<(), StorageError>;

    /// Load one key version. `None` if it doesn't exist.
    fn load_key(&self, key_id: &str, version_id: u32) -> Result<Option<KeyRecord>, StorageError>;

    /// Load every version of a key in ascending version order.
    ///
    /// Empty if the key doesn't exist.
    fn load_versions(&self, key_id: &str) -> Result<Vec<KeyRecord>, StorageError>;

    /// Load every version of every key. Order is not guaranteed.
    fn list_keys(&self) -> Result<Vec<KeyRecord>, StorageError>;

    /// Append an entry to the audit trail.
    fn append_access(&self, record: &AccessRecord) -> Result<(), StorageError>;

    /// Audit entries with `from_secs <= at_secs < until_secs`, oldest first.
    fn load_access(
        &self,
        from_secs: u64,
        until_secs: u64,
    ) -> Result<Vec<AccessRecord>, StorageError>;
}
