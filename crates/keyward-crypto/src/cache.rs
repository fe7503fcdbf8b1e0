//! Derived key cache with atomic version rotation.
//!
//! Holds the master key and every purpose key derived from it in this
//! process. The current global version and the cached keys live behind a
//! single `RwLock`, so a caller resolving "the current key" sees the version
//! number and the key for that version from the same snapshot. Rotation takes
//! the write lock, bumps the version and empties the map in one step.
//!
//! # Invariants
//!
//! - Versions are in `1..=current_version`
//! - A cached entry for `(purpose, version)` always equals
//!   `derive_purpose_key(master, purpose, version)`
//! - Rotation never makes an older version underivable

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    derivation::{DerivedKey, derive_purpose_key},
    error::CryptoError,
    master_key::MasterKey,
    purpose::KeyPurpose,
};

struct CacheState {
    current_version: u32,
    keys: HashMap<(KeyPurpose, u32), Arc<DerivedKey>>,
}

/// Thread-safe cache of purpose keys, owner of the master key.
pub struct DerivedKeyCache {
    master: MasterKey,
    state: RwLock<CacheState>,
}

impl DerivedKeyCache {
    /// Create a cache starting at `initial_version`.
    ///
    /// # Errors
    ///
    /// - `Configuration` if `initial_version` is zero
    pub fn new(master: MasterKey, initial_version: u32) -> Result<Self, CryptoError> {
        if initial_version == 0 {
            return Err(CryptoError::Configuration {
                reason: "key versions start at 1".to_string(),
            });
        }

        Ok(Self {
            master,
            state: RwLock::new(CacheState { current_version: initial_version, keys: HashMap::new() }),
        })
    }

    /// Current global key version.
    pub fn current_version(&self) -> u32 {
        self.read().current_version
    }

    /// Number of purpose keys currently cached.
    pub fn len(&self) -> usize {
        self.read().keys.len()
    }

    /// Whether no purpose key is cached.
    pub fn is_empty(&self) -> bool {
        self.read().keys.is_empty()
    }

    /// Key for `purpose` at `version`, or at the current version if `None`.
    ///
    /// Returns `None` when the requested version is zero or newer than the
    /// current version.
    pub fn resolve(&self, purpose: KeyPurpose, version: Option<u32>) -> Option<Arc<DerivedKey>> {
        {
            let state = self.read();
            let version = version.unwrap_or(state.current_version);
            if !is_known(&state, version) {
                return None;
            }
            if let Some(key) = state.keys.get(&(purpose, version)) {
                return Some(Arc::clone(key));
            }
        }

        // Miss: re-resolve under the write lock. A rotation may have happened
        // since the read lock was released, and the snapshot must be the one
        // the key is derived from.
        let mut state = self.write();
        let version = version.unwrap_or(state.current_version);
        if !is_known(&state, version) {
            return None;
        }

        let key = state
            .keys
            .entry((purpose, version))
            .or_insert_with(|| Arc::new(derive_purpose_key(&self.master, purpose, version)));

        Some(Arc::clone(key))
    }

    /// Advance the global version and drop every cached key.
    ///
    /// Returns the new version. Keys for older versions are re-derived on
    /// demand.
    ///
    /// # Errors
    ///
    /// - `VersionOverflow` if the version is already `u32::MAX`
    pub fn rotate(&self) -> Result<u32, CryptoError> {
        let mut state = self.write();
        let current = state.current_version;
        let next = current.checked_add(1).ok_or(CryptoError::VersionOverflow { current })?;

        state.current_version = next;
        state.keys.clear();

        Ok(next)
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        // The state is never left half-updated, so a poisoned lock is usable.
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_known(state: &CacheState, version: u32) -> bool {
    (1..=state.current_version).contains(&version)
}

impl std::fmt::Debug for DerivedKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("DerivedKeyCache")
            .field("current_version", &state.current_version)
            .field("cached", &state.keys.len())
            .finish_non_exhaustive()
    }
}
