//! Chaotic storage wrapper for fault injection testing
//!
//! Key store wrapper that randomly fails operations to test error handling.
//! Used for chaos testing to ensure lifecycle operations never leave a key
//! without exactly one active version when the store misbehaves.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use super::{KeyStore, StorageError};
use crate::{
    audit::AccessRecord,
    types::{KeyRecord, KeyStatus},
};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying key store but fails operations with
/// `StorageError::Io` at a configured rate. Uses Arc<Mutex<>> for the RNG
/// state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: KeyStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operation counter
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos tests are reproducible with the
/// same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: KeyStore> ChaoticStorage<S> {
    /// Create a chaotic wrapper with the default seed
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    /// Count the operation and decide whether it fails.
    #[allow(clippy::expect_used)]
    fn inject(&self) -> Result<(), StorageError> {
        *self.operation_count.lock().expect("operation_count mutex poisoned") += 1;

        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").next() < self.failure_rate;

        if fail { Err(StorageError::Io("chaotic failure injection".to_string())) } else { Ok(()) }
    }
}

impl<S: KeyStore> KeyStore for ChaoticStorage<S> {
    fn insert_key(&self, record: &KeyRecord) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.insert_key(record)
    }

    fn update_key_if(&self, record: &KeyRecord, expected: KeyStatus) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.update_key_if(record, expected)
    }

    fn commit_rotation(
        &self,
        previous: &KeyRecord,
        expected: KeyStatus,
        next: &KeyRecord,
    ) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.commit_rotation(previous, expected, next)
    }

    fn load_key(&self, key_id: &str, version_id: u32) -> Result<Option<KeyRecord>, StorageError> {
        self.inject()?;
        self.inner.load_key(key_id, version_id)
    }

    fn load_versions(&self, key_id: &str) -> Result<Vec<KeyRecord>, StorageError> {
        self.inject()?;
        self.inner.load_versions(key_id)
    }

    fn list_keys(&self) -> Result<Vec<KeyRecord>, StorageError> {
        self.inject()?;
        self.inner.list_keys()
    }

    fn append_access(&self, record: &AccessRecord) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.append_access(record)
    }

    fn load_access(
        &self,
        from_secs: u64,
        until_secs: u64,
    ) -> Result<Vec<AccessRecord>, StorageError> {
        self.inject()?;
        self.inner.load_access(from_secs, until_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn zero_failure_rate_never_fails() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        for _ in 0..100 {
            storage.list_keys().unwrap();
        }
        assert_eq!(storage.operation_count(), 100);
    }

    #[test]
    fn full_failure_rate_always_fails() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        for _ in 0..10 {
            assert!(storage.list_keys().unwrap_err().is_transient());
        }
    }

    #[test]
    fn same_seed_same_failures() {
        let a = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let b = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        let run = |storage: &ChaoticStorage<MemoryStorage>| -> Vec<bool> {
            (0..50).map(|_| storage.list_keys().is_ok()).collect()
        };

        assert_eq!(run(&a), run(&b));
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between")]
    fn invalid_rate_panics() {
        let _ = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
