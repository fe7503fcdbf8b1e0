//! Keyward Key Management Service
//!
//! System of record for named, versioned keys: generation, rotation,
//! revocation and destruction, with every use of key material written to an
//! access audit trail.
//!
//! # Architecture
//!
//! ```text
//! KeyManagementService<S, E>
//!        │
//!        ├──► KeyStore (S)      MemoryStorage | RedbStorage | ChaoticStorage<S>
//!        │      key records + access records
//!        │
//!        └──► Environment (E)   wall clock + randomness for key material and nonces
//! ```
//!
//! The service holds no key state of its own. All records live in the
//! [`KeyStore`](storage::KeyStore), so several service handles over clones of
//! one store observe the same keys. Status changes are conditional writes
//! against the status each handle read, so a handle acting on a stale read
//! gets a [conflict](StorageError::is_conflict) instead of overwriting
//! another handle's rotation or revocation.
//!
//! # Lifecycle
//!
//! Each `(key_id, version_id)` pair carries its own [`KeyStatus`]. Rotation
//! adds a version and deprecates the previous one, which keeps decrypting
//! existing data. Revocation stops all use. Destruction erases the material
//! of a revoked version and requires the confirmation token
//! `DESTROY:{key_id}:{version_id}`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod audit;
pub mod config;
pub mod error;
pub mod manager;
pub mod request;
pub mod storage;
pub mod types;

pub use audit::{AccessKind, AccessRecord, Caller, KeyUsageReport};
pub use config::{DEFAULT_ROTATION_INTERVAL, KmsConfig};
pub use error::KeyManagementError;
pub use manager::{KeyManagementService, MAX_KEY_ID_LEN};
pub use request::{GenerateKeyRequest, KeyFilter};
pub use storage::{ChaoticStorage, KeyStore, MemoryStorage, RedbStorage, StorageError};
pub use types::{KEY_MATERIAL_SIZE, KeyInfo, KeyMaterial, KeyRecord, KeyStatus, KeyType, KeyUsage};
