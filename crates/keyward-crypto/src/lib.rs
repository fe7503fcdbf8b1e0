//! Keyward Encryption Service
//!
//! Field and envelope encryption over purpose keys derived from a single
//! master key. Cryptographic building blocks (derivation, AEAD, envelope
//! formats) are pure functions; the [`EncryptionService`] ties them to a
//! derived key cache and an [`Environment`](keyward_core::Environment) that
//! supplies nonces and data keys.
//!
//! # Key Hierarchy
//!
//! ```text
//! Master Key (256-bit, provisioned out-of-band)
//!        │
//!        ▼
//! HKDF-SHA256(purpose, version) → Purpose Key (cached per process)
//!        │
//!        ├──► ChaCha20-Poly1305 → Field Envelope  "v{N}:{nonce}:{ciphertext}"
//!        │
//!        └──► wraps a fresh DEK → Large-Object Envelope
//!                                   [ver][kek_nonce][wrapped_dek][dek_nonce][ct]
//! ```
//!
//! # Security
//!
//! Purpose Isolation:
//! - Every purpose label feeds HKDF, so purposes never share a key
//! - Decrypting under the wrong purpose fails authentication
//!
//! Rotation:
//! - `rotate_keys` advances the global version and clears the cache
//! - Ciphertext carries its version, so older keys are re-derived on demand
//! - Version snapshot and key lookup happen under one lock; a concurrent
//!   rotation is observed entirely or not at all
//!
//! Fail Closed:
//! - Malformed input, unknown versions and tag failures all return
//!   [`CryptoError::DecryptionFailed`]; no partial plaintext is ever returned
//! - Errors and `Debug` output never contain key bytes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod cache;
pub mod compare;
pub mod config;
pub mod derivation;
pub mod envelope;
pub mod error;
pub mod field;
pub mod master_key;
pub mod purpose;
pub mod service;

pub use cache::DerivedKeyCache;
pub use compare::secure_compare;
pub use config::{DEFAULT_MASTER_KEY_ENV, EncryptionConfig};
pub use derivation::{DERIVED_KEY_SIZE, DerivedKey, derive_purpose_key};
pub use envelope::MAX_OBJECT_VERSION;
pub use error::CryptoError;
pub use field::{FieldEnvelope, open_field, seal_field};
pub use master_key::{MASTER_KEY_SIZE, MasterKey, generate_master_key, validate_key_strength};
pub use purpose::KeyPurpose;
pub use service::EncryptionService;
