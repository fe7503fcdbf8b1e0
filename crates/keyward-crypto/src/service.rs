//! Encryption service.
//!
//! Field encryption and large-object envelope encryption over purpose keys
//! derived from one master key. The service is constructed once and passed to
//! callers explicitly; all methods take `&self` and are safe to call from many
//! threads at once, including concurrently with [`EncryptionService::rotate_keys`].

use keyward_core::{Environment, SystemEnv};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    aead::{KEY_SIZE, NONCE_SIZE},
    cache::DerivedKeyCache,
    config::EncryptionConfig,
    envelope::{self, ObjectSecrets},
    error::CryptoError,
    field::{self, FieldEnvelope},
    master_key::MasterKey,
    purpose::KeyPurpose,
};

/// Purpose-scoped authenticated encryption.
#[derive(Debug)]
pub struct EncryptionService<E: Environment = SystemEnv> {
    cache: DerivedKeyCache,
    env: E,
}

impl<E: Environment> EncryptionService<E> {
    /// Service at key version 1.
    pub fn new(master: MasterKey, env: E) -> Self {
        let Ok(cache) = DerivedKeyCache::new(master, 1) else {
            unreachable!("version 1 is always a valid starting version");
        };
        Self { cache, env }
    }

    /// Service resuming at `initial_version`.
    ///
    /// # Errors
    ///
    /// - `Configuration` if `initial_version` is zero
    pub fn with_version(
        master: MasterKey,
        env: E,
        initial_version: u32,
    ) -> Result<Self, CryptoError> {
        Ok(Self { cache: DerivedKeyCache::new(master, initial_version)?, env })
    }

    /// Service from a base64 master key.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the key is missing, malformed or shorter than 256
    ///   bits
    pub fn from_base64(encoded: &str, env: E) -> Result<Self, CryptoError> {
        Ok(Self::new(MasterKey::from_base64(encoded)?, env))
    }

    /// Service configured from the process environment.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the variable is unset or holds an unusable key
    pub fn from_config(config: &EncryptionConfig, env: E) -> Result<Self, CryptoError> {
        let encoded = Zeroizing::new(std::env::var(&config.master_key_env).map_err(|_| {
            CryptoError::Configuration {
                reason: format!("environment variable {} is not set", config.master_key_env),
            }
        })?);

        let service =
            Self::with_version(MasterKey::from_base64(&encoded)?, env, config.initial_version)?;
        info!(version = config.initial_version, "encryption service initialized");
        Ok(service)
    }

    /// Current global key version.
    pub fn current_version(&self) -> u32 {
        self.cache.current_version()
    }

    /// Number of purpose keys currently cached.
    pub fn cached_key_count(&self) -> usize {
        self.cache.len()
    }

    /// Encrypt a text field for `purpose`.
    ///
    /// Uses the current version unless `version` names an older one. The
    /// optional associated data is authenticated but not encrypted; the same
    /// value must be presented to [`Self::decrypt_field`].
    ///
    /// # Errors
    ///
    /// - `EncryptionFailed` if `version` is zero or newer than the current
    ///   version
    pub fn encrypt_field(
        &self,
        plaintext: &str,
        purpose: KeyPurpose,
        version: Option<u32>,
        associated_data: Option<&str>,
    ) -> Result<String, CryptoError> {
        let key = self
            .cache
            .resolve(purpose, version)
            .ok_or_else(|| CryptoError::encryption("unknown key version"))?;

        let nonce = self.env.random_array::<NONCE_SIZE>();
        let envelope =
            field::seal_field(key.key(), key.version(), nonce, plaintext, associated_data)?;

        Ok(envelope.to_string())
    }

    /// Decrypt a field envelope produced for `purpose`.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the envelope is malformed, names an unknown
    ///   version, or fails authentication (wrong purpose, wrong associated
    ///   data, tampering)
    pub fn decrypt_field(
        &self,
        envelope: &str,
        purpose: KeyPurpose,
        associated_data: Option<&str>,
    ) -> Result<String, CryptoError> {
        let result = FieldEnvelope::parse(envelope).and_then(|parsed| {
            let key = self
                .cache
                .resolve(purpose, Some(parsed.version))
                .ok_or_else(|| CryptoError::decryption("unknown key version"))?;
            field::open_field(key.key(), &parsed, associated_data)
        });

        result.inspect_err(|err| debug!(%purpose, error = %err, "field decryption failed"))
    }

    /// Envelope-encrypt a payload of any size for `purpose`.
    ///
    /// A fresh DEK encrypts the payload and the purpose key wraps the DEK.
    ///
    /// # Errors
    ///
    /// - `EncryptionFailed` if `version` is unknown or above
    ///   [`MAX_OBJECT_VERSION`](envelope::MAX_OBJECT_VERSION), the largest
    ///   version the one-byte header can carry
    pub fn encrypt_large_data(
        &self,
        data: &[u8],
        purpose: KeyPurpose,
        version: Option<u32>,
    ) -> Result<Vec<u8>, CryptoError> {
        let kek = self
            .cache
            .resolve(purpose, version)
            .ok_or_else(|| CryptoError::encryption("unknown key version"))?;
        let key_version = u8::try_from(kek.version())
            .map_err(|_| CryptoError::encryption("key version exceeds object header range"))?;

        let secrets = ObjectSecrets {
            dek: Zeroizing::new(self.env.random_array::<KEY_SIZE>()),
            kek_nonce: self.env.random_array(),
            dek_nonce: self.env.random_array(),
        };

        envelope::seal_object(kek.key(), key_version, &secrets, data)
    }

    /// Decrypt an object produced by [`Self::encrypt_large_data`].
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the object is truncated, names an unknown
    ///   version, or fails authentication
    pub fn decrypt_large_data(
        &self,
        object: &[u8],
        purpose: KeyPurpose,
    ) -> Result<Vec<u8>, CryptoError> {
        let result = envelope::object_version(object).and_then(|version| {
            let kek = self
                .cache
                .resolve(purpose, Some(u32::from(version)))
                .ok_or_else(|| CryptoError::decryption("unknown key version"))?;
            envelope::open_object(kek.key(), object)
        });

        result.inspect_err(|err| debug!(%purpose, error = %err, "object decryption failed"))
    }

    /// Advance the global key version and invalidate the derived key cache.
    ///
    /// Ciphertext tagged with earlier versions remains decryptable.
    ///
    /// Large objects record their version in a single header byte. Once the
    /// version passes [`MAX_OBJECT_VERSION`](envelope::MAX_OBJECT_VERSION),
    /// [`Self::encrypt_large_data`] at the current version fails; objects
    /// written earlier still decrypt and an explicit version up to the limit
    /// still encrypts. Field encryption is unaffected.
    ///
    /// # Errors
    ///
    /// - `VersionOverflow` if the version cannot advance
    pub fn rotate_keys(&self) -> Result<u32, CryptoError> {
        let version = self.cache.rotate()?;
        info!(version, "rotated global key version");
        if version == envelope::MAX_OBJECT_VERSION + 1 {
            warn!(
                version,
                limit = envelope::MAX_OBJECT_VERSION,
                "key version passed the large-object header range"
            );
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct CountingEnv {
        counter: std::sync::Arc<std::sync::atomic::AtomicU64>,
    }

    impl CountingEnv {
        fn new() -> Self {
            Self { counter: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(1)) }
        }
    }

    impl Environment for CountingEnv {
        fn wall_clock_secs(&self) -> u64 {
            1_700_000_000
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = (n as u8).wrapping_mul(31).wrapping_add(i as u8);
            }
        }
    }

    fn service() -> EncryptionService<CountingEnv> {
        let master: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(13).wrapping_add(5)).collect();
        EncryptionService::new(MasterKey::from_bytes(&master).unwrap(), CountingEnv::new())
    }

    #[test]
    fn field_round_trip() {
        let service = service();
        let envelope = service.encrypt_field("123-45-6789", KeyPurpose::Pii, None, None).unwrap();

        assert!(envelope.starts_with("v1:"));
        assert_eq!(service.decrypt_field(&envelope, KeyPurpose::Pii, None).unwrap(), "123-45-6789");
    }

    #[test]
    fn field_encryption_is_not_deterministic() {
        let service = service();
        let a = service.encrypt_field("same", KeyPurpose::Pii, None, None).unwrap();
        let b = service.encrypt_field("same", KeyPurpose::Pii, None, None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_purpose_fails() {
        let service = service();
        let envelope = service.encrypt_field("secret", KeyPurpose::Pii, None, None).unwrap();
        let err = service.decrypt_field(&envelope, KeyPurpose::Financial, None).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed { .. }));
    }

    #[test]
    fn future_version_rejected() {
        let service = service();
        assert!(matches!(
            service.encrypt_field("x", KeyPurpose::Pii, Some(2), None),
            Err(CryptoError::EncryptionFailed { .. })
        ));

        let envelope = service.encrypt_field("x", KeyPurpose::Pii, None, None).unwrap();
        let forged = envelope.replacen("v1:", "v2:", 1);
        assert!(matches!(
            service.decrypt_field(&forged, KeyPurpose::Pii, None),
            Err(CryptoError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn rotation_preserves_old_ciphertext() {
        let service = service();
        let old = service.encrypt_field("before", KeyPurpose::Phi, None, None).unwrap();
        let old_object = service.encrypt_large_data(b"before", KeyPurpose::Phi, None).unwrap();

        assert_eq!(service.rotate_keys().unwrap(), 2);
        assert_eq!(service.cached_key_count(), 0);

        let new = service.encrypt_field("after", KeyPurpose::Phi, None, None).unwrap();
        assert!(new.starts_with("v2:"));

        assert_eq!(service.decrypt_field(&old, KeyPurpose::Phi, None).unwrap(), "before");
        assert_eq!(service.decrypt_field(&new, KeyPurpose::Phi, None).unwrap(), "after");
        assert_eq!(service.decrypt_large_data(&old_object, KeyPurpose::Phi).unwrap(), b"before");
    }

    #[test]
    fn explicit_old_version_after_rotation() {
        let service = service();
        service.rotate_keys().unwrap();

        let envelope = service.encrypt_field("legacy", KeyPurpose::Pii, Some(1), None).unwrap();
        assert!(envelope.starts_with("v1:"));
        assert_eq!(service.decrypt_field(&envelope, KeyPurpose::Pii, None).unwrap(), "legacy");
    }

    #[test]
    fn large_data_round_trip() {
        let service = service();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let object = service.encrypt_large_data(&data, KeyPurpose::FileStorage, None).unwrap();
        assert_eq!(object[0], 1);
        assert_eq!(service.decrypt_large_data(&object, KeyPurpose::FileStorage).unwrap(), data);
        assert!(service.decrypt_large_data(&object, KeyPurpose::Pii).is_err());
    }

    #[test]
    fn large_data_rejects_versions_beyond_header_range() {
        let master = MasterKey::from_bytes(&[3u8; 32]).unwrap();
        let service = EncryptionService::with_version(master, CountingEnv::new(), 256).unwrap();

        assert!(matches!(
            service.encrypt_large_data(b"x", KeyPurpose::FileStorage, None),
            Err(CryptoError::EncryptionFailed { .. })
        ));
        let object =
            service.encrypt_large_data(b"x", KeyPurpose::FileStorage, Some(255)).unwrap();
        assert_eq!(object[0], 255);
    }

    #[test]
    fn rotation_past_object_range_keeps_older_objects_readable() {
        let master = MasterKey::from_bytes(&[3u8; 32]).unwrap();
        let service = EncryptionService::with_version(
            master,
            CountingEnv::new(),
            envelope::MAX_OBJECT_VERSION,
        )
        .unwrap();
        let last = service.encrypt_large_data(b"archive", KeyPurpose::FileStorage, None).unwrap();

        assert_eq!(service.rotate_keys().unwrap(), envelope::MAX_OBJECT_VERSION + 1);

        assert!(service.encrypt_large_data(b"new", KeyPurpose::FileStorage, None).is_err());
        assert_eq!(service.decrypt_large_data(&last, KeyPurpose::FileStorage).unwrap(), b"archive");
        let pinned = service
            .encrypt_large_data(b"new", KeyPurpose::FileStorage, Some(envelope::MAX_OBJECT_VERSION))
            .unwrap();
        assert_eq!(service.decrypt_large_data(&pinned, KeyPurpose::FileStorage).unwrap(), b"new");

        let field = service.encrypt_field("still fine", KeyPurpose::Pii, None, None).unwrap();
        assert!(field.starts_with("v256:"));
    }

    #[test]
    fn from_base64_rejects_short_key() {
        let err = EncryptionService::from_base64("c2hvcnQ=", CountingEnv::new()).unwrap_err();
        assert!(matches!(err, CryptoError::Configuration { .. }));
    }

    #[test]
    fn from_config_requires_variable() {
        let config = EncryptionConfig {
            master_key_env: "KEYWARD_TEST_UNSET_MASTER_KEY_VARIABLE".to_string(),
            initial_version: 1,
        };
        let err = EncryptionService::from_config(&config, CountingEnv::new()).unwrap_err();
        assert!(matches!(err, CryptoError::Configuration { .. }));
    }
}
