//! Purpose key derivation using HKDF

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{master_key::MasterKey, purpose::KeyPurpose};

/// Derived key size (256 bits)
pub const DERIVED_KEY_SIZE: usize = 32;

/// HKDF salt; fixed so derivation is reproducible across processes
const DERIVATION_SALT: &[u8] = b"keyward-derivation-v1";

/// Label prefixed to the HKDF info parameter
const PURPOSE_KEY_LABEL: &[u8] = b"keyward:purpose-key";

/// A 256-bit key derived for one `(purpose, version)` pair.
///
/// Zeroized on drop. Not `Clone`: the cache shares one instance behind an
/// `Arc` instead of copying key bytes around.
pub struct DerivedKey {
    key: [u8; DERIVED_KEY_SIZE],
    purpose: KeyPurpose,
    version: u32,
}

impl DerivedKey {
    /// Raw key bytes.
    pub fn key(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.key
    }

    /// Purpose this key was derived for.
    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    /// Version this key was derived for.
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("purpose", &self.purpose)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Derive the key for `(purpose, version)` from the master key.
///
/// # Security
///
/// - One-way: a derived key reveals nothing about the master key or siblings
/// - Different purposes produce unrelated keys (purpose isolation)
/// - Different versions produce unrelated keys (rotation)
/// - Deterministic: same inputs always produce same output, which is what
///   lets old ciphertext be decrypted after rotation
pub fn derive_purpose_key(master: &MasterKey, purpose: KeyPurpose, version: u32) -> DerivedKey {
    let hkdf = Hkdf::<Sha256>::new(Some(DERIVATION_SALT), master.as_bytes());

    // info: label || purpose label || 0x00 || version
    // The separator keeps a purpose label from running into the version bytes.
    let label = purpose.label().as_bytes();
    let mut info = Vec::with_capacity(PURPOSE_KEY_LABEL.len() + label.len() + 5);
    info.extend_from_slice(PURPOSE_KEY_LABEL);
    info.extend_from_slice(label);
    info.push(0);
    info.extend_from_slice(&version.to_be_bytes());

    let mut key = [0u8; DERIVED_KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    DerivedKey { key, purpose, version }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_master() -> MasterKey {
        let bytes: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(37).wrapping_add(11)).collect();
        MasterKey::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn derive_is_deterministic() {
        let master = test_master();

        let a = derive_purpose_key(&master, KeyPurpose::Pii, 1);
        let b = derive_purpose_key(&master, KeyPurpose::Pii, 1);

        assert_eq!(a.key(), b.key(), "same inputs must produce same output");
    }

    #[test]
    fn different_purposes_produce_different_keys() {
        let master = test_master();

        let mut keys: Vec<[u8; 32]> = KeyPurpose::ALL
            .iter()
            .map(|&purpose| *derive_purpose_key(&master, purpose, 1).key())
            .collect();
        keys.sort_unstable();
        keys.dedup();

        assert_eq!(keys.len(), KeyPurpose::ALL.len());
    }

    #[test]
    fn different_versions_produce_different_keys() {
        let master = test_master();

        let v1 = derive_purpose_key(&master, KeyPurpose::Financial, 1);
        let v2 = derive_purpose_key(&master, KeyPurpose::Financial, 2);

        assert_ne!(v1.key(), v2.key());
    }

    #[test]
    fn different_masters_produce_different_keys() {
        let other = MasterKey::from_bytes(&[0xA5; 32]).unwrap();

        let a = derive_purpose_key(&test_master(), KeyPurpose::Phi, 1);
        let b = derive_purpose_key(&other, KeyPurpose::Phi, 1);

        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn debug_omits_key_bytes() {
        let key = derive_purpose_key(&test_master(), KeyPurpose::ApiToken, 3);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("ApiToken"));
        assert!(rendered.contains("version: 3"));
        assert!(!rendered.contains("key:"));
    }
}
