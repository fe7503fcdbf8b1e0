//! Property-based tests for the encryption service
//!
//! These tests verify the fundamental invariants of field and envelope
//! encryption:
//!
//! 1. **Round-trip**: decrypt(encrypt(p)) == p for all plaintexts
//! 2. **Non-determinism**: Encrypting twice never yields the same envelope
//! 3. **Purpose isolation**: A different purpose never decrypts
//! 4. **AAD binding**: Only identical associated data decrypts
//! 5. **Tamper detection**: Any flipped nonce or ciphertext byte is rejected
//! 6. **Version durability**: Rotation never strands older ciphertext

use base64::{Engine as _, engine::general_purpose::STANDARD};
use keyward_core::SystemEnv;
use keyward_crypto::{CryptoError, EncryptionService, FieldEnvelope, KeyPurpose, MasterKey};
use proptest::prelude::*;

fn service(master_seed: u8) -> EncryptionService<SystemEnv> {
    let master: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(29) ^ master_seed).collect();
    EncryptionService::new(MasterKey::from_bytes(&master).unwrap(), SystemEnv::new())
}

fn purpose_strategy() -> impl Strategy<Value = KeyPurpose> {
    prop::sample::select(KeyPurpose::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_field_roundtrip(
        plaintext in any::<String>(),
        purpose in purpose_strategy(),
        aad in prop::option::of("[a-z0-9:-]{0,32}"),
    ) {
        let service = service(1);
        let envelope = service.encrypt_field(&plaintext, purpose, None, aad.as_deref()).unwrap();
        let decrypted = service.decrypt_field(&envelope, purpose, aad.as_deref()).unwrap();

        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn prop_field_encryption_not_deterministic(
        plaintext in any::<String>(),
        purpose in purpose_strategy(),
    ) {
        let service = service(2);
        let a = service.encrypt_field(&plaintext, purpose, None, None).unwrap();
        let b = service.encrypt_field(&plaintext, purpose, None, None).unwrap();

        prop_assert_ne!(a, b);
    }

    #[test]
    fn prop_purpose_isolation(
        plaintext in any::<String>(),
        encrypt_purpose in purpose_strategy(),
        decrypt_purpose in purpose_strategy(),
    ) {
        prop_assume!(encrypt_purpose != decrypt_purpose);

        let service = service(3);
        let envelope = service.encrypt_field(&plaintext, encrypt_purpose, None, None).unwrap();
        let result = service.decrypt_field(&envelope, decrypt_purpose, None);

        prop_assert!(
            matches!(result, Err(CryptoError::DecryptionFailed { .. })),
            "decrypting under a different purpose must fail closed"
        );
    }

    #[test]
    fn prop_aad_binding(
        plaintext in any::<String>(),
        aad in "[a-z0-9]{1,16}",
        other in "[a-z0-9]{1,16}",
    ) {
        prop_assume!(aad != other);

        let service = service(4);
        let envelope = service.encrypt_field(&plaintext, KeyPurpose::Pii, None, Some(&aad)).unwrap();

        prop_assert!(service.decrypt_field(&envelope, KeyPurpose::Pii, Some(&other)).is_err());
        prop_assert!(service.decrypt_field(&envelope, KeyPurpose::Pii, None).is_err());
        prop_assert_eq!(
            service.decrypt_field(&envelope, KeyPurpose::Pii, Some(&aad)).unwrap(),
            plaintext
        );
    }

    #[test]
    fn prop_tampered_envelope_rejected(
        plaintext in "[ -~]{0,64}",
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let service = service(5);
        let envelope = service.encrypt_field(&plaintext, KeyPurpose::Financial, None, None).unwrap();
        let parsed = FieldEnvelope::parse(&envelope).unwrap();

        // Flip one byte somewhere in nonce || ciphertext
        let mut raw = parsed.nonce.to_vec();
        raw.extend_from_slice(&parsed.ciphertext);
        let index = position.index(raw.len());
        raw[index] ^= flip;

        let (nonce, ciphertext) = raw.split_at(12);
        let tampered = format!(
            "v{}:{}:{}",
            parsed.version,
            STANDARD.encode(nonce),
            STANDARD.encode(ciphertext)
        );

        prop_assert!(service.decrypt_field(&tampered, KeyPurpose::Financial, None).is_err());
    }

    #[test]
    fn prop_rotation_preserves_old_versions(
        plaintexts in prop::collection::vec("[ -~]{0,32}", 1..6),
    ) {
        let service = service(6);
        let mut envelopes = Vec::new();

        for (i, plaintext) in plaintexts.iter().enumerate() {
            let envelope = service.encrypt_field(plaintext, KeyPurpose::DatabaseField, None, None).unwrap();
            prop_assert!(envelope.starts_with(&format!("v{}:", i + 1)), "envelope missing version prefix");
            envelopes.push(envelope);
            service.rotate_keys().unwrap();
        }

        for (envelope, plaintext) in envelopes.iter().zip(&plaintexts) {
            prop_assert_eq!(
                &service.decrypt_field(envelope, KeyPurpose::DatabaseField, None).unwrap(),
                plaintext
            );
        }
    }

    #[test]
    fn prop_large_data_roundtrip(
        data in prop::collection::vec(any::<u8>(), 0..8192),
        purpose in purpose_strategy(),
    ) {
        let service = service(7);
        let object = service.encrypt_large_data(&data, purpose, None).unwrap();

        prop_assert_eq!(object.len(), 1 + 12 + 48 + 12 + data.len() + 16);
        prop_assert_eq!(service.decrypt_large_data(&object, purpose).unwrap(), data);
    }

    #[test]
    fn prop_large_data_tamper_rejected(
        data in prop::collection::vec(any::<u8>(), 0..512),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let service = service(8);
        let mut object = service.encrypt_large_data(&data, KeyPurpose::FileStorage, None).unwrap();

        let index = position.index(object.len());
        object[index] ^= flip;

        prop_assert!(service.decrypt_large_data(&object, KeyPurpose::FileStorage).is_err());
    }
}

#[test]
fn different_master_keys_do_not_interoperate() {
    let envelope = service(9).encrypt_field("hello", KeyPurpose::Pii, None, None).unwrap();
    assert!(service(10).decrypt_field(&envelope, KeyPurpose::Pii, None).is_err());
}
