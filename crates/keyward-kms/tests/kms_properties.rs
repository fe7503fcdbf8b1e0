//! Property-based tests for the key management service
//!
//! These tests verify the lifecycle invariants across arbitrary operation
//! sequences:
//!
//! 1. **Single active version**: At most one active version per key id
//! 2. **Rotation durability**: Data encrypted under any version decrypts
//!    until that version is revoked
//! 3. **Revocation is final**: A revoked version never serves again
//! 4. **Ordering**: Listings are sorted by key id, then version

use keyward_core::SystemEnv;
use keyward_kms::{
    Caller, GenerateKeyRequest, KeyFilter, KeyManagementError, KeyManagementService, KeyStatus,
    KeyType, MemoryStorage,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Rotate(usize),
    Encrypt(usize, String),
    RevokeOldest(usize),
}

const KEY_IDS: [&str; 3] = ["alpha", "beta", "gamma"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEY_IDS.len()).prop_map(Op::Rotate),
        (0..KEY_IDS.len(), "[a-z ]{0,24}").prop_map(|(k, p)| Op::Encrypt(k, p)),
        (0..KEY_IDS.len()).prop_map(Op::RevokeOldest),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_lifecycle_invariants(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let kms = KeyManagementService::new(MemoryStorage::new(), SystemEnv::new());
        let caller = Caller::operator("prop");
        for key_id in KEY_IDS {
            kms.generate_key(GenerateKeyRequest::new(KeyType::Data, key_id, "documents"), &caller)
                .unwrap();
        }

        // (key, version, envelope, plaintext)
        let mut written: Vec<(usize, u32, String, String)> = Vec::new();

        for op in ops {
            match op {
                Op::Rotate(k) => {
                    kms.rotate_key(KEY_IDS[k], &caller).unwrap();
                },
                Op::Encrypt(k, plaintext) => {
                    let envelope = kms.encrypt(KEY_IDS[k], None, &plaintext, None, &caller).unwrap();
                    let active = kms
                        .list_keys(&KeyFilter::all().status(KeyStatus::Active), &caller)
                        .unwrap()
                        .into_iter()
                        .find(|info| info.key_id == KEY_IDS[k])
                        .unwrap();
                    written.push((k, active.version_id, envelope, plaintext));
                },
                Op::RevokeOldest(k) => {
                    let oldest = kms
                        .list_keys(&KeyFilter::all(), &caller)
                        .unwrap()
                        .into_iter()
                        .find(|info| {
                            info.key_id == KEY_IDS[k]
                                && !info.status.is_revoked()
                                && info.status != KeyStatus::Active
                        });
                    if let Some(info) = oldest {
                        kms.revoke_key(KEY_IDS[k], Some(info.version_id), "aged out", &caller)
                            .unwrap();
                    }
                },
            }

            let keys = kms.list_keys(&KeyFilter::all(), &caller).unwrap();
            let ordered: Vec<(String, u32)> =
                keys.iter().map(|info| (info.key_id.clone(), info.version_id)).collect();
            let mut sorted = ordered.clone();
            sorted.sort();
            prop_assert_eq!(ordered, sorted);

            for key_id in KEY_IDS {
                let active = keys
                    .iter()
                    .filter(|info| info.key_id == key_id && info.status == KeyStatus::Active)
                    .count();
                prop_assert_eq!(active, 1);
            }
        }

        for (k, version, envelope, plaintext) in written {
            let status = kms
                .list_keys(&KeyFilter::all(), &caller)
                .unwrap()
                .into_iter()
                .find(|info| info.key_id == KEY_IDS[k] && info.version_id == version)
                .map(|info| info.status)
                .unwrap();

            match kms.decrypt(KEY_IDS[k], &envelope, None, &caller) {
                Ok(decrypted) => {
                    prop_assert!(!status.is_revoked());
                    prop_assert_eq!(decrypted, plaintext);
                },
                Err(KeyManagementError::Revoked { version_id, .. }) => {
                    prop_assert!(status.is_revoked());
                    prop_assert_eq!(version_id, version);
                },
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn prop_revoked_version_never_serves(rotations in 0usize..5, target in 0u32..6) {
        let kms = KeyManagementService::new(MemoryStorage::new(), SystemEnv::new());
        let caller = Caller::operator("prop");
        kms.generate_key(GenerateKeyRequest::new(KeyType::Data, "k", "documents"), &caller)
            .unwrap();
        for _ in 0..rotations {
            kms.rotate_key("k", &caller).unwrap();
        }

        let latest = rotations as u32 + 1;
        let target = target % latest + 1;
        kms.revoke_key("k", Some(target), "test", &caller).unwrap();

        let is_revoked = |result: Result<_, KeyManagementError>| {
            matches!(result, Err(KeyManagementError::Revoked { .. }))
        };
        prop_assert!(is_revoked(kms.get_key("k", Some(target), &caller).map(|_| ())));
        prop_assert!(is_revoked(kms.encrypt("k", Some(target), "x", None, &caller).map(|_| ())));
        prop_assert!(matches!(
            kms.revoke_key("k", Some(target), "again", &caller),
            Err(KeyManagementError::AlreadyRevoked { .. })
        ), "expected AlreadyRevoked on second revoke");

        if target == latest {
            let default = kms.get_key("k", None, &caller).map(|_| ());
            if rotations == 0 {
                prop_assert!(is_revoked(default));
            } else {
                let no_active = matches!(default, Err(KeyManagementError::NoActiveVersion { .. }));
                prop_assert!(no_active);
            }
        }
    }
}
