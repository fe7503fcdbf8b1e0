//! Concurrent use of the encryption service during rotation.
//!
//! Worker threads encrypt and immediately decrypt while another thread
//! rotates the global version. Every envelope must decrypt, and the version a
//! worker observes must never go backwards.

use std::{sync::Arc, thread};

use keyward_core::SystemEnv;
use keyward_crypto::{EncryptionService, FieldEnvelope, KeyPurpose, MasterKey};

const WORKERS: usize = 4;
const ITERATIONS: usize = 200;
const ROTATIONS: u32 = 50;

#[test]
fn rotation_is_atomic_for_concurrent_callers() {
    let bytes: Vec<u8> = (0u8..32).map(|i| i.wrapping_mul(71) ^ 0x5A).collect();
    let master = MasterKey::from_bytes(&bytes).unwrap();
    let service = Arc::new(EncryptionService::new(master, SystemEnv::new()));

    let rotator = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for _ in 0..ROTATIONS {
                service.rotate_keys().unwrap();
                thread::yield_now();
            }
        })
    };

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let purpose = KeyPurpose::ALL[worker % KeyPurpose::ALL.len()];
                let mut last_version = 0;
                for i in 0..ITERATIONS {
                    let plaintext = format!("worker-{worker}-record-{i}");
                    let envelope = service.encrypt_field(&plaintext, purpose, None, None).unwrap();

                    let version = FieldEnvelope::peek_version(&envelope).unwrap();
                    assert!(version >= last_version, "observed version went backwards");
                    last_version = version;

                    let decrypted = service.decrypt_field(&envelope, purpose, None).unwrap();
                    assert_eq!(decrypted, plaintext);
                }
            })
        })
        .collect();

    rotator.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(service.current_version(), 1 + ROTATIONS);
}
