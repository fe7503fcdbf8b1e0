//! Large-object envelope encryption.
//!
//! A fresh data encryption key (DEK) encrypts the payload; the purpose key
//! (KEK) only ever encrypts that 32-byte DEK. Layout:
//!
//! ```text
//! [key_version: 1][kek_nonce: 12][wrapped_dek: 48][dek_nonce: 12][ciphertext]
//! ```
//!
//! `wrapped_dek` is the DEK plus its 16-byte tag. The wrap authenticates the
//! version byte, and the payload authenticates the first 61 bytes (version,
//! KEK nonce and wrapped DEK), so no header byte can be swapped without
//! failing decryption.
//!
//! # Security
//!
//! - The unwrapped DEK only exists in zeroizing memory
//! - A DEK is never reused across objects

use zeroize::Zeroizing;

use crate::{
    aead::{self, KEY_SIZE, NONCE_SIZE, TAG_SIZE},
    error::CryptoError,
};

/// Largest key version the one-byte header can carry
pub const MAX_OBJECT_VERSION: u32 = u8::MAX as u32;

/// Wrapped DEK length (key plus tag)
pub const WRAPPED_DEK_SIZE: usize = KEY_SIZE + TAG_SIZE;

const KEK_NONCE_OFFSET: usize = 1;
const WRAPPED_DEK_OFFSET: usize = KEK_NONCE_OFFSET + NONCE_SIZE;
const DEK_NONCE_OFFSET: usize = WRAPPED_DEK_OFFSET + WRAPPED_DEK_SIZE;
const CIPHERTEXT_OFFSET: usize = DEK_NONCE_OFFSET + NONCE_SIZE;

/// Fixed header length preceding the payload ciphertext (73 bytes)
pub const HEADER_SIZE: usize = CIPHERTEXT_OFFSET;

/// Smallest well-formed object: header plus the tag of an empty payload
pub const MIN_OBJECT_SIZE: usize = HEADER_SIZE + TAG_SIZE;

/// Per-object randomness supplied by the caller.
pub struct ObjectSecrets {
    /// Data encryption key
    pub dek: Zeroizing<[u8; KEY_SIZE]>,
    /// Nonce for wrapping the DEK under the KEK
    pub kek_nonce: [u8; NONCE_SIZE],
    /// Nonce for encrypting the payload under the DEK
    pub dek_nonce: [u8; NONCE_SIZE],
}

/// Key version recorded in an object's first byte.
///
/// # Errors
///
/// - `DecryptionFailed` if the object is shorter than the fixed layout
pub fn object_version(object: &[u8]) -> Result<u8, CryptoError> {
    if object.len() < MIN_OBJECT_SIZE {
        return Err(CryptoError::decryption("object shorter than envelope header"));
    }
    Ok(object[0])
}

/// Encrypt `payload` with the DEK and wrap the DEK under `kek`.
///
/// # Errors
///
/// - `EncryptionFailed` if the payload exceeds the AEAD length limit
pub fn seal_object(
    kek: &[u8; KEY_SIZE],
    key_version: u8,
    secrets: &ObjectSecrets,
    payload: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let wrapped_dek = aead::seal(kek, &secrets.kek_nonce, secrets.dek.as_slice(), &[key_version])?;
    debug_assert_eq!(wrapped_dek.len(), WRAPPED_DEK_SIZE);

    let mut object = Vec::with_capacity(MIN_OBJECT_SIZE + payload.len());
    object.push(key_version);
    object.extend_from_slice(&secrets.kek_nonce);
    object.extend_from_slice(&wrapped_dek);

    let ciphertext =
        aead::seal(&secrets.dek, &secrets.dek_nonce, payload, &object[..DEK_NONCE_OFFSET])?;

    object.extend_from_slice(&secrets.dek_nonce);
    object.extend_from_slice(&ciphertext);

    Ok(object)
}

/// Unwrap the DEK with `kek` and decrypt the payload.
///
/// # Errors
///
/// - `DecryptionFailed` if the object is truncated, the DEK does not unwrap,
///   or the payload does not authenticate
pub fn open_object(kek: &[u8; KEY_SIZE], object: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key_version = object_version(object)?;

    let kek_nonce = nonce_at(object, KEK_NONCE_OFFSET)?;
    let dek_nonce = nonce_at(object, DEK_NONCE_OFFSET)?;
    let wrapped_dek = &object[WRAPPED_DEK_OFFSET..DEK_NONCE_OFFSET];

    let dek = Zeroizing::new(aead::open(kek, &kek_nonce, wrapped_dek, &[key_version])?);
    let dek: &[u8; KEY_SIZE] = dek
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::decryption("unwrapped key has wrong length"))?;

    aead::open(dek, &dek_nonce, &object[CIPHERTEXT_OFFSET..], &object[..DEK_NONCE_OFFSET])
}

fn nonce_at(object: &[u8], offset: usize) -> Result<[u8; NONCE_SIZE], CryptoError> {
    object
        .get(offset..offset + NONCE_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| CryptoError::decryption("object shorter than envelope header"))
}
