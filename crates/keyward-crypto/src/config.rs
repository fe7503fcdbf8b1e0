//! Encryption service configuration.

/// Default environment variable holding the base64 master key.
pub const DEFAULT_MASTER_KEY_ENV: &str = "KEYWARD_MASTER_KEY";

/// Configuration for [`EncryptionService::from_config`](crate::EncryptionService::from_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionConfig {
    /// Environment variable that carries the base64 master key
    pub master_key_env: String,
    /// Global key version to start from
    ///
    /// A restarted process must resume at the version it had reached, or
    /// ciphertext tagged with newer versions will not decrypt.
    pub initial_version: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self { master_key_env: DEFAULT_MASTER_KEY_ENV.to_string(), initial_version: 1 }
    }
}
