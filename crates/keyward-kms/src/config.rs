//! Key management configuration.

use std::time::Duration;

/// Default interval after which an active key version is due for rotation.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Configuration for the key management service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsConfig {
    /// Age at which an active version is reported by `check_rotation_needed`
    pub rotation_interval: Duration,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self { rotation_interval: DEFAULT_ROTATION_INTERVAL }
    }
}
