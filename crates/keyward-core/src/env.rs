//! Environment abstraction for deterministic testing.
//!
//! Decouples key management logic from system resources (wall clock,
//! randomness). Production code uses [`SystemEnv`](crate::SystemEnv); tests
//! substitute a fixed or manually advanced clock so rotation schedules and
//! audit windows can be checked exactly.

/// Abstract environment providing wall-clock time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch.
    ///
    /// Used for key creation timestamps, rotation deadlines and audit records.
    fn wall_clock_secs(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Uses cryptographically secure RNG in production
    /// - Never leaves the buffer partially filled
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fixed-size random array, for nonces and key material.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        u64::from_be_bytes(self.random_array())
    }
}
