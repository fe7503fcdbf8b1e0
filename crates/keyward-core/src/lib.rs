//! Keyward core
//!
//! Shared plumbing for the key management crates. Everything that touches the
//! outside world (wall clock, entropy) goes through [`Environment`] so that key
//! lifecycle logic can be driven by a deterministic clock in tests and by the
//! operating system in production.

pub mod env;
pub mod system_env;

pub use env::Environment;
pub use system_env::SystemEnv;
