//! Data classification purposes.
//!
//! Each purpose selects an independent key family. Labels are part of the key
//! derivation input, so they are stable and must never be renamed once data
//! has been encrypted under them.

use std::{fmt, str::FromStr};

use crate::error::CryptoError;

/// Classification of the data being protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPurpose {
    /// Personally identifiable information
    Pii,
    /// Protected health information
    Phi,
    /// Financial records
    Financial,
    /// Generic database column
    DatabaseField,
    /// Stored files and blobs
    FileStorage,
    /// API credentials and bearer tokens
    ApiToken,
}

impl KeyPurpose {
    /// Every purpose, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Pii,
        Self::Phi,
        Self::Financial,
        Self::DatabaseField,
        Self::FileStorage,
        Self::ApiToken,
    ];

    /// Stable label mixed into key derivation.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pii => "pii",
            Self::Phi => "phi",
            Self::Financial => "financial",
            Self::DatabaseField => "database_field",
            Self::FileStorage => "file_storage",
            Self::ApiToken => "api_token",
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for KeyPurpose {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|purpose| purpose.label() == s).ok_or_else(|| {
            CryptoError::Configuration { reason: format!("unknown key purpose '{s}'") }
        })
    }
}
