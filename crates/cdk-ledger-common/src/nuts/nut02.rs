//! NUT-02: Keyset id
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// NUT02 Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Keyset id is not hex
    #[error("Keyset id is not hex")]
    NotHex,
    /// Keyset id has an unknown length
    #[error("Keyset id has invalid length: {0}")]
    Length(usize),
    /// Keyset id has an unknown version prefix
    #[error("Unknown keyset id version: {0}")]
    UnknownVersion(String),
}

/// Keyset id
///
/// Version `00` ids are 8 bytes, version `01` ids are 33 bytes. The ledger never derives ids,
/// it only checks that what it stores is well formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(String);

impl Id {
    const V1_STRLEN: usize = 16;
    const V2_STRLEN: usize = 66;

    /// Id as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::NotHex);
        }

        let version = s.get(0..2).ok_or(Error::Length(s.len()))?;
        match (version, s.len()) {
            ("00", Self::V1_STRLEN) | ("01", Self::V2_STRLEN) => Ok(Self(s.to_lowercase())),
            ("00", len) | ("01", len) => Err(Error::Length(len)),
            (version, _) => Err(Error::UnknownVersion(version.to_string())),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::deserialize(deserializer)?;
        Self::from_str(&id).map_err(serde::de::Error::custom)
    }
}
