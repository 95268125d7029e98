//! NUT-00: Notation and Models
//!
//! <https://github.com/cashubtc/nuts/blob/main/00.md>

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::nut01::PublicKey;
use super::nut02::Id;
use crate::dhke::hash_to_curve;
use crate::secret::Secret;
use crate::Amount;

/// List of [Proof]
pub type Proofs = Vec<Proof>;

/// NUT00 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Proof with a zero amount
    #[error("Proof amount must be positive")]
    ZeroAmount,
    /// Same secret appears more than once
    #[error("Duplicate proof secret")]
    DuplicateProofs,
    /// Amount Error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// DHKE Error
    #[error(transparent)]
    Dhke(#[from] crate::dhke::Error),
}

/// Utility methods for [Proofs]
pub trait ProofsMethods {
    /// Try to sum up the amounts of all [Proof]s
    fn total_amount(&self) -> Result<Amount, Error>;

    /// Try to fetch the pubkeys of all [Proof]s
    fn ys(&self) -> Result<Vec<PublicKey>, Error>;

    /// Sum proofs by keyset
    fn sum_by_keyset(&self) -> Result<BTreeMap<Id, Amount>, Error>;

    /// Check that no secret appears twice
    fn ensure_unique(&self) -> Result<(), Error>;
}

impl ProofsMethods for Proofs {
    fn total_amount(&self) -> Result<Amount, Error> {
        total_amount(self.iter())
    }

    fn ys(&self) -> Result<Vec<PublicKey>, Error> {
        self.iter().map(|p| p.y()).collect()
    }

    fn sum_by_keyset(&self) -> Result<BTreeMap<Id, Amount>, Error> {
        let mut sums: BTreeMap<Id, Amount> = BTreeMap::new();
        for proof in self {
            let sum = sums.entry(proof.keyset_id.clone()).or_default();
            *sum = sum
                .checked_add(proof.amount)
                .ok_or(crate::amount::Error::AmountOverflow)?;
        }
        Ok(sums)
    }

    fn ensure_unique(&self) -> Result<(), Error> {
        let mut seen = HashSet::with_capacity(self.len());
        if self.iter().all(|p| seen.insert(&p.secret)) {
            Ok(())
        } else {
            Err(Error::DuplicateProofs)
        }
    }
}

/// Sum the amounts of an iterator of proofs
pub fn total_amount<'a, I>(proofs: I) -> Result<Amount, Error>
where
    I: IntoIterator<Item = &'a Proof>,
{
    Ok(Amount::try_sum(proofs.into_iter().map(|p| p.amount))?)
}

/// Proof
///
/// A bearer unit issued by one mint. Proofs are immutable: presenting one to its mint consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ProofData")]
pub struct Proof {
    /// Amount
    pub amount: Amount,
    /// `Keyset id`
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// Secret message
    pub secret: Secret,
    /// Unblinded signature
    #[serde(rename = "C")]
    pub c: PublicKey,
}

impl Proof {
    /// Create new [`Proof`]
    pub fn new(amount: Amount, keyset_id: Id, secret: Secret, c: PublicKey) -> Self {
        Proof {
            amount,
            keyset_id,
            secret,
            c,
        }
    }

    /// Get y from proof
    ///
    /// Where y is `hash_to_curve(secret)`
    pub fn y(&self) -> Result<PublicKey, Error> {
        Ok(hash_to_curve(self.secret.as_bytes())?)
    }
}

/// Wire shape of a proof before validation
#[derive(Deserialize)]
struct ProofData {
    amount: Amount,
    id: Id,
    secret: Secret,
    #[serde(rename = "C")]
    c: PublicKey,
}

impl TryFrom<ProofData> for Proof {
    type Error = Error;

    fn try_from(data: ProofData) -> Result<Self, Self::Error> {
        if data.amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        Ok(Proof::new(data.amount, data.id, data.secret, data.c))
    }
}

/// Currency Unit
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum CurrencyUnit {
    /// Sat
    #[default]
    Sat,
    /// Msat
    Msat,
    /// Usd
    Usd,
    /// Euro
    Eur,
    /// Custom currency unit
    Custom(String),
}

impl FromStr for CurrencyUnit {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.to_lowercase().as_str() {
            "sat" => Self::Sat,
            "msat" => Self::Msat,
            "usd" => Self::Usd,
            "eur" => Self::Eur,
            _ => Self::Custom(value.to_string()),
        })
    }
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CurrencyUnit::Sat => "sat",
            CurrencyUnit::Msat => "msat",
            CurrencyUnit::Usd => "usd",
            CurrencyUnit::Eur => "eur",
            CurrencyUnit::Custom(unit) => unit,
        };
        f.write_str(s)
    }
}

impl Serialize for CurrencyUnit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CurrencyUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let currency: String = String::deserialize(deserializer)?;
        Self::from_str(&currency).map_err(serde::de::Error::custom)
    }
}
