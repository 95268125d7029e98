//! Wallet, token and payment records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::nuts::{CurrencyUnit, Proofs, ProofsMethods};
use crate::util::unix_time;
use crate::{Amount, MintUrl};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generate a new random id
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Id as str
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                if value.trim().is_empty() {
                    return Err(Error::Decode(format!("empty {}", stringify!($name))));
                }
                Ok(Self(value))
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_from(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Wallet identifier
    WalletId
);

string_id!(
    /// Token record identifier
    TokenId
);

string_id!(
    /// Payment record identifier
    PaymentId
);

/// Wallet
///
/// A wallet never holds proofs itself. Its balance is derived from the live token records that
/// reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WalletInfoData")]
pub struct WalletInfo {
    /// Wallet id
    pub id: WalletId,
    /// Display name
    pub name: String,
    /// Unit
    pub unit: CurrencyUnit,
    /// Mints in order of preference
    pub mint_urls: Vec<MintUrl>,
    /// Relay endpoints used to sync records
    pub relays: Vec<String>,
}

#[derive(Deserialize)]
struct WalletInfoData {
    id: WalletId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    unit: CurrencyUnit,
    #[serde(default)]
    mint_urls: Vec<MintUrl>,
    #[serde(default)]
    relays: Vec<String>,
}

impl From<WalletInfoData> for WalletInfo {
    fn from(data: WalletInfoData) -> Self {
        let mut wallet = WalletInfo {
            id: data.id,
            name: data.name,
            unit: data.unit,
            mint_urls: Vec::with_capacity(data.mint_urls.len()),
            relays: Vec::with_capacity(data.relays.len()),
        };
        for mint_url in data.mint_urls {
            wallet.add_mint(mint_url);
        }
        for relay in data.relays {
            wallet.add_relay(relay);
        }
        wallet
    }
}

impl WalletInfo {
    /// Create new [`WalletInfo`] with a fresh id
    pub fn new<I>(name: &str, unit: CurrencyUnit, mint_urls: I, relays: Vec<String>) -> Self
    where
        I: IntoIterator<Item = MintUrl>,
    {
        WalletInfoData {
            id: WalletId::generate(),
            name: name.to_string(),
            unit,
            mint_urls: mint_urls.into_iter().collect(),
            relays,
        }
        .into()
    }

    /// Add mint url, keeping order and skipping duplicates
    ///
    /// Returns true if the mint was not known to the wallet
    pub fn add_mint(&mut self, mint_url: MintUrl) -> bool {
        if self.mint_urls.contains(&mint_url) {
            return false;
        }
        self.mint_urls.push(mint_url);
        true
    }

    /// Add relay endpoint, skipping duplicates
    pub fn add_relay(&mut self, relay: String) -> bool {
        if self.relays.contains(&relay) {
            return false;
        }
        self.relays.push(relay);
        true
    }
}

/// Token record
///
/// A durable grouping of proofs that belong to one wallet and were issued by one mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TokenRecordData")]
pub struct TokenRecord {
    /// Record id
    pub id: TokenId,
    /// Owning wallet
    pub wallet_id: WalletId,
    /// Issuing mint
    pub mint_url: MintUrl,
    /// Proofs
    pub proofs: Proofs,
    /// Unix time the record was created
    pub created_at: u64,
}

#[derive(Deserialize)]
struct TokenRecordData {
    id: TokenId,
    wallet_id: WalletId,
    mint_url: MintUrl,
    proofs: Proofs,
    #[serde(default)]
    created_at: u64,
}

impl TryFrom<TokenRecordData> for TokenRecord {
    type Error = Error;

    fn try_from(data: TokenRecordData) -> Result<Self, Self::Error> {
        let record = TokenRecord {
            id: data.id,
            wallet_id: data.wallet_id,
            mint_url: data.mint_url,
            proofs: data.proofs,
            created_at: data.created_at,
        };
        record.validate()?;
        Ok(record)
    }
}

impl TokenRecord {
    /// Create new [`TokenRecord`] with a fresh id
    pub fn new(wallet_id: WalletId, mint_url: MintUrl, proofs: Proofs) -> Self {
        Self {
            id: TokenId::generate(),
            wallet_id,
            mint_url,
            proofs,
            created_at: unix_time(),
        }
    }

    /// Decode a record, reporting malformed content as [`Error::Decode`]
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|err| Error::Decode(err.to_string()))
    }

    /// Check the record holds at least one proof, no secret twice, and a representable total
    pub fn validate(&self) -> Result<(), Error> {
        if self.proofs.is_empty() {
            return Err(Error::EmptyTokenRecord);
        }
        self.proofs.ensure_unique()?;
        self.proofs.total_amount()?;
        Ok(())
    }

    /// Sum of the record's proofs
    pub fn total_amount(&self) -> Result<Amount, Error> {
        Ok(self.proofs.total_amount()?)
    }
}

/// Change to a wallet's records observed from another session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// A record was published or replaced
    Published(TokenRecord),
    /// A record was retired
    Retired(TokenId),
}

/// Record of a settled payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Payment id
    pub id: PaymentId,
    /// Wallet that paid
    pub wallet_id: WalletId,
    /// Mint that executed the payment
    pub mint_url: MintUrl,
    /// Invoice that was paid
    pub invoice: String,
    /// Melt quote id
    pub quote_id: String,
    /// Amount paid to the invoice
    pub amount: Amount,
    /// Fee kept by the mint
    pub fee_paid: Amount,
    /// Value of change returned by the mint
    pub change: Amount,
    /// Token records consumed by the payment
    pub consumed_token_ids: Vec<TokenId>,
    /// Token record holding leftovers and change
    pub replacement_token_id: Option<TokenId>,
    /// Proof of payment
    pub preimage: Option<String>,
    /// Unix time of settlement
    pub timestamp: u64,
}
