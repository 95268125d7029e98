//! Hash to curve
//!
//! Only the half of the NUT-00 DHKE the ledger needs: mapping a proof secret to its `Y` point,
//! which is how mints identify proofs in state checks.

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Parity, PublicKey as NormalizedPublicKey, XOnlyPublicKey};
use thiserror::Error;

use crate::nuts::PublicKey;

const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

/// DHKE Error
#[derive(Debug, Error)]
pub enum Error {
    /// No valid point on curve
    #[error("No valid point found")]
    NoValidPoint,
}

/// Deterministically maps a message to a point on the secp256k1 curve
///
/// See [NUT-00](https://github.com/cashubtc/nuts/blob/main/00.md)
pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, Error> {
    let msg_hash = Sha256Hash::hash(&[DOMAIN_SEPARATOR.as_slice(), message].concat());

    (0..2_u32.pow(16))
        .find_map(|counter| {
            let mut engine = Vec::with_capacity(36);
            engine.extend_from_slice(msg_hash.as_byte_array());
            engine.extend_from_slice(&counter.to_le_bytes());
            let candidate = Sha256Hash::hash(&engine);

            XOnlyPublicKey::from_slice(candidate.as_byte_array())
                .ok()
                .map(|pk| NormalizedPublicKey::from_x_only_public_key(pk, Parity::Even).into())
        })
        .ok_or(Error::NoValidPoint)
}
