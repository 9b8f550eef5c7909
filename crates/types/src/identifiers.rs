//! Identifier newtypes.

use crate::crypto::PublicKey;
use crate::hash::HexError;
use sbor::prelude::*;
use std::fmt;

/// Voting power. Weighted by deposit amount, not validator count.
pub type VotePower = u128;

/// A 20-byte validator address, derived from the BLS public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct Address(pub [u8; Address::LENGTH]);

impl Address {
    pub const LENGTH: usize = 20;

    /// Derive the address of a public key: the first 20 bytes of its hash.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = blake3::hash(&public_key.0);
        let mut out = [0u8; Self::LENGTH];
        out.copy_from_slice(&digest.as_bytes()[..Self::LENGTH]);
        Address(out)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from a hex string (with or without `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HexError::InvalidHex(e.to_string()))?;
        if bytes.len() != Self::LENGTH {
            return Err(HexError::WrongLength {
                expected: Self::LENGTH,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; Self::LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
