//! BLS12-381 keys and signatures.
//!
//! Thin wrappers over the vendor types from `radix_common`. Consensus
//! signatures are BLS so that a commit can carry one aggregate signature
//! instead of one signature per validator; verification of an aggregate is a
//! single pairing call over the folded public keys.

use radix_common::crypto::{
    fast_aggregate_verify_bls12381_v1, verify_bls12381_v1, Bls12381G1PrivateKey,
    Bls12381G1PublicKey, Bls12381G2Signature,
};
use rand::RngCore;
use sbor::prelude::*;
use std::fmt;

/// A BLS12-381 G1 public key (48 bytes, compressed).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct PublicKey(pub [u8; PublicKey::LENGTH]);

impl PublicKey {
    pub const LENGTH: usize = 48;

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string (with or without `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, crate::hash::HexError> {
        use crate::hash::HexError;
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
        Ok(PublicKey(out))
    }

    fn to_vendor(self) -> Bls12381G1PublicKey {
        Bls12381G1PublicKey(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..6]))
    }
}

/// A BLS12-381 G2 signature (96 bytes, compressed). May be an aggregate.
#[derive(Clone, Copy, PartialEq, Eq, BasicSbor)]
#[sbor(transparent)]
pub struct Signature(pub [u8; Signature::LENGTH]);

impl Signature {
    pub const LENGTH: usize = 96;

    /// Placeholder signature (not a valid curve point). Never verifies.
    pub fn zero() -> Self {
        Signature([0u8; Self::LENGTH])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_vendor(self) -> Bls12381G2Signature {
        Bls12381G2Signature(self.0)
    }

    /// Aggregate signatures by deterministic point addition.
    pub fn aggregate(signatures: &[Signature]) -> Result<Signature, AggregateError> {
        if signatures.is_empty() {
            return Err(AggregateError::Empty);
        }
        let vendor: Vec<Bls12381G2Signature> =
            signatures.iter().map(|s| s.to_vendor()).collect();
        let aggregated = Bls12381G2Signature::aggregate(&vendor, true)
            .map_err(|e| AggregateError::InvalidSignature(format!("{e:?}")))?;
        Ok(Signature(aggregated.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..6]))
    }
}

/// Error aggregating BLS signatures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("cannot aggregate an empty signature list")]
    Empty,
    #[error("invalid signature in aggregation: {0}")]
    InvalidSignature(String),
}

/// A BLS signing key plus its cached public key.
pub struct KeyPair {
    private_key: Bls12381G1PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Derive a keypair from seed material.
    ///
    /// The seed is hashed until the result is a valid scalar, so any byte
    /// string works and the derivation is deterministic.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut material = *blake3::hash(seed).as_bytes();
        loop {
            if let Ok(private_key) = Bls12381G1PrivateKey::from_bytes(&material) {
                let public_key = PublicKey(private_key.public_key().0);
                return Self {
                    private_key,
                    public_key,
                };
            }
            material = *blake3::hash(&material).as_bytes();
        }
    }

    /// Generate a keypair from OS randomness.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.private_key.sign_v1(message).0)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Deterministic keypair helper for tests and tools.
pub fn keypair_from_seed(seed: u64) -> KeyPair {
    KeyPair::from_seed(&seed.to_le_bytes())
}

/// Verify a single signature.
pub fn verify_signature(message: &[u8], public_key: &PublicKey, signature: &Signature) -> bool {
    verify_bls12381_v1(message, &public_key.to_vendor(), &signature.to_vendor())
}

/// Verify an aggregate signature over one message.
///
/// Folds the public keys into a single verification key internally; this is
/// the one call commit verification relies on.
pub fn fast_aggregate_verify(
    message: &[u8],
    public_keys: &[PublicKey],
    signature: &Signature,
) -> bool {
    if public_keys.is_empty() {
        return false;
    }
    let vendor: Vec<Bls12381G1PublicKey> = public_keys.iter().map(|p| p.to_vendor()).collect();
    fast_aggregate_verify_bls12381_v1(message, &vendor, &signature.to_vendor())
}
