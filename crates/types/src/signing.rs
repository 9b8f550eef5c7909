//! Canonical sign-bytes construction.
//!
//! Every vote signature (and therefore every commit aggregate) is made over
//! these exact bytes. Domain tags keep prevotes, precommits and unrelated
//! chains from being replayable against each other.

use crate::block_id::BlockId;

/// Domain tag for prevote signatures.
pub const DOMAIN_PREVOTE: &[u8] = b"neatcon/prevote";

/// Domain tag for precommit signatures (and commit aggregates).
pub const DOMAIN_PRECOMMIT: &[u8] = b"neatcon/precommit";

/// Domain tag for block proposal signatures.
pub const DOMAIN_PROPOSAL: &[u8] = b"neatcon/proposal";

/// Sign-bytes for a prevote on `(chain_id, height, round, block_id)`.
pub fn prevote_sign_bytes(chain_id: &str, height: u64, round: u64, block_id: &BlockId) -> Vec<u8> {
    sign_bytes(DOMAIN_PREVOTE, chain_id, height, round, block_id)
}

/// Sign-bytes for a precommit on `(chain_id, height, round, block_id)`.
///
/// This is the message a commit's aggregate signature is verified against.
pub fn precommit_sign_bytes(
    chain_id: &str,
    height: u64,
    round: u64,
    block_id: &BlockId,
) -> Vec<u8> {
    sign_bytes(DOMAIN_PRECOMMIT, chain_id, height, round, block_id)
}

/// Sign-bytes for a proposal of `block_id` at `(chain_id, height, round)`.
pub fn proposal_sign_bytes(
    chain_id: &str,
    height: u64,
    round: u64,
    block_id: &BlockId,
) -> Vec<u8> {
    sign_bytes(DOMAIN_PROPOSAL, chain_id, height, round, block_id)
}

fn sign_bytes(domain: &[u8], chain_id: &str, height: u64, round: u64, block_id: &BlockId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(domain.len() + chain_id.len() + 64 + 64);
    bytes.extend_from_slice(domain);
    bytes.push(0);
    bytes.extend_from_slice(&(chain_id.len() as u32).to_le_bytes());
    bytes.extend_from_slice(chain_id.as_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(&round.to_le_bytes());
    if block_id.is_zero() {
        // Nil votes commit to a fixed marker rather than structure.
        bytes.extend_from_slice(b"nil");
    } else {
        bytes.extend_from_slice(&(block_id.hash.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&block_id.hash);
        bytes.extend_from_slice(&block_id.parts_header.total.to_le_bytes());
        bytes.extend_from_slice(block_id.parts_header.hash.as_bytes());
    }
    bytes
}
