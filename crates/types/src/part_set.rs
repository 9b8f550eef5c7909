//! Chunked block transport encoding.
//!
//! A serialized block is split into fixed-size parts for gossip. The
//! `PartSetHeader` commits to the part count and the merkle root over part
//! hashes, so receivers can verify each part independently as it arrives.

use crate::block_id::PartSetHeader;
use crate::hash::{compute_merkle_root, Hash};
use sbor::prelude::*;

/// One chunk of a serialized block, with its merkle inclusion proof
/// (sibling hashes, leaf layer first).
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Part {
    pub index: u32,
    pub bytes: Vec<u8>,
    pub proof: Vec<Hash>,
}

impl Part {
    /// Leaf hash of this part's bytes.
    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.bytes)
    }

    /// Verify the inclusion proof against a merkle root.
    pub fn verify(&self, root: &Hash, total: u32) -> bool {
        if self.index >= total {
            return false;
        }
        let mut node = self.hash();
        let mut index = self.index as usize;
        for sibling in &self.proof {
            let mut hasher = blake3::Hasher::new();
            if index % 2 == 0 {
                hasher.update(node.as_bytes());
                hasher.update(sibling.as_bytes());
            } else {
                hasher.update(sibling.as_bytes());
                hasher.update(node.as_bytes());
            }
            node = Hash::from_hash_bytes(hasher.finalize().as_bytes());
            index /= 2;
        }
        node == *root
    }
}

/// Error adding a part to a part set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartSetError {
    #[error("part index {index} out of range (total {total})")]
    IndexOutOfRange { index: u32, total: u32 },
    #[error("part {0} failed merkle verification against the header")]
    InvalidProof(u32),
    #[error("part set is incomplete ({have}/{total} parts)")]
    Incomplete { have: u32, total: u32 },
    #[error("part size must be non-zero")]
    ZeroPartSize,
}

/// A block's parts, either fully built from data (send side) or assembled
/// part by part against a trusted header (receive side).
#[derive(Debug, Clone)]
pub struct PartSet {
    header: PartSetHeader,
    parts: Vec<Option<Part>>,
    received: u32,
}

impl PartSet {
    /// Split serialized block bytes into parts and build the commitment.
    pub fn from_data(data: &[u8], part_size: usize) -> Result<Self, PartSetError> {
        if part_size == 0 {
            return Err(PartSetError::ZeroPartSize);
        }
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![&[][..]]
        } else {
            data.chunks(part_size).collect()
        };
        let leaves: Vec<Hash> = chunks.iter().map(|c| Hash::from_bytes(c)).collect();
        let root = compute_merkle_root(&leaves);
        let proofs = merkle_proofs(&leaves);

        let parts: Vec<Option<Part>> = chunks
            .iter()
            .zip(proofs)
            .enumerate()
            .map(|(i, (chunk, proof))| {
                Some(Part {
                    index: i as u32,
                    bytes: chunk.to_vec(),
                    proof,
                })
            })
            .collect();
        let total = parts.len() as u32;

        Ok(Self {
            header: PartSetHeader::new(total, root),
            parts,
            received: total,
        })
    }

    /// Start an empty receive-side set for a known header.
    pub fn from_header(header: PartSetHeader) -> Self {
        Self {
            parts: vec![None; header.total as usize],
            received: 0,
            header,
        }
    }

    pub fn header(&self) -> &PartSetHeader {
        &self.header
    }

    pub fn total(&self) -> u32 {
        self.header.total
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    /// Add a received part after verifying it against the header.
    ///
    /// Returns `Ok(true)` if the part was new, `Ok(false)` for a duplicate.
    pub fn add_part(&mut self, part: Part) -> Result<bool, PartSetError> {
        if part.index >= self.header.total {
            return Err(PartSetError::IndexOutOfRange {
                index: part.index,
                total: self.header.total,
            });
        }
        if !part.verify(&self.header.hash, self.header.total) {
            return Err(PartSetError::InvalidProof(part.index));
        }
        let slot = &mut self.parts[part.index as usize];
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(part);
        self.received += 1;
        Ok(true)
    }

    pub fn get_part(&self, index: u32) -> Option<&Part> {
        self.parts.get(index as usize).and_then(|p| p.as_ref())
    }

    /// Complete iff all `total` parts have been received and verified.
    pub fn is_complete(&self) -> bool {
        self.received == self.header.total
    }

    /// Reassemble the original block bytes.
    pub fn assemble(&self) -> Result<Vec<u8>, PartSetError> {
        if !self.is_complete() {
            return Err(PartSetError::Incomplete {
                have: self.received,
                total: self.header.total,
            });
        }
        let mut out = Vec::new();
        for part in self.parts.iter().flatten() {
            out.extend_from_slice(&part.bytes);
        }
        Ok(out)
    }

    /// Iterate over the parts present, in index order.
    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().flatten()
    }
}

/// Compute the merkle inclusion proof for every leaf.
///
/// Odd layers duplicate the last node, matching `compute_merkle_root`.
fn merkle_proofs(leaves: &[Hash]) -> Vec<Vec<Hash>> {
    let mut proofs: Vec<Vec<Hash>> = vec![Vec::new(); leaves.len()];
    if leaves.len() <= 1 {
        return proofs;
    }

    // Tracks which proof each node in the current layer belongs to.
    let mut owners: Vec<Vec<usize>> = (0..leaves.len()).map(|i| vec![i]).collect();
    let mut layer: Vec<Hash> = leaves.to_vec();

    while layer.len() > 1 {
        let mut next_layer = Vec::with_capacity(layer.len().div_ceil(2));
        let mut next_owners = Vec::with_capacity(layer.len().div_ceil(2));
        for pair_start in (0..layer.len()).step_by(2) {
            let left = pair_start;
            let right = if pair_start + 1 < layer.len() {
                pair_start + 1
            } else {
                pair_start // duplicated last node
            };
            for &owner in &owners[left] {
                proofs[owner].push(layer[right]);
            }
            if right != left {
                for &owner in &owners[right] {
                    proofs[owner].push(layer[left]);
                }
            }

            let mut hasher = blake3::Hasher::new();
            hasher.update(layer[left].as_bytes());
            hasher.update(layer[right].as_bytes());
            next_layer.push(Hash::from_hash_bytes(hasher.finalize().as_bytes()));

            let mut merged = owners[left].clone();
            if right != left {
                merged.extend_from_slice(&owners[right]);
            }
            next_owners.push(merged);
        }
        layer = next_layer;
        owners = next_owners;
    }
    proofs
}
