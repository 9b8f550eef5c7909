//! Participation bitmap for aggregated commits.

use sbor::prelude::*;

/// A fixed-size bitmap indexed by validator-set position.
///
/// Bit `i` set means validator `i` (in address-sorted order) contributed to
/// the aggregate signature. The size is fixed at construction and must match
/// the validator set the bitfield is interpreted against.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct SignerBitfield {
    bits: Vec<u8>,
    size: u32,
}

impl SignerBitfield {
    /// Create an empty bitfield for `size` validators.
    pub fn new(size: usize) -> Self {
        Self {
            bits: vec![0u8; size.div_ceil(8)],
            size: size as u32,
        }
    }

    /// Number of validator slots (not the number of set bits).
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Set bit `index`. Returns false (and changes nothing) if out of range.
    pub fn set(&mut self, index: usize) -> bool {
        if index >= self.size() {
            return false;
        }
        self.bits[index / 8] |= 1 << (index % 8);
        true
    }

    /// Whether bit `index` is set. Out-of-range reads as unset, including
    /// when a decoded bitfield carries fewer bytes than its declared size.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.size() {
            return false;
        }
        self.bits
            .get(index / 8)
            .is_some_and(|b| b & (1 << (index % 8)) != 0)
    }

    /// Number of set bits within `size`.
    pub fn count(&self) -> usize {
        self.iter_set().count()
    }

    /// Whether the byte storage is consistent with the declared size:
    /// exactly `size.div_ceil(8)` bytes, with no stray bits past `size`.
    /// Decoded bitfields must pass this before being interpreted.
    pub fn is_well_formed(&self) -> bool {
        if self.bits.len() != self.size().div_ceil(8) {
            return false;
        }
        match self.size() % 8 {
            0 => true,
            tail => self
                .bits
                .last()
                .map_or(true, |b| b & !((1u8 << tail) - 1) == 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterate over the indices of set bits, in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size()).filter(|&i| self.get(i))
    }
}

impl std::fmt::Display for SignerBitfield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.size() {
            write!(f, "{}", if self.get(i) { 'x' } else { '_' })?;
        }
        Ok(())
    }
}
