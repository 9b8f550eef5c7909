//! The epoch record and its persistence.
//!
//! An epoch owns one validator roster for a contiguous height range.
//! Records are keyed by number; the chronological chain is resolved through
//! the store (`number ± 1`), never through in-memory pointers, because the
//! store is the source of truth across restarts.

use crate::store::{KvStore, StoreError};
use crate::vote_set::EpochValidatorVoteSet;
use neatcon_types::{Address, HexError, PublicKey, Validator, ValidatorSet, ValidatorSetError};
use sbor::prelude::*;
use serde::{Deserialize, Serialize};

/// Prefix for epoch records; the full key is the prefix plus the big-endian
/// epoch number.
pub const EPOCH_KEY_PREFIX: &[u8] = b"EPOCH:";

pub fn epoch_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(EPOCH_KEY_PREFIX.len() + 8);
    key.extend_from_slice(EPOCH_KEY_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

/// Lifecycle status of an epoch record.
///
/// Numbers and height ranges are immutable once `Saved`; the only forward
/// transition from there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub enum EpochStatus {
    /// Proposed by a block announcement, not yet voted.
    ProposedNotVoted,
    /// Voted (roster known) but not yet the locally current epoch.
    VotedNotSaved,
    /// Finalized and immutable.
    Saved,
}

/// One epoch: a validator roster governing `[start_block, end_block]`.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Epoch {
    pub number: u64,
    pub start_block: u64,
    pub end_block: u64,
    /// Unix milliseconds; adopted from the proposer's announcement so every
    /// node agrees despite clock skew.
    pub start_time_ms: u64,
    /// Zero until backfilled by the successor epoch's announcement.
    pub end_time_ms: u64,
    pub status: EpochStatus,
    pub validators: ValidatorSet,
    /// Pending votes for the next roster. Present only while this epoch is
    /// collecting them.
    pub validator_vote_set: Option<EpochValidatorVoteSet>,
}

/// Error decoding an epoch announcement from block bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("epoch announcement failed to decode: {0}")]
pub struct EpochDecodeError(pub String);

/// Error constructing the genesis epoch from its document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenesisError {
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error(transparent)]
    ValidatorSet(#[from] ValidatorSetError),
    #[error("document address {doc} does not match key-derived address {derived}")]
    AddressMismatch { doc: Address, derived: Address },
}

/// Genesis document form of one validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorDoc {
    pub address: String,
    pub public_key: String,
    pub amount: u128,
    #[serde(default)]
    pub remaining_epoch: u64,
}

/// Genesis document form of epoch 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochDoc {
    pub number: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub start_time_ms: u64,
    pub validators: Vec<ValidatorDoc>,
}

impl Epoch {
    /// Build the genesis epoch from its document. The document address must
    /// match the one derived from the public key.
    pub fn genesis(doc: &EpochDoc) -> Result<Epoch, GenesisError> {
        let mut validators = Vec::with_capacity(doc.validators.len());
        for vdoc in &doc.validators {
            let public_key = PublicKey::from_hex(&vdoc.public_key)?;
            let doc_address = Address::from_hex(&vdoc.address)?;
            let mut validator = Validator::new(public_key, vdoc.amount);
            if validator.address != doc_address {
                return Err(GenesisError::AddressMismatch {
                    doc: doc_address,
                    derived: validator.address,
                });
            }
            validator.remaining_epoch = vdoc.remaining_epoch;
            validators.push(validator);
        }
        Ok(Epoch {
            number: doc.number,
            start_block: doc.start_block,
            end_block: doc.end_block,
            start_time_ms: doc.start_time_ms,
            end_time_ms: 0,
            status: EpochStatus::Saved,
            validators: ValidatorSet::new(validators)?,
            validator_vote_set: Some(EpochValidatorVoteSet::new()),
        })
    }

    /// Whether `height` falls inside this epoch's range.
    pub fn contains(&self, height: u64) -> bool {
        self.start_block <= height && height <= self.end_block
    }

    /// Encode for the in-block announcement.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EpochDecodeError> {
        sbor::basic_encode(self).map_err(|e| EpochDecodeError(format!("{e:?}")))
    }

    /// Decode an in-block announcement.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EpochDecodeError> {
        sbor::basic_decode(bytes).map_err(|e| EpochDecodeError(format!("{e:?}")))
    }
}

/// Load an epoch by number. Absent and corrupt both come back as `None`;
/// corruption is logged.
pub fn load_epoch(store: &dyn KvStore, number: u64) -> Option<Epoch> {
    let bytes = match store.get(&epoch_key(number)) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::error!(number, error = %e, "failed to read epoch");
            return None;
        }
    };
    match sbor::basic_decode(&bytes) {
        Ok(epoch) => Some(epoch),
        Err(e) => {
            tracing::error!(number, ?e, "failed to decode persisted epoch");
            None
        }
    }
}

/// Persist an epoch under its number key.
pub fn save_epoch(store: &dyn KvStore, epoch: &Epoch) -> Result<(), StoreError> {
    let bytes =
        sbor::basic_encode(epoch).map_err(|e| StoreError(format!("epoch encode: {e:?}")))?;
    store.put(&epoch_key(epoch.number), &bytes)
}

/// Backfill the end time of a stored epoch. A missing record is logged and
/// skipped; the successor's announcement may precede local knowledge.
pub fn update_epoch_end_time(
    store: &dyn KvStore,
    number: u64,
    end_time_ms: u64,
) -> Result<(), StoreError> {
    match load_epoch(store, number) {
        Some(mut epoch) => {
            epoch.end_time_ms = end_time_ms;
            save_epoch(store, &epoch)
        }
        None => {
            tracing::warn!(number, "cannot backfill end time of unknown epoch");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use neatcon_types::keypair_from_seed;

    pub(crate) fn test_epoch(number: u64, start_block: u64, end_block: u64) -> Epoch {
        let validators: Vec<Validator> = (0..4)
            .map(|i| Validator::new(keypair_from_seed(i).public_key(), 1))
            .collect();
        Epoch {
            number,
            start_block,
            end_block,
            start_time_ms: 1_700_000_000_000,
            end_time_ms: 0,
            status: EpochStatus::Saved,
            validators: ValidatorSet::new(validators).unwrap(),
            validator_vote_set: Some(EpochValidatorVoteSet::new()),
        }
    }

    #[test]
    fn keys_are_prefix_plus_big_endian_number() {
        let key = epoch_key(258);
        assert!(key.starts_with(EPOCH_KEY_PREFIX));
        assert_eq!(&key[EPOCH_KEY_PREFIX.len()..], &258u64.to_be_bytes());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let epoch = test_epoch(3, 300, 399);
        assert_eq!(load_epoch(&store, 3), None);
        save_epoch(&store, &epoch).unwrap();
        assert_eq!(load_epoch(&store, 3), Some(epoch));
    }

    #[test]
    fn corrupt_record_loads_as_absent() {
        let store = MemoryStore::new();
        store.put(&epoch_key(7), b"garbage").unwrap();
        assert_eq!(load_epoch(&store, 7), None);
    }

    #[test]
    fn end_time_backfill_persists() {
        let store = MemoryStore::new();
        save_epoch(&store, &test_epoch(2, 200, 299)).unwrap();
        update_epoch_end_time(&store, 2, 42).unwrap();
        assert_eq!(load_epoch(&store, 2).unwrap().end_time_ms, 42);

        // Unknown epoch is a no-op, not an error.
        update_epoch_end_time(&store, 9, 42).unwrap();
    }

    #[test]
    fn contains_is_inclusive_on_both_ends() {
        let epoch = test_epoch(1, 100, 199);
        assert!(!epoch.contains(99));
        assert!(epoch.contains(100));
        assert!(epoch.contains(199));
        assert!(!epoch.contains(200));
    }

    #[test]
    fn announcement_bytes_round_trip() {
        let epoch = test_epoch(5, 500, 599);
        let bytes = epoch.to_bytes().unwrap();
        assert_eq!(Epoch::from_bytes(&bytes).unwrap(), epoch);
        assert!(Epoch::from_bytes(b"junk").is_err());
    }

    #[test]
    fn genesis_checks_document_addresses() {
        let kp = keypair_from_seed(1);
        let good = ValidatorDoc {
            address: Address::from_public_key(&kp.public_key()).to_hex(),
            public_key: kp.public_key().to_hex(),
            amount: 10,
            remaining_epoch: 0,
        };
        let doc = EpochDoc {
            number: 0,
            start_block: 0,
            end_block: 99,
            start_time_ms: 0,
            validators: vec![good.clone()],
        };
        let epoch = Epoch::genesis(&doc).unwrap();
        assert_eq!(epoch.validators.len(), 1);
        assert_eq!(epoch.status, EpochStatus::Saved);

        let other = keypair_from_seed(2);
        let bad = ValidatorDoc {
            address: Address::from_public_key(&other.public_key()).to_hex(),
            ..good
        };
        let doc = EpochDoc {
            validators: vec![bad],
            ..doc
        };
        assert!(matches!(
            Epoch::genesis(&doc),
            Err(GenesisError::AddressMismatch { .. })
        ));
    }
}
