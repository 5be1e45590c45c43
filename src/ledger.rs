/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable ledger (state computer) that consensus decides the input of.
//!
//! The consensus core never interprets payloads. It relies on the library user's implementation of
//! [`Ledger`] to:
//! 1. Produce payloads for the vertices this replica proposes ([`next_payload`](Ledger::next_payload)).
//! 2. Speculatively execute vertices on top of their ancestors ([`prepare`](Ledger::prepare)).
//! 3. Durably apply vertices that consensus committed ([`commit`](Ledger::commit)).
//! 4. Catch up with the committed state of other replicas ([`sync_to`](Ledger::sync_to)).
//!
//! ## Epochs
//!
//! The ledger, not consensus, decides where an epoch ends: the [`LedgerHeader`] returned by `prepare`
//! has `end_of_epoch` set on the last vertex of an epoch. When such a header is committed, `commit`
//! returns the validator set of the next epoch in an [`EpochChange`], which the
//! [Epoch Manager](crate::epoch_manager) uses to start a fresh consensus instance.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    certificates::QuorumCertificate,
    crypto_primitives::SignatureError,
    data_types::{EpochNumber, Payload, VerifyingKeyBytes, ViewNumber},
    validator_set::{ValidatorSet, ValidatorSetBytes},
    vertex::{LedgerHeader, PreparedVertex, VerifiedVertexStoreState, Vertex},
};

pub trait Ledger: Send + 'static {
    /// Speculatively execute `vertex` on top of the state produced by `previous`, which is the chain of
    /// uncommitted vertices from (but excluding) the root up to and including the vertex's parent.
    ///
    /// Returns `None` if the vertex is invalid in this context, in which case it is not inserted into
    /// the vertex store and will not be voted for.
    fn prepare(&mut self, previous: &[PreparedVertex], vertex: &Vertex) -> Option<LedgerHeader>;

    /// Apply `vertices`, in order, to the committed state. `proof` is the quorum certificate whose
    /// committed header is the last vertex in `vertices`.
    fn commit(
        &mut self,
        vertices: &[PreparedVertex],
        proof: &QuorumCertificate,
    ) -> Result<LedgerUpdate, LedgerError>;

    /// Get the payload of the vertex this replica proposes in `view` on top of `previous`.
    fn next_payload(&mut self, view: ViewNumber, previous: &[PreparedVertex]) -> Payload;

    /// Get the header of the last committed state.
    fn committed_header(&self) -> LedgerHeader;

    /// Bring the committed state up to the header committed by `proof`, fetching whatever is missing
    /// from `targets`.
    ///
    /// Returns `true` if the committed state already is (or synchronously became) at least as high as
    /// the target. Otherwise the sync continues in the background, and consensus watches
    /// [`committed_header`](Self::committed_header) to find out when it completes.
    fn sync_to(&mut self, proof: &QuorumCertificate, targets: &[VerifyingKeyBytes]) -> bool;

    /// Handle a proof, received from `author`, that an epoch higher than the current one has started.
    fn process_epoch_proof(&mut self, proof: &QuorumCertificate, author: VerifyingKeyBytes);

    /// Take the start of an epoch that the committed state reached by syncing rather than by
    /// committing, e.g., after [`process_epoch_proof`](Self::process_epoch_proof).
    fn synced_epoch_change(&mut self) -> Option<EpochChange> {
        None
    }
}

/// The outcome of a successful [`Ledger::commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerUpdate {
    /// The header of the last vertex committed.
    pub committed_header: LedgerHeader,

    /// The start of the next epoch, if the committed vertices closed the current one.
    pub epoch_change: Option<EpochChange>,
}

#[derive(Debug)]
pub enum LedgerError {
    /// The ledger could not durably apply the committed vertices. The replica cannot continue.
    CommitFailed { header: LedgerHeader },
}

/// The starting point of a new epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochChange {
    pub epoch: EpochNumber,
    pub validator_set: ValidatorSet,

    /// The QC that committed the last vertex of the previous epoch.
    pub proof: QuorumCertificate,

    /// The content that the vertex store of the new epoch starts with.
    pub genesis: VerifiedVertexStoreState,
}

impl EpochChange {
    /// Build the `EpochChange` proven by `proof`, whose committed header must close an epoch.
    ///
    /// The genesis vertex of the new epoch carries the committed ledger state of the closing header,
    /// re-labelled with the new epoch.
    pub fn from_proof(validator_set: ValidatorSet, proof: QuorumCertificate) -> Option<EpochChange> {
        let closing_header = proof.committed()?.ledger_header;
        if !closing_header.end_of_epoch {
            return None;
        }

        let epoch = closing_header.epoch.next();
        let genesis_header = LedgerHeader {
            epoch,
            view: ViewNumber::genesis(),
            end_of_epoch: false,
            ..closing_header
        };

        Some(EpochChange {
            epoch,
            validator_set,
            proof,
            genesis: VerifiedVertexStoreState::genesis(epoch, genesis_header),
        })
    }

    /// Get the epoch that `proof` closes, i.e. the epoch before this one.
    pub fn proof_epoch(&self) -> EpochNumber {
        closed_epoch(&self.proof).unwrap_or(self.epoch)
    }
}

/// Get the epoch that `proof` closes, if its committed header is the end of an epoch.
pub fn closed_epoch(proof: &QuorumCertificate) -> Option<EpochNumber> {
    proof
        .committed()
        .filter(|committed| committed.ledger_header.end_of_epoch)
        .map(|committed| committed.ledger_header.epoch)
}

/// Borsh-serializable form of [`EpochChange`], which stores the validator set as
/// [`ValidatorSetBytes`].
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct EpochChangeBytes {
    epoch: EpochNumber,
    validator_set: ValidatorSetBytes,
    proof: QuorumCertificate,
    genesis: VerifiedVertexStoreState,
}

impl From<&EpochChange> for EpochChangeBytes {
    fn from(value: &EpochChange) -> Self {
        EpochChangeBytes {
            epoch: value.epoch,
            validator_set: ValidatorSetBytes::from(&value.validator_set),
            proof: value.proof.clone(),
            genesis: value.genesis.clone(),
        }
    }
}

impl TryFrom<EpochChangeBytes> for EpochChange {
    type Error = SignatureError;

    fn try_from(value: EpochChangeBytes) -> Result<Self, Self::Error> {
        Ok(EpochChange {
            epoch: value.epoch,
            validator_set: ValidatorSet::try_from(value.validator_set)?,
            proof: value.proof,
            genesis: value.genesis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        certificates::{TimestampedSignatures, VoteData},
        data_types::CryptoHash,
        vertex::BftHeader,
    };

    fn proof_committing(ledger_header: LedgerHeader) -> QuorumCertificate {
        let header = BftHeader::new(ViewNumber::new(7), CryptoHash::new([7; 32]), ledger_header);
        QuorumCertificate::new(
            VoteData::new(header.clone(), header.clone(), Some(header)),
            TimestampedSignatures::new(0),
        )
    }

    #[test]
    fn epoch_change_requires_end_of_epoch_header() {
        let header = LedgerHeader::genesis(EpochNumber::new(3), CryptoHash::zero(), 0);
        assert!(EpochChange::from_proof(ValidatorSet::new(), proof_committing(header)).is_none());

        let closing = LedgerHeader {
            end_of_epoch: true,
            state_version: 42,
            ..header
        };
        let epoch_change =
            EpochChange::from_proof(ValidatorSet::new(), proof_committing(closing)).unwrap();
        assert_eq!(epoch_change.epoch, EpochNumber::new(4));
        assert_eq!(epoch_change.proof_epoch(), EpochNumber::new(3));
        assert_eq!(epoch_change.genesis.epoch(), EpochNumber::new(4));
        assert_eq!(epoch_change.genesis.root_header().state_version, 42);
        assert!(!epoch_change.genesis.root_header().end_of_epoch);
    }
}
