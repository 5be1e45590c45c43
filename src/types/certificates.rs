/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Quorum certificates, timeout certificates, and the signature aggregates they carry.
//!
//! ## Aggregation
//!
//! Signatures are "aggregated" by collecting them into a vector indexed by the
//! [position](super::validator_set::ValidatorSet::position) of each signer in the validator set of the
//! certificate's epoch. A certificate is valid if every signature it carries verifies, and the power of
//! its signers reaches the [quorum](super::validator_set::ValidatorSet::quorum) of that validator set.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{encode, verify},
    data_types::{EpochNumber, SignatureBytes, TotalPower, ViewNumber, VertexId},
    signed_messages::Certificate,
    validator_set::ValidatorSet,
    vertex::{BftHeader, LedgerHeader, Vertex},
};

/// The data that a [`Vote`](crate::pacemaker::messages::Vote) is about: the proposed vertex, its parent,
/// and (if the vote completes a 3-chain) the vertex that the resulting QC commits.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VoteData {
    /// Header of the vertex being voted for.
    pub proposed: BftHeader,

    /// Header of the parent of the vertex being voted for.
    pub parent: BftHeader,

    /// Header of the vertex that a QC over this vote data commits, if any.
    pub committed: Option<BftHeader>,
}

impl VoteData {
    /// Create a new `VoteData`.
    pub fn new(proposed: BftHeader, parent: BftHeader, committed: Option<BftHeader>) -> Self {
        Self {
            proposed,
            parent,
            committed,
        }
    }

    /// The bytes that a validator signs over when it votes for this `VoteData` at `timestamp`.
    pub fn signing_bytes(&self, timestamp: u64) -> Vec<u8> {
        let mut bytes = encode(self);
        bytes.extend_from_slice(&timestamp.to_le_bytes());
        bytes
    }

    /// Get the epoch of the proposed vertex.
    pub fn epoch(&self) -> EpochNumber {
        self.proposed.ledger_header.epoch
    }

    /// Get the view of the proposed vertex.
    pub fn view(&self) -> ViewNumber {
        self.proposed.view
    }
}

/// Signature of a validator over a [`VoteData`] together with the timestamp at which it voted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimestampedSignature {
    pub timestamp: u64,
    pub signature: SignatureBytes,
}

/// An ordered list of optional [`TimestampedSignature`]s from the same
/// [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// # Ordering
///
/// If a signature was created by `validator`, then it appears at position
/// [`validator_set.position(validator)`](super::validator_set::ValidatorSet::position). The value at
/// any position is `None` until a valid signature from the validator at that position is obtained.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimestampedSignatures(Vec<Option<TimestampedSignature>>);

impl TimestampedSignatures {
    /// Create a new set initially containing `len` `None`s.
    pub fn new(len: usize) -> Self {
        Self(vec![None; len])
    }

    /// The signature set of genesis certificates, which contains no entries at all.
    pub const fn genesis() -> Self {
        Self(Vec::new())
    }

    /// Get an iterator over the entries of this set.
    pub fn iter(&self) -> std::slice::Iter<'_, Option<TimestampedSignature>> {
        self.0.iter()
    }

    /// Set the entry at `pos`. Out of range positions are ignored.
    pub fn set(&mut self, pos: usize, signature: TimestampedSignature) {
        if let Some(entry) = self.0.get_mut(pos) {
            *entry = Some(signature)
        }
    }

    /// Get the number of entries (present or not), which equals the size of the validator set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Count how many entries are present.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|entry| entry.is_some()).count()
    }
}

/// An ordered list of optional [`SignatureBytes`], with the same ordering rules as
/// [`TimestampedSignatures`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignatureSet(Vec<Option<SignatureBytes>>);

impl SignatureSet {
    /// Create a new `SignatureSet` initially containing `len` `None`s.
    pub fn new(len: usize) -> Self {
        Self(vec![None; len])
    }

    /// Get an iterator over the entries of this set.
    pub fn iter(&self) -> std::slice::Iter<'_, Option<SignatureBytes>> {
        self.0.iter()
    }

    /// Set the entry at `pos`. Out of range positions are ignored.
    pub fn set(&mut self, pos: usize, signature: SignatureBytes) {
        if let Some(entry) = self.0.get_mut(pos) {
            *entry = Some(signature)
        }
    }

    /// Get the number of entries (present or not).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Proof that a quorum of validators voted for the same [`VoteData`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCertificate {
    pub vote_data: VoteData,
    pub signatures: TimestampedSignatures,
}

impl QuorumCertificate {
    /// Create a new `QuorumCertificate`.
    pub fn new(vote_data: VoteData, signatures: TimestampedSignatures) -> Self {
        Self {
            vote_data,
            signatures,
        }
    }

    /// Create the QC that certifies `genesis_vertex` at the start of an epoch.
    ///
    /// The genesis QC carries no signatures. Its proposed, parent, and committed headers are all the
    /// header of the genesis vertex, so that the genesis vertex counts as committed from the start.
    pub fn genesis(genesis_vertex: &Vertex, ledger_header: LedgerHeader) -> Self {
        let header = BftHeader::new(ViewNumber::genesis(), genesis_vertex.id, ledger_header);
        Self {
            vote_data: VoteData::new(header.clone(), header.clone(), Some(header)),
            signatures: TimestampedSignatures::genesis(),
        }
    }

    /// Check whether this is shaped like a genesis QC: unsigned, in the genesis view, and with equal
    /// proposed, parent, and committed headers.
    ///
    /// Only [`is_correctly_signed`](Certificate::is_correctly_signed) checks that the certified vertex
    /// really is the genesis vertex of the QC's epoch.
    pub fn is_genesis(&self) -> bool {
        self.view().is_genesis()
            && self.signatures.is_empty()
            && self.vote_data.parent == self.vote_data.proposed
            && self.vote_data.committed.as_ref() == Some(&self.vote_data.proposed)
    }

    /// Get the view of the vertex that this QC certifies.
    pub fn view(&self) -> ViewNumber {
        self.vote_data.proposed.view
    }

    /// Get the epoch that this QC belongs to.
    pub fn epoch(&self) -> EpochNumber {
        self.vote_data.epoch()
    }

    /// Get the header of the vertex that this QC certifies.
    pub fn proposed(&self) -> &BftHeader {
        &self.vote_data.proposed
    }

    /// Get the header of the parent of the vertex that this QC certifies.
    pub fn parent(&self) -> &BftHeader {
        &self.vote_data.parent
    }

    /// Get the header of the vertex that this QC commits, if any.
    pub fn committed(&self) -> Option<&BftHeader> {
        self.vote_data.committed.as_ref()
    }

    /// Get the id of the vertex that this QC certifies.
    pub fn vertex_id(&self) -> VertexId {
        self.vote_data.proposed.vertex_id
    }

    /// Compute the median of the signers' timestamps, weighted by their power in `validator_set`.
    ///
    /// Returns `None` for a QC that carries no signatures from `validator_set`.
    pub fn weighted_timestamp(&self, validator_set: &ValidatorSet) -> Option<u64> {
        let mut weighted: Vec<(u64, u128)> = self
            .signatures
            .iter()
            .enumerate()
            .filter_map(|(pos, entry)| {
                let signature = entry.as_ref()?;
                let validator = validator_set.validator_at(pos)?;
                let power = validator_set.power(validator)?;
                Some((signature.timestamp, power.int() as u128))
            })
            .collect();
        if weighted.is_empty() {
            return None;
        }

        weighted.sort_by_key(|(timestamp, _)| *timestamp);
        let total: u128 = weighted.iter().map(|(_, power)| power).sum();
        let mut accumulated = 0;
        for (timestamp, power) in &weighted {
            accumulated += power;
            if accumulated * 2 >= total {
                return Some(*timestamp);
            }
        }
        weighted.last().map(|(timestamp, _)| *timestamp)
    }
}

impl Certificate for QuorumCertificate {
    fn view(&self) -> ViewNumber {
        QuorumCertificate::view(self)
    }

    fn weight(&self, validator_set: &ValidatorSet) -> TotalPower {
        let mut weight = TotalPower::new(0);
        for (pos, entry) in self.signatures.iter().enumerate() {
            if entry.is_some() {
                if let Some(power) = validator_set
                    .validator_at(pos)
                    .and_then(|validator| validator_set.power(validator))
                {
                    weight += *power
                }
            }
        }
        weight
    }

    fn is_correctly_signed(&self, validator_set: &ValidatorSet) -> bool {
        // An unsigned QC is only valid if it is exactly the genesis QC that its ledger header implies.
        if self.signatures.is_empty() {
            let ledger_header = self.proposed().ledger_header;
            let genesis_vertex = Vertex::genesis(ledger_header.epoch, ledger_header);
            return self.is_genesis()
                && *self == QuorumCertificate::genesis(&genesis_vertex, ledger_header);
        }

        if self.signatures.len() != validator_set.len() {
            return false;
        }

        let all_signatures_verify = self.signatures.iter().enumerate().all(|(pos, entry)| {
            match (entry, validator_set.validator_at(pos)) {
                (None, _) => true,
                (Some(signature), Some(validator)) => verify(
                    &validator.to_bytes(),
                    &self.vote_data.signing_bytes(signature.timestamp),
                    &signature.signature,
                ),
                (Some(_), None) => false,
            }
        });

        all_signatures_verify && self.weight(validator_set) >= validator_set.quorum()
    }
}

/// The message that validators sign to indicate that they timed out in a particular view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct VoteTimeout {
    pub epoch: EpochNumber,
    pub view: ViewNumber,
}

impl VoteTimeout {
    /// Get the bytes that a validator signs over in a timeout vote.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = b"timeout".to_vec();
        bytes.extend_from_slice(&encode(self));
        bytes
    }
}

/// Proof that a quorum of validators timed out in `view`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TimeoutCertificate {
    pub epoch: EpochNumber,
    pub view: ViewNumber,
    pub signatures: SignatureSet,
}

impl TimeoutCertificate {
    /// Get the [`VoteTimeout`] that the signatures of this certificate are over.
    pub fn timeout(&self) -> VoteTimeout {
        VoteTimeout {
            epoch: self.epoch,
            view: self.view,
        }
    }
}

impl Certificate for TimeoutCertificate {
    fn view(&self) -> ViewNumber {
        self.view
    }

    fn weight(&self, validator_set: &ValidatorSet) -> TotalPower {
        let mut weight = TotalPower::new(0);
        for (pos, entry) in self.signatures.iter().enumerate() {
            if entry.is_some() {
                if let Some(power) = validator_set
                    .validator_at(pos)
                    .and_then(|validator| validator_set.power(validator))
                {
                    weight += *power
                }
            }
        }
        weight
    }

    fn is_correctly_signed(&self, validator_set: &ValidatorSet) -> bool {
        if self.signatures.len() != validator_set.len() {
            return false;
        }

        let message = self.timeout().signing_bytes();
        let all_signatures_verify = self.signatures.iter().enumerate().all(|(pos, entry)| {
            match (entry, validator_set.validator_at(pos)) {
                (None, _) => true,
                (Some(signature), Some(validator)) => {
                    verify(&validator.to_bytes(), &message, signature)
                }
                (Some(_), None) => false,
            }
        });

        all_signatures_verify && self.weight(validator_set) >= validator_set.quorum()
    }
}

/// The best certificates a replica currently knows of.
///
/// # Invariant
///
/// `highest_committed_qc.view() <= highest_qc.view()`. [`HighQC::new`] enforces this by replacing
/// `highest_qc` with `highest_committed_qc` if the latter is higher.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct HighQC {
    highest_qc: QuorumCertificate,
    highest_committed_qc: QuorumCertificate,
    highest_tc: Option<TimeoutCertificate>,
}

impl HighQC {
    /// Create a new `HighQC`, upholding the [invariant](Self#invariant).
    pub fn new(
        highest_qc: QuorumCertificate,
        highest_committed_qc: QuorumCertificate,
        highest_tc: Option<TimeoutCertificate>,
    ) -> Self {
        let highest_qc = if highest_committed_qc.view() > highest_qc.view() {
            highest_committed_qc.clone()
        } else {
            highest_qc
        };
        Self {
            highest_qc,
            highest_committed_qc,
            highest_tc,
        }
    }

    /// Create a `HighQC` in which `qc` is both the highest QC and the highest committed QC.
    pub fn from_qc(qc: QuorumCertificate) -> Self {
        Self::new(qc.clone(), qc, None)
    }

    pub fn highest_qc(&self) -> &QuorumCertificate {
        &self.highest_qc
    }

    pub fn highest_committed_qc(&self) -> &QuorumCertificate {
        &self.highest_committed_qc
    }

    pub fn highest_tc(&self) -> Option<&TimeoutCertificate> {
        self.highest_tc.as_ref()
    }

    /// Get the highest view that the certificates in this `HighQC` justify, i.e., the higher of the
    /// highest QC's view and the highest TC's view.
    pub fn highest_view(&self) -> ViewNumber {
        match &self.highest_tc {
            Some(tc) if tc.view > self.highest_qc.view() => tc.view,
            _ => self.highest_qc.view(),
        }
    }

    /// Get the epoch of the certificates in this `HighQC`.
    pub fn epoch(&self) -> EpochNumber {
        self.highest_qc.epoch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        crypto_primitives::{Keypair, SigningKey},
        data_types::{CryptoHash, Power},
    };
    use rand_core::OsRng;

    fn keypairs(n: usize) -> Vec<Keypair> {
        let mut csprg = OsRng {};
        (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect()
    }

    fn vote_data() -> VoteData {
        let header = |view: u64, byte: u8| {
            BftHeader::new(
                ViewNumber::new(view),
                CryptoHash::new([byte; 32]),
                LedgerHeader::genesis(EpochNumber::new(1), CryptoHash::zero(), 0),
            )
        };
        VoteData::new(header(2, 2), header(1, 1), None)
    }

    fn signed_qc(signers: &[Keypair], validator_set: &ValidatorSet) -> QuorumCertificate {
        let vote_data = vote_data();
        let mut signatures = TimestampedSignatures::new(validator_set.len());
        for (i, keypair) in signers.iter().enumerate() {
            let timestamp = 1000 + i as u64;
            let pos = validator_set.position(&keypair.public()).unwrap();
            signatures.set(
                pos,
                TimestampedSignature {
                    timestamp,
                    signature: keypair.sign(&vote_data.signing_bytes(timestamp)),
                },
            );
        }
        QuorumCertificate::new(vote_data, signatures)
    }

    #[test]
    fn qc_requires_quorum_weight() {
        let keypairs = keypairs(4);
        let validator_set =
            ValidatorSet::from_powers(keypairs.iter().map(|kp| (kp.public(), Power::new(1))));

        assert!(!signed_qc(&keypairs[..2], &validator_set).is_correctly_signed(&validator_set));
        assert!(signed_qc(&keypairs[..3], &validator_set).is_correctly_signed(&validator_set));
        assert!(signed_qc(&keypairs, &validator_set).is_correctly_signed(&validator_set));
    }

    #[test]
    fn qc_with_tampered_vote_data_is_rejected() {
        let keypairs = keypairs(4);
        let validator_set =
            ValidatorSet::from_powers(keypairs.iter().map(|kp| (kp.public(), Power::new(1))));
        let mut qc = signed_qc(&keypairs, &validator_set);
        qc.vote_data.proposed.view = ViewNumber::new(7);
        assert!(!qc.is_correctly_signed(&validator_set));
    }

    #[test]
    fn only_the_real_genesis_qc_is_valid_without_signatures() {
        let keypairs = keypairs(4);
        let validator_set =
            ValidatorSet::from_powers(keypairs.iter().map(|kp| (kp.public(), Power::new(1))));
        let ledger_header = LedgerHeader::genesis(EpochNumber::new(1), CryptoHash::zero(), 0);
        let genesis = QuorumCertificate::genesis(
            &Vertex::genesis(EpochNumber::new(1), ledger_header),
            ledger_header,
        );
        assert!(genesis.is_genesis());
        assert!(genesis.is_correctly_signed(&validator_set));

        // 1. An unsigned QC that commits some other vertex.
        let mut forged = genesis.clone();
        forged.vote_data.committed = Some(vote_data().proposed);
        assert!(!forged.is_genesis());
        assert!(!forged.is_correctly_signed(&validator_set));

        // 2. An unsigned QC in view 0 that certifies a vertex other than the genesis vertex.
        let header = BftHeader::new(ViewNumber::genesis(), CryptoHash::new([9; 32]), ledger_header);
        let forged = QuorumCertificate::new(
            VoteData::new(header.clone(), header.clone(), Some(header)),
            TimestampedSignatures::genesis(),
        );
        assert!(forged.is_genesis());
        assert!(!forged.is_correctly_signed(&validator_set));

        // 3. An unsigned QC over a vertex above the genesis view.
        let forged = QuorumCertificate::new(vote_data(), TimestampedSignatures::genesis());
        assert!(!forged.is_correctly_signed(&validator_set));
    }

    #[test]
    fn weighted_timestamp_is_the_weighted_median() {
        let keypairs = keypairs(3);
        let validator_set =
            ValidatorSet::from_powers(keypairs.iter().map(|kp| (kp.public(), Power::new(1))));
        let qc = signed_qc(&keypairs, &validator_set);
        assert_eq!(qc.weighted_timestamp(&validator_set), Some(1001));
    }

    #[test]
    fn high_qc_never_has_committed_qc_above_highest_qc() {
        let keypairs = keypairs(4);
        let validator_set =
            ValidatorSet::from_powers(keypairs.iter().map(|kp| (kp.public(), Power::new(1))));
        let higher = signed_qc(&keypairs, &validator_set);
        let mut lower = higher.clone();
        lower.vote_data.proposed.view = ViewNumber::new(1);

        let high_qc = HighQC::new(lower, higher.clone(), None);
        assert_eq!(high_qc.highest_qc(), &higher);
        assert!(high_qc.highest_committed_qc().view() <= high_qc.highest_qc().view());
    }
}
