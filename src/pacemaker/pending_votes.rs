/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Aggregation of votes into quorum certificates and timeout certificates.

use std::collections::HashMap;

use crate::types::{
    certificates::{
        QuorumCertificate, SignatureSet, TimeoutCertificate, TimestampedSignature,
        TimestampedSignatures, VoteData, VoteTimeout,
    },
    crypto_primitives::{encode, hash},
    data_types::{CryptoHash, SignatureBytes, TotalPower, VerifyingKeyBytes, ViewNumber},
    validator_set::ValidatorSet,
};

use super::messages::Vote;

/// The outcome of [`PendingVotes::insert_vote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteProcessingResult {
    /// The vote was counted, but no new certificate was formed.
    Accepted,
    QuorumReached(ViewVotingResult),
    Rejected(VoteRejectedReason),
}

/// A certificate that completes a view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewVotingResult {
    FormedQC(QuorumCertificate),
    FormedTC(TimeoutCertificate),
}

impl ViewVotingResult {
    pub fn view(&self) -> ViewNumber {
        match self {
            ViewVotingResult::FormedQC(qc) => qc.view(),
            ViewVotingResult::FormedTC(tc) => tc.view,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteRejectedReason {
    InvalidAuthor,

    /// The author already voted differently in the same view.
    DuplicateVote,

    /// The same vote was delivered again.
    AlreadyCounted,
}

/// Signatures collected for the same message, and their total power.
struct ValidationState<S> {
    signatures: HashMap<VerifyingKeyBytes, S>,
    power: TotalPower,
}

impl<S> ValidationState<S> {
    fn new() -> Self {
        Self {
            signatures: HashMap::new(),
            power: TotalPower::new(0),
        }
    }

    // Returns whether the power of the collected signatures reaches a quorum.
    fn add(&mut self, author: VerifyingKeyBytes, signature: S, validator_set: &ValidatorSet) -> bool {
        if !self.signatures.contains_key(&author) {
            if let Some(power) = validator_set
                .position_of_bytes(&author)
                .and_then(|pos| validator_set.validator_at(pos))
                .and_then(|validator| validator_set.power(validator))
            {
                self.power += *power;
            }
        }
        self.signatures.insert(author, signature);
        self.power >= validator_set.quorum()
    }

    fn remove(&mut self, author: &VerifyingKeyBytes, validator_set: &ValidatorSet) {
        if self.signatures.remove(author).is_some() {
            if let Some(power) = validator_set
                .position_of_bytes(author)
                .and_then(|pos| validator_set.validator_at(pos))
                .and_then(|validator| validator_set.power(validator))
            {
                self.power = TotalPower::new(self.power.int().saturating_sub(power.int() as u128));
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// The last vote counted from a validator.
struct PreviousVote {
    view: ViewNumber,
    vote_data_hash: CryptoHash,
    timeout: Option<VoteTimeout>,
}

/// Votes received in recent views, grouped by the [`VoteData`] they are for, and timeout votes grouped
/// by the [`VoteTimeout`] they are for.
///
/// A validator counts towards at most one vote data and one timeout at a time: a vote from a validator
/// for a new view replaces the validator's vote from an earlier view.
pub struct PendingVotes {
    vote_state: HashMap<CryptoHash, (VoteData, ValidationState<TimestampedSignature>)>,
    timeout_vote_state: HashMap<VoteTimeout, ValidationState<SignatureBytes>>,
    previous_votes: HashMap<VerifyingKeyBytes, PreviousVote>,
}

impl PendingVotes {
    pub fn new() -> Self {
        Self {
            vote_state: HashMap::new(),
            timeout_vote_state: HashMap::new(),
            previous_votes: HashMap::new(),
        }
    }

    /// Count `vote`, whose signatures the caller has already verified.
    pub fn insert_vote(&mut self, vote: &Vote, validator_set: &ValidatorSet) -> VoteProcessingResult {
        if !validator_set.contains_bytes(&vote.author) {
            return VoteProcessingResult::Rejected(VoteRejectedReason::InvalidAuthor);
        }

        let vote_data_hash = hash(&encode(&vote.vote_data));
        if let Err(reason) = self.process_previous_vote(vote, vote_data_hash, validator_set) {
            return VoteProcessingResult::Rejected(reason);
        }

        if let Some(qc) = self.process_vote_for_qc(vote, vote_data_hash, validator_set) {
            return VoteProcessingResult::QuorumReached(ViewVotingResult::FormedQC(qc));
        }

        if let Some(tc) = self.process_vote_for_tc(vote, validator_set) {
            return VoteProcessingResult::QuorumReached(ViewVotingResult::FormedTC(tc));
        }

        VoteProcessingResult::Accepted
    }

    /// Forget every vote for a view lower than `view`.
    pub fn remove_votes_below(&mut self, view: ViewNumber) {
        self.vote_state
            .retain(|_, (vote_data, _)| vote_data.view() >= view);
        self.timeout_vote_state
            .retain(|timeout, _| timeout.view >= view);
        self.previous_votes
            .retain(|_, previous| previous.view >= view);
    }

    // Returns why the vote should not be counted, if it should not.
    fn process_previous_vote(
        &mut self,
        vote: &Vote,
        vote_data_hash: CryptoHash,
        validator_set: &ValidatorSet,
    ) -> Result<(), VoteRejectedReason> {
        let timeout = vote.timeout_signature.map(|_| vote.timeout());
        let previous = match self.previous_votes.get(&vote.author) {
            Some(previous) => previous,
            None => {
                self.previous_votes.insert(
                    vote.author,
                    PreviousVote {
                        view: vote.view(),
                        vote_data_hash,
                        timeout,
                    },
                );
                return Ok(());
            }
        };

        if previous.view == vote.view() {
            if previous.vote_data_hash == vote_data_hash
                && (timeout.is_none() || previous.timeout == timeout)
            {
                return Err(VoteRejectedReason::AlreadyCounted);
            }
            // The only vote accepted twice in a view is the timeout version of the vote already counted.
            if previous.timeout.is_some()
                || timeout.is_none()
                || previous.vote_data_hash != vote_data_hash
            {
                return Err(VoteRejectedReason::DuplicateVote);
            }
            self.previous_votes.insert(
                vote.author,
                PreviousVote {
                    view: vote.view(),
                    vote_data_hash,
                    timeout,
                },
            );
            return Ok(());
        }

        // A vote for a different view replaces everything the author contributed before.
        let previous_hash = previous.vote_data_hash;
        let previous_timeout = previous.timeout;
        if let Some((_, state)) = self.vote_state.get_mut(&previous_hash) {
            state.remove(&vote.author, validator_set);
            if state.is_empty() {
                self.vote_state.remove(&previous_hash);
            }
        }
        if let Some(previous_timeout) = previous_timeout {
            if let Some(state) = self.timeout_vote_state.get_mut(&previous_timeout) {
                state.remove(&vote.author, validator_set);
                if state.is_empty() {
                    self.timeout_vote_state.remove(&previous_timeout);
                }
            }
        }
        self.previous_votes.insert(
            vote.author,
            PreviousVote {
                view: vote.view(),
                vote_data_hash,
                timeout,
            },
        );
        Ok(())
    }

    fn process_vote_for_qc(
        &mut self,
        vote: &Vote,
        vote_data_hash: CryptoHash,
        validator_set: &ValidatorSet,
    ) -> Option<QuorumCertificate> {
        let (vote_data, state) = self
            .vote_state
            .entry(vote_data_hash)
            .or_insert_with(|| (vote.vote_data.clone(), ValidationState::new()));
        let signature = TimestampedSignature {
            timestamp: vote.timestamp,
            signature: vote.signature,
        };
        if !state.add(vote.author, signature, validator_set) {
            return None;
        }

        let mut signatures = TimestampedSignatures::new(validator_set.len());
        for (author, signature) in &state.signatures {
            if let Some(pos) = validator_set.position_of_bytes(author) {
                signatures.set(pos, *signature);
            }
        }
        Some(QuorumCertificate::new(vote_data.clone(), signatures))
    }

    fn process_vote_for_tc(
        &mut self,
        vote: &Vote,
        validator_set: &ValidatorSet,
    ) -> Option<TimeoutCertificate> {
        let timeout_signature = vote.timeout_signature?;
        let timeout = vote.timeout();
        let state = self
            .timeout_vote_state
            .entry(timeout)
            .or_insert_with(ValidationState::new);
        if !state.add(vote.author, timeout_signature, validator_set) {
            return None;
        }

        let mut signatures = SignatureSet::new(validator_set.len());
        for (author, signature) in &state.signatures {
            if let Some(pos) = validator_set.position_of_bytes(author) {
                signatures.set(pos, *signature);
            }
        }
        Some(TimeoutCertificate {
            epoch: timeout.epoch,
            view: timeout.view,
            signatures,
        })
    }
}

impl Default for PendingVotes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pacemaker::messages::Vote,
        types::{
            certificates::{HighQC, QuorumCertificate},
            crypto_primitives::{Keypair, SigningKey},
            data_types::{CryptoHash, EpochNumber, Power},
            signed_messages::Certificate,
            vertex::{BftHeader, LedgerHeader, Vertex},
        },
    };
    use rand_core::OsRng;

    fn keypairs(n: usize) -> (Vec<Keypair>, ValidatorSet) {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();
        let validator_set =
            ValidatorSet::from_powers(keypairs.iter().map(|keypair| (keypair.public(), Power::new(1))));
        (keypairs, validator_set)
    }

    fn vote_data(view: u64, id: u8) -> VoteData {
        let ledger_header = LedgerHeader::genesis(EpochNumber::new(1), CryptoHash::zero(), 0);
        VoteData::new(
            BftHeader::new(ViewNumber::new(view), CryptoHash::new([id; 32]), ledger_header),
            BftHeader::new(ViewNumber::new(view - 1), CryptoHash::new([0; 32]), ledger_header),
            None,
        )
    }

    fn vote(keypair: &Keypair, vote_data: VoteData, timeout: bool) -> Vote {
        let ledger_header = LedgerHeader::genesis(EpochNumber::new(1), CryptoHash::zero(), 0);
        let genesis = Vertex::genesis(EpochNumber::new(1), ledger_header);
        let high_qc = HighQC::from_qc(QuorumCertificate::genesis(&genesis, ledger_header));
        let timestamp = 1000;
        let mut vote = Vote {
            author: keypair.public_bytes(),
            high_qc,
            signature: keypair.sign(&vote_data.signing_bytes(timestamp)),
            vote_data,
            timestamp,
            timeout_signature: None,
        };
        if timeout {
            vote.timeout_signature = Some(keypair.sign(&vote.timeout().signing_bytes()));
        }
        vote
    }

    #[test]
    fn quorum_of_votes_forms_valid_qc() {
        let (keypairs, validator_set) = keypairs(4);
        let mut pending_votes = PendingVotes::new();

        for keypair in &keypairs[0..2] {
            assert_eq!(
                pending_votes.insert_vote(&vote(keypair, vote_data(1, 1), false), &validator_set),
                VoteProcessingResult::Accepted
            );
        }
        match pending_votes.insert_vote(&vote(&keypairs[2], vote_data(1, 1), false), &validator_set)
        {
            VoteProcessingResult::QuorumReached(ViewVotingResult::FormedQC(qc)) => {
                assert!(qc.is_correctly_signed(&validator_set));
                assert_eq!(qc.signatures.count(), 3);
            }
            other => panic!("expected a QC, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_and_foreign_votes_are_rejected() {
        let (keypairs, validator_set) = keypairs(4);
        let outsider = Keypair::new(SigningKey::generate(&mut OsRng {}));
        let mut pending_votes = PendingVotes::new();

        let first = vote(&keypairs[0], vote_data(1, 1), false);
        assert_eq!(pending_votes.insert_vote(&first, &validator_set), VoteProcessingResult::Accepted);
        assert_eq!(
            pending_votes.insert_vote(&first, &validator_set),
            VoteProcessingResult::Rejected(VoteRejectedReason::AlreadyCounted)
        );

        // Equivocation within the same view.
        assert_eq!(
            pending_votes.insert_vote(&vote(&keypairs[0], vote_data(1, 2), false), &validator_set),
            VoteProcessingResult::Rejected(VoteRejectedReason::DuplicateVote)
        );

        assert_eq!(
            pending_votes.insert_vote(&vote(&outsider, vote_data(1, 1), false), &validator_set),
            VoteProcessingResult::Rejected(VoteRejectedReason::InvalidAuthor)
        );

        // The timeout version of the vote already counted is accepted once.
        let timeout = vote(&keypairs[0], vote_data(1, 1), true);
        assert_eq!(pending_votes.insert_vote(&timeout, &validator_set), VoteProcessingResult::Accepted);
        assert_eq!(
            pending_votes.insert_vote(&timeout, &validator_set),
            VoteProcessingResult::Rejected(VoteRejectedReason::AlreadyCounted)
        );
        assert_eq!(
            pending_votes.insert_vote(&first, &validator_set),
            VoteProcessingResult::Rejected(VoteRejectedReason::AlreadyCounted)
        );
        assert_eq!(
            pending_votes.insert_vote(&vote(&keypairs[0], vote_data(1, 2), true), &validator_set),
            VoteProcessingResult::Rejected(VoteRejectedReason::DuplicateVote)
        );
    }

    #[test]
    fn timeout_votes_for_different_vertices_form_tc() {
        let (keypairs, validator_set) = keypairs(4);
        let mut pending_votes = PendingVotes::new();

        let mut results = Vec::new();
        for (i, keypair) in keypairs[0..3].iter().enumerate() {
            results.push(pending_votes.insert_vote(
                &vote(keypair, vote_data(5, i as u8 + 1), true),
                &validator_set,
            ));
        }
        match results.pop() {
            Some(VoteProcessingResult::QuorumReached(ViewVotingResult::FormedTC(tc))) => {
                assert_eq!(tc.view, ViewNumber::new(5));
                assert!(tc.is_correctly_signed(&validator_set));
            }
            other => panic!("expected a TC, got {:?}", other),
        }
    }

    #[test]
    fn vote_in_new_view_replaces_old_vote() {
        let (keypairs, validator_set) = keypairs(4);
        let mut pending_votes = PendingVotes::new();

        pending_votes.insert_vote(&vote(&keypairs[0], vote_data(1, 1), false), &validator_set);
        pending_votes.insert_vote(&vote(&keypairs[1], vote_data(1, 1), false), &validator_set);
        // keypairs[0] moves on to view 2, so its vote for view 1 no longer counts.
        pending_votes.insert_vote(&vote(&keypairs[0], vote_data(2, 7), false), &validator_set);
        assert_eq!(
            pending_votes.insert_vote(&vote(&keypairs[2], vote_data(1, 1), false), &validator_set),
            VoteProcessingResult::Accepted
        );
    }
}
