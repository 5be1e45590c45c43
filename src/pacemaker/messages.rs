/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the
//! [`Pacemaker`](super::implementation::Pacemaker) protocol.
//!
//! ## Messages
//!
//! The consensus protocol involves two types of messages:
//! 1. [`Proposal`], which the leader of a view broadcasts to propose a new vertex.
//! 2. [`Vote`], which a replica sends to the leader of the next view to vote for a proposed vertex. A
//!    vote that also carries a `timeout_signature` doubles as a timeout vote, and is broadcast to every
//!    replica instead.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    certificates::{HighQC, QuorumCertificate, TimeoutCertificate, VoteData, VoteTimeout},
    crypto_primitives::verify,
    data_types::{EpochNumber, SignatureBytes, VerifyingKeyBytes, VertexId, ViewNumber},
    signed_messages::SignedMessage,
    vertex::Vertex,
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum PacemakerMessage {
    Proposal(Proposal),
    Vote(Vote),
}

impl PacemakerMessage {
    pub fn epoch(&self) -> EpochNumber {
        match self {
            PacemakerMessage::Proposal(proposal) => proposal.epoch(),
            PacemakerMessage::Vote(vote) => vote.epoch(),
        }
    }

    pub fn view(&self) -> ViewNumber {
        match self {
            PacemakerMessage::Proposal(proposal) => proposal.view(),
            PacemakerMessage::Vote(vote) => vote.view(),
        }
    }

    /// Get the [`HighQC`] that the sender of the message claimed to have when it sent the message.
    pub fn high_qc(&self) -> HighQC {
        match self {
            PacemakerMessage::Proposal(proposal) => proposal.high_qc(),
            PacemakerMessage::Vote(vote) => vote.high_qc.clone(),
        }
    }

    /// Get the verifying key of the replica that sent the message. `None` for malformed proposals that
    /// carry no proposer.
    pub fn author(&self) -> Option<VerifyingKeyBytes> {
        match self {
            PacemakerMessage::Proposal(proposal) => proposal.vertex.proposer,
            PacemakerMessage::Vote(vote) => Some(vote.author),
        }
    }
}

impl From<Proposal> for PacemakerMessage {
    fn from(value: Proposal) -> Self {
        PacemakerMessage::Proposal(value)
    }
}

impl From<Vote> for PacemakerMessage {
    fn from(value: Vote) -> Self {
        PacemakerMessage::Vote(value)
    }
}

/// A vertex proposed by the leader of `vertex.view`, together with the certificates that justify it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub vertex: Vertex,
    pub signature: SignatureBytes,
    pub highest_committed_qc: QuorumCertificate,
    pub highest_tc: Option<TimeoutCertificate>,
}

impl Proposal {
    pub fn epoch(&self) -> EpochNumber {
        self.vertex.epoch
    }

    pub fn view(&self) -> ViewNumber {
        self.vertex.view
    }

    /// Get the `HighQC` formed by the vertex's parent QC and the certificates carried alongside it.
    pub fn high_qc(&self) -> HighQC {
        HighQC::new(
            self.vertex.qc.clone(),
            self.highest_committed_qc.clone(),
            self.highest_tc.clone(),
        )
    }
}

impl SignedMessage for Proposal {
    fn message_bytes(&self) -> Vec<u8> {
        self.vertex.id.bytes().to_vec()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A replica's vote for the vertex described by `vote_data`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub author: VerifyingKeyBytes,
    pub high_qc: HighQC,
    pub vote_data: VoteData,
    pub timestamp: u64,
    pub signature: SignatureBytes,

    /// Signature over the [`VoteTimeout`] of the vote's epoch and view, present only if the author
    /// timed out in the view.
    pub timeout_signature: Option<SignatureBytes>,
}

impl Vote {
    pub fn epoch(&self) -> EpochNumber {
        self.vote_data.epoch()
    }

    pub fn view(&self) -> ViewNumber {
        self.vote_data.view()
    }

    /// Get the id of the vertex that this vote is for.
    pub fn vertex_id(&self) -> VertexId {
        self.vote_data.proposed.vertex_id
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout_signature.is_some()
    }

    /// Get the `VoteTimeout` that the timeout signature of this vote (if any) is over.
    pub fn timeout(&self) -> VoteTimeout {
        VoteTimeout {
            epoch: self.epoch(),
            view: self.view(),
        }
    }

    /// Verify that the timeout signature, if present, is a signature by the author over
    /// [`timeout`](Self::timeout).
    pub fn is_timeout_signature_correct(&self) -> bool {
        match &self.timeout_signature {
            Some(signature) => verify(&self.author, &self.timeout().signing_bytes(), signature),
            None => true,
        }
    }
}

impl SignedMessage for Vote {
    fn message_bytes(&self) -> Vec<u8> {
        self.vote_data.signing_bytes(self.timestamp)
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}
