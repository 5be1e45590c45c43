//! Helpers for building correctly signed vertices and certificates without running replicas.

use chained_bft::types::{
    certificates::{
        QuorumCertificate, SignatureSet, TimeoutCertificate, TimestampedSignature,
        TimestampedSignatures, VoteData, VoteTimeout,
    },
    crypto_primitives::{Keypair, SigningKey},
    data_types::{EpochNumber, Payload, Power, Transaction, ViewNumber},
    validator_set::ValidatorSet,
    vertex::{PreparedVertex, Vertex},
};
use rand_core::OsRng;

/// A validator set of `n` validators with power 1 each, together with their keypairs.
pub(crate) struct TestValidators {
    keypairs: Vec<Keypair>,
    validator_set: ValidatorSet,
}

impl TestValidators {
    pub(crate) fn new(n: usize) -> TestValidators {
        let mut csprg = OsRng {};
        let keypairs: Vec<Keypair> = (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect();
        let validator_set = ValidatorSet::from_powers(
            keypairs
                .iter()
                .map(|keypair| (keypair.public(), Power::new(1))),
        );
        TestValidators {
            keypairs,
            validator_set,
        }
    }

    pub(crate) fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    pub(crate) fn keypair(&self, index: usize) -> &Keypair {
        &self.keypairs[index]
    }

    /// A QC over `prepared` signed by every validator.
    pub(crate) fn certify(&self, prepared: &PreparedVertex) -> QuorumCertificate {
        let all: Vec<usize> = (0..self.keypairs.len()).collect();
        self.certify_by(prepared, &all)
    }

    /// A QC over `prepared` signed by the validators at `signers`.
    pub(crate) fn certify_by(&self, prepared: &PreparedVertex, signers: &[usize]) -> QuorumCertificate {
        self.sign(vote_data(prepared), signers)
    }

    /// A QC over arbitrary `vote_data`, signed by the validators at `signers`.
    pub(crate) fn sign(&self, vote_data: VoteData, signers: &[usize]) -> QuorumCertificate {
        let mut signatures = TimestampedSignatures::new(self.validator_set.len());
        for (timestamp, signer) in signers.iter().enumerate() {
            let keypair = &self.keypairs[*signer];
            let timestamp = 1_000 + timestamp as u64;
            let signature = keypair.sign(&vote_data.signing_bytes(timestamp));
            if let Some(pos) = self.validator_set.position(&keypair.public()) {
                signatures.set(
                    pos,
                    TimestampedSignature {
                        timestamp,
                        signature,
                    },
                );
            }
        }
        QuorumCertificate::new(vote_data, signatures)
    }

    /// A TC for `view` signed by the validators at `signers`.
    pub(crate) fn timeout_certificate(
        &self,
        epoch: EpochNumber,
        view: ViewNumber,
        signers: &[usize],
    ) -> TimeoutCertificate {
        let message = VoteTimeout { epoch, view }.signing_bytes();
        let mut signatures = SignatureSet::new(self.validator_set.len());
        for signer in signers {
            let keypair = &self.keypairs[*signer];
            if let Some(pos) = self.validator_set.position(&keypair.public()) {
                signatures.set(pos, keypair.sign(&message));
            }
        }
        TimeoutCertificate {
            epoch,
            view,
            signatures,
        }
    }
}

/// The vote data that votes for `prepared` carry. A QC over it commits the grandparent of `prepared`
/// only if the three vertices are in consecutive views.
pub(crate) fn vote_data(prepared: &PreparedVertex) -> VoteData {
    let vertex = &prepared.vertex;
    let committed = if vertex.touches_genesis()
        || !vertex.has_direct_parent()
        || !vertex.parent_has_direct_parent()
    {
        None
    } else {
        Some(vertex.grandparent_header().clone())
    };
    VoteData::new(prepared.header(), vertex.parent_header().clone(), committed)
}

/// A vertex in `view` on top of the vertex certified by `qc`, carrying one transaction.
pub(crate) fn child(qc: QuorumCertificate, view: u64, proposer: &Keypair) -> Vertex {
    Vertex::new(
        qc.epoch(),
        qc,
        ViewNumber::new(view),
        Payload::new(vec![Transaction::new(view.to_le_bytes().to_vec())]),
        proposer.public_bytes(),
    )
}
