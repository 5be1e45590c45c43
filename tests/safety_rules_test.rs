use chained_bft::{
    ledger::Ledger,
    persistence::pluggables::KVGet,
    safety_rules::{state::SafetyState, SafetyRules},
    types::{
        certificates::{HighQC, QuorumCertificate},
        data_types::{EpochNumber, ViewNumber},
        vertex::{PreparedVertex, VerifiedVertexStoreState, Vertex},
    },
};

mod common;

use crate::common::{
    chain::{child, TestValidators},
    ledger::{Archive, TestLedger},
    mem_db::MemDB,
};

struct Chain {
    validators: TestValidators,
    ledger: TestLedger,
    genesis_qc: QuorumCertificate,
}

impl Chain {
    fn new() -> Chain {
        let validators = TestValidators::new(4);
        let (ledger, _) = TestLedger::new(
            TestLedger::genesis_header(),
            Archive::default(),
            vec![validators.validator_set().clone()],
            None,
        );
        let genesis_qc =
            VerifiedVertexStoreState::genesis(EpochNumber::new(0), TestLedger::genesis_header())
                .root_qc()
                .clone();
        Chain {
            validators,
            ledger,
            genesis_qc,
        }
    }

    // Prepare a vertex in `view` on top of the vertex certified by `qc`, proposed by validator `proposer`.
    fn extend(&mut self, qc: &QuorumCertificate, view: u64, proposer: usize) -> PreparedVertex {
        let vertex = child(qc.clone(), view, self.validators.keypair(proposer));
        let ledger_header = self.ledger.prepare(&[], &vertex).unwrap();
        PreparedVertex {
            vertex,
            ledger_header,
        }
    }
}

fn safety_rules(chain: &Chain, kv_store: MemDB) -> SafetyRules<MemDB> {
    SafetyRules::new(
        chain.validators.keypair(0).clone(),
        SafetyState::initial(EpochNumber::new(0)),
        kv_store,
        None,
    )
}

fn vote(
    safety_rules: &mut SafetyRules<MemDB>,
    prepared: &PreparedVertex,
    high_qc: &QuorumCertificate,
) -> Option<chained_bft::pacemaker::messages::Vote> {
    safety_rules
        .vote_for(
            &prepared.vertex,
            prepared.header(),
            1_000,
            HighQC::from_qc(high_qc.clone()),
        )
        .unwrap()
}

#[test]
fn votes_at_most_once_per_view() {
    let mut chain = Chain::new();
    let genesis_qc = chain.genesis_qc.clone();
    let mut safety_rules = safety_rules(&chain, MemDB::new());

    // 1. The first vote in view 1 is cast.
    let v1 = chain.extend(&genesis_qc, 1, 1);
    let first = vote(&mut safety_rules, &v1, &genesis_qc).unwrap();
    assert_eq!(first.vertex_id(), v1.id());
    assert_eq!(first.view(), ViewNumber::new(1));

    // 2. Asking again for the same vertex returns the same vote.
    assert_eq!(vote(&mut safety_rules, &v1, &genesis_qc), Some(first));

    // 3. A conflicting vertex in the same view gets no vote.
    let conflicting = chain.extend(&genesis_qc, 1, 2);
    assert_ne!(conflicting.id(), v1.id());
    assert!(vote(&mut safety_rules, &conflicting, &genesis_qc).is_none());

    // 4. Neither does a vertex in a lower view once a higher view was voted in.
    let v3 = chain.extend(&genesis_qc, 3, 1);
    assert!(vote(&mut safety_rules, &v3, &genesis_qc).is_some());
    let v2 = chain.extend(&genesis_qc, 2, 1);
    assert!(vote(&mut safety_rules, &v2, &genesis_qc).is_none());
}

#[test]
fn vote_locks_on_grandparent() {
    let mut chain = Chain::new();
    let genesis_qc = chain.genesis_qc.clone();
    let mut safety_rules = safety_rules(&chain, MemDB::new());

    let v1 = chain.extend(&genesis_qc, 1, 1);
    let qc1 = chain.validators.certify(&v1);
    let v2 = chain.extend(&qc1, 2, 2);
    let qc2 = chain.validators.certify(&v2);
    let v3 = chain.extend(&qc2, 3, 3);

    // 1. Voting for v3 locks on v1, the grandparent of v3.
    assert!(vote(&mut safety_rules, &v3, &qc2).is_some());
    assert_eq!(safety_rules.state().locked_view(), ViewNumber::new(1));

    // 2. A vertex in a higher view that extends a vertex below the lock gets no vote.
    let fork = chain.extend(&genesis_qc, 4, 1);
    assert!(vote(&mut safety_rules, &fork, &genesis_qc).is_none());

    // 3. Nor can such a vertex be proposed.
    let proposal = safety_rules
        .sign_proposal(fork.vertex.clone(), genesis_qc.clone(), None)
        .unwrap();
    assert!(proposal.is_none());

    // 4. A vertex that extends the lock does.
    let v4 = chain.extend(&qc1, 4, 1);
    assert!(vote(&mut safety_rules, &v4, &qc1).is_some());
}

#[test]
fn timeout_vote_extends_last_vote() {
    let mut chain = Chain::new();
    let genesis_qc = chain.genesis_qc.clone();
    let mut safety_rules = safety_rules(&chain, MemDB::new());

    let v1 = chain.extend(&genesis_qc, 1, 1);
    let vote = vote(&mut safety_rules, &v1, &genesis_qc).unwrap();
    assert!(!vote.is_timeout());

    // 1. The timeout vote keeps the vote data and adds a valid timeout signature.
    let timeout_vote = safety_rules.timeout_vote(vote.clone()).unwrap().unwrap();
    assert!(timeout_vote.is_timeout());
    assert!(timeout_vote.is_timeout_signature_correct());
    assert_eq!(timeout_vote.vote_data, vote.vote_data);

    // 2. It replaces the last vote, and timing out again changes nothing.
    assert_eq!(safety_rules.get_last_vote(ViewNumber::new(1)), Some(timeout_vote.clone()));
    assert_eq!(
        safety_rules.timeout_vote(timeout_vote.clone()).unwrap(),
        Some(timeout_vote.clone())
    );
    assert_eq!(safety_rules.timeout_vote(vote).unwrap(), Some(timeout_vote));
    assert!(safety_rules.get_last_vote(ViewNumber::new(2)).is_none());
}

#[test]
fn timeout_vote_for_empty_view_is_signed() {
    let mut chain = Chain::new();
    let genesis_qc = chain.genesis_qc.clone();
    let mut safety_rules = safety_rules(&chain, MemDB::new());

    // A replica that saw no proposal in view 1 votes for an empty timeout vertex.
    let timeout_vertex = Vertex::timeout(EpochNumber::new(0), genesis_qc.clone(), ViewNumber::new(1));
    let ledger_header = chain.ledger.prepare(&[], &timeout_vertex).unwrap();
    let prepared = PreparedVertex {
        vertex: timeout_vertex,
        ledger_header,
    };
    let empty_vote = vote(&mut safety_rules, &prepared, &genesis_qc).unwrap();
    let timeout_vote = safety_rules.timeout_vote(empty_vote).unwrap().unwrap();

    assert!(timeout_vote.is_timeout_signature_correct());
    assert_eq!(timeout_vote.timeout().view, ViewNumber::new(1));
}

#[test]
fn only_last_vote_can_time_out() {
    let mut chain = Chain::new();
    let genesis_qc = chain.genesis_qc.clone();
    let kv_store = MemDB::new();
    let mut safety_rules = safety_rules(&chain, kv_store.clone());

    let v1 = chain.extend(&genesis_qc, 1, 1);
    let vote1 = vote(&mut safety_rules, &v1, &genesis_qc).unwrap();
    let v2 = chain.extend(&genesis_qc, 2, 1);
    let vote2 = vote(&mut safety_rules, &v2, &genesis_qc).unwrap();

    // 1. A vote of an earlier view does not time out, and does not replace the last vote.
    assert!(safety_rules.timeout_vote(vote1).unwrap().is_none());
    assert_eq!(safety_rules.state().last_vote(), Some(&vote2));
    assert_eq!(kv_store.safety_state().unwrap().unwrap().last_vote(), Some(&vote2));

    // 2. Neither does a vote in the last voted view for another vertex.
    let mut conflicting = vote2.clone();
    conflicting.vote_data.proposed = chain.extend(&genesis_qc, 2, 2).header();
    assert!(safety_rules.timeout_vote(conflicting).unwrap().is_none());

    // 3. The last vote does.
    let timeout_vote = safety_rules.timeout_vote(vote2).unwrap().unwrap();
    assert_eq!(timeout_vote.view(), ViewNumber::new(2));
    assert_eq!(safety_rules.state().last_vote(), Some(&timeout_vote));
}

#[test]
fn state_is_persisted_before_vote_is_returned() {
    let mut chain = Chain::new();
    let genesis_qc = chain.genesis_qc.clone();
    let kv_store = MemDB::new();
    let mut safety_rules = safety_rules(&chain, kv_store.clone());

    let v1 = chain.extend(&genesis_qc, 1, 1);
    let cast = vote(&mut safety_rules, &v1, &genesis_qc).unwrap();
    assert_eq!(kv_store.batches_written(), 1);

    // 1. The persisted state carries the vote.
    let persisted = kv_store.safety_state().unwrap().unwrap();
    assert_eq!(&persisted, safety_rules.state());
    assert_eq!(persisted.last_vote(), Some(&cast));

    // 2. A restarted validator does not vote for a conflicting vertex in the same view.
    let mut restarted = SafetyRules::new(
        chain.validators.keypair(0).clone(),
        persisted,
        kv_store.clone(),
        None,
    );
    let conflicting = chain.extend(&genesis_qc, 1, 2);
    assert!(vote(&mut restarted, &conflicting, &genesis_qc).is_none());
    assert_eq!(vote(&mut restarted, &v1, &genesis_qc), Some(cast));
}
