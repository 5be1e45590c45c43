use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use chained_bft::{
    counters::CounterType,
    events::{CommitVertexEvent, EnterEpochEvent},
    ledger::EpochChange,
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        data_types::{CryptoHash, EpochNumber, Power},
        validator_set::ValidatorSet,
    },
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

use super::{
    ledger::{Archive, LedgerState, TestLedger},
    mem_db::MemDB,
    network::{mock_network, NetworkStub, Partition},
};

/// Things the Nodes of a test cluster have in common:
/// - Initial epoch.
/// - Ledger archive.
/// - Configuration (except for the keypair).
///
/// Things that they differ in:
/// - Network instance.
/// - KVStore.
/// - Keypair.
pub(crate) struct Node {
    verifying_key: VerifyingKey,
    ledger_state: Arc<Mutex<LedgerState>>,
    committed_vertices: Arc<Mutex<usize>>,
    epoch: Arc<Mutex<EpochNumber>>,
    replica: Replica,
}

impl Node {
    pub(crate) fn new(
        keypair: SigningKey,
        network: NetworkStub,
        archive: Archive,
        validator_sets: Vec<ValidatorSet>,
        versions_per_epoch: Option<u64>,
    ) -> Node {
        let verifying_key = keypair.verifying_key();
        let initial_epoch = TestLedger::initial_epoch(validator_sets[0].clone());
        let (ledger, ledger_state) = TestLedger::new(
            TestLedger::genesis_header(),
            archive,
            validator_sets,
            versions_per_epoch,
        );

        let configuration = Configuration::builder()
            .me(keypair)
            .base_timeout(Duration::from_millis(500))
            .timeout_rate(1.2)
            .max_timeout_exponent(6)
            .sync_patience(Duration::from_millis(200))
            .sync_request_rate(100.0)
            .log_events(false)
            .build();

        let committed_vertices = Arc::new(Mutex::new(0));
        let epoch = Arc::new(Mutex::new(EpochNumber::new(0)));
        let replica = Self::start(
            network,
            ledger,
            configuration,
            initial_epoch,
            committed_vertices.clone(),
            epoch.clone(),
        );

        Node {
            verifying_key,
            ledger_state,
            committed_vertices,
            epoch,
            replica,
        }
    }

    fn start(
        network: NetworkStub,
        ledger: TestLedger,
        configuration: Configuration,
        initial_epoch: EpochChange,
        committed_vertices: Arc<Mutex<usize>>,
        epoch: Arc<Mutex<EpochNumber>>,
    ) -> Replica {
        ReplicaSpec::builder()
            .network(network)
            .ledger(ledger)
            .kv_store(MemDB::new())
            .configuration(configuration)
            .initial_epoch(initial_epoch)
            .on_commit_vertex(move |_: &CommitVertexEvent| {
                *committed_vertices.lock().unwrap() += 1;
            })
            .on_enter_epoch(move |enter_epoch_event: &EnterEpochEvent| {
                *epoch.lock().unwrap() = enter_epoch_event.epoch;
            })
            .build()
            .start()
    }

    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    /// The state version of the committed ledger state.
    pub(crate) fn state_version(&self) -> u64 {
        self.ledger_state
            .lock()
            .unwrap()
            .committed_header()
            .map_or(0, |header| header.state_version)
    }

    /// The accumulator at every state version this node committed or synced to.
    pub(crate) fn accumulators(&self) -> Vec<(u64, CryptoHash)> {
        self.ledger_state
            .lock()
            .unwrap()
            .accumulators()
            .iter()
            .map(|(version, accumulator)| (*version, *accumulator))
            .collect()
    }

    /// The number of vertices committed through consensus (as opposed to synced to).
    pub(crate) fn committed_vertices(&self) -> usize {
        *self.committed_vertices.lock().unwrap()
    }

    /// The last epoch this node entered, as reported by its events.
    pub(crate) fn epoch(&self) -> EpochNumber {
        *self.epoch.lock().unwrap()
    }

    pub(crate) fn counter(&self, counter: CounterType) -> u64 {
        self.replica.counters().get(counter)
    }
}

/// Check that every pair of nodes agrees on the accumulator at every state version both reached.
pub(crate) fn assert_consistent(nodes: &[Node]) {
    let histories: Vec<Vec<(u64, CryptoHash)>> = nodes.iter().map(Node::accumulators).collect();
    for (i, history) in histories.iter().enumerate() {
        for other in histories.iter().skip(i + 1) {
            for (version, accumulator) in history {
                if let Some((_, other_accumulator)) = other.iter().find(|(v, _)| v == version) {
                    assert_eq!(
                        accumulator, other_accumulator,
                        "conflicting commits at state version {}",
                        version
                    );
                }
            }
        }
    }
}

/// Poll `condition` every 100ms, failing the test if it does not hold within `patience`.
pub(crate) fn poll_until(what: &str, patience: Duration, condition: impl Fn() -> bool) {
    log::info!("Polling until {}.", what);
    let deadline = Instant::now() + patience;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out polling until {}", what);
        thread::sleep(Duration::from_millis(100));
    }
}

/// Generate `n` random signing keys.
pub(crate) fn generate_keypairs(n: usize) -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
}

/// A validator set in which each of `keypairs` has power 1.
pub(crate) fn validator_set_of(keypairs: &[SigningKey]) -> ValidatorSet {
    ValidatorSet::from_powers(
        keypairs
            .iter()
            .map(|keypair| (keypair.verifying_key(), Power::new(1))),
    )
}

/// Connect a replica for every one of `keypairs` through a mock network, and start them all.
pub(crate) fn start_cluster(
    keypairs: &[SigningKey],
    validator_sets: Vec<ValidatorSet>,
    versions_per_epoch: Option<u64>,
) -> (Vec<Node>, Partition) {
    let (network_stubs, partition) = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));
    let archive = Archive::default();
    let nodes = keypairs
        .iter()
        .zip(network_stubs)
        .map(|(keypair, network)| {
            Node::new(
                keypair.clone(),
                network,
                archive.clone(),
                validator_sets.clone(),
                versions_per_epoch,
            )
        })
        .collect();

    (nodes, partition)
}
