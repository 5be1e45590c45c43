//! A deterministic, in-memory [`Ledger`] whose every proposal carries one transaction.
//!
//! All replicas of a test cluster share an [`Archive`] of committed headers and epoch changes. A
//! lagging replica "syncs" its ledger by looking its target up in the archive, which stands in for
//! fetching the missing state from peers.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chained_bft::{
    ledger::{EpochChange, Ledger, LedgerError, LedgerUpdate},
    types::{
        certificates::QuorumCertificate,
        crypto_primitives::hash,
        data_types::{CryptoHash, EpochNumber, Payload, Transaction, VerifyingKeyBytes, ViewNumber},
        validator_set::ValidatorSet,
        vertex::{LedgerHeader, PreparedVertex, VerifiedVertexStoreState, Vertex},
    },
};

/// Committed headers and epoch changes, shared by every ledger of a test cluster.
#[derive(Clone, Default)]
pub(crate) struct Archive(Arc<Mutex<ArchiveContent>>);

#[derive(Default)]
struct ArchiveContent {
    headers: HashSet<LedgerHeader>,
    epoch_changes: HashMap<EpochNumber, EpochChange>,
}

impl Archive {
    fn record(&self, header: LedgerHeader, epoch_change: Option<&EpochChange>) {
        let mut content = self.0.lock().unwrap();
        content.headers.insert(header);
        if let Some(epoch_change) = epoch_change {
            content
                .epoch_changes
                .insert(epoch_change.epoch, epoch_change.clone());
        }
    }

    fn contains(&self, header: &LedgerHeader) -> bool {
        self.0.lock().unwrap().headers.contains(header)
    }

    fn epoch_change(&self, epoch: EpochNumber) -> Option<EpochChange> {
        self.0.lock().unwrap().epoch_changes.get(&epoch).cloned()
    }
}

/// What a [`TestLedger`] has committed, readable from the test thread.
#[derive(Default)]
pub(crate) struct LedgerState {
    committed: Option<LedgerHeader>,

    // Accumulator at every state version this ledger committed through consensus or synced to.
    accumulators: BTreeMap<u64, CryptoHash>,
    sync_target: Option<LedgerHeader>,
    synced_epoch_change: Option<EpochChange>,
}

impl LedgerState {
    pub(crate) fn committed_header(&self) -> Option<LedgerHeader> {
        self.committed
    }

    pub(crate) fn accumulators(&self) -> &BTreeMap<u64, CryptoHash> {
        &self.accumulators
    }
}

pub(crate) struct TestLedger {
    state: Arc<Mutex<LedgerState>>,
    archive: Archive,

    // The validator set of epoch `i` is `validator_sets[min(i, len - 1)]`.
    validator_sets: Vec<ValidatorSet>,

    // Number of transactions after which an epoch ends, if epochs end at all.
    versions_per_epoch: Option<u64>,
}

impl TestLedger {
    pub(crate) fn new(
        initial: LedgerHeader,
        archive: Archive,
        validator_sets: Vec<ValidatorSet>,
        versions_per_epoch: Option<u64>,
    ) -> (TestLedger, Arc<Mutex<LedgerState>>) {
        let state = Arc::new(Mutex::new(LedgerState {
            committed: Some(initial),
            accumulators: BTreeMap::from([(initial.state_version, initial.accumulator)]),
            ..LedgerState::default()
        }));
        let ledger = TestLedger {
            state: state.clone(),
            archive,
            validator_sets,
            versions_per_epoch,
        };
        (ledger, state)
    }

    /// The genesis header of the first epoch.
    pub(crate) fn genesis_header() -> LedgerHeader {
        LedgerHeader::genesis(EpochNumber::new(0), CryptoHash::zero(), 0)
    }

    /// The start of the first epoch, run by `validator_set`.
    pub(crate) fn initial_epoch(validator_set: ValidatorSet) -> EpochChange {
        let epoch = EpochNumber::new(0);
        let genesis = VerifiedVertexStoreState::genesis(epoch, Self::genesis_header());
        EpochChange {
            epoch,
            validator_set,
            proof: genesis.root_qc().clone(),
            genesis,
        }
    }

    fn validator_set_of(&self, epoch: EpochNumber) -> ValidatorSet {
        let index = (epoch.int() as usize).min(self.validator_sets.len().saturating_sub(1));
        self.validator_sets[index].clone()
    }

    fn closes_epoch(&self, epoch: EpochNumber, state_version: u64) -> bool {
        self.versions_per_epoch
            .is_some_and(|versions| state_version >= (epoch.int() + 1) * versions)
    }

    // Adopt `target` as the committed header if some replica committed it.
    fn try_adopt(&self, state: &mut LedgerState, target: LedgerHeader) -> bool {
        let current = state.committed.map_or(0, |header| header.state_version);
        if target.state_version <= current {
            state.sync_target = None;
            return true;
        }
        if !self.archive.contains(&target) {
            state.sync_target = Some(target);
            return false;
        }

        state.committed = Some(target);
        state
            .accumulators
            .insert(target.state_version, target.accumulator);
        state.sync_target = None;
        if target.end_of_epoch {
            state.synced_epoch_change = self.archive.epoch_change(target.epoch.next());
        }
        true
    }
}

impl Ledger for TestLedger {
    fn prepare(&mut self, _previous: &[PreparedVertex], vertex: &Vertex) -> Option<LedgerHeader> {
        let parent = vertex.parent_header().ledger_header;
        if parent.epoch != vertex.epoch {
            return None;
        }

        // Nothing is executed on top of a header that closes the epoch.
        if parent.end_of_epoch {
            return Some(LedgerHeader {
                view: vertex.view,
                ..parent
            });
        }

        let mut accumulator = parent.accumulator;
        for transaction in vertex.payload.iter() {
            let mut bytes = accumulator.bytes().to_vec();
            bytes.extend_from_slice(transaction.bytes());
            accumulator = hash(&bytes);
        }
        let state_version = parent.state_version + vertex.payload.len() as u64;

        Some(LedgerHeader {
            epoch: vertex.epoch,
            view: vertex.view,
            state_version,
            accumulator,
            timestamp_ms: parent.timestamp_ms,
            end_of_epoch: self.closes_epoch(vertex.epoch, state_version),
        })
    }

    fn commit(
        &mut self,
        vertices: &[PreparedVertex],
        proof: &QuorumCertificate,
    ) -> Result<LedgerUpdate, LedgerError> {
        let last = match vertices.last() {
            Some(last) => last.ledger_header,
            None => return Err(LedgerError::CommitFailed { header: proof.proposed().ledger_header }),
        };

        let epoch_change = if last.end_of_epoch {
            EpochChange::from_proof(self.validator_set_of(last.epoch.next()), proof.clone())
        } else {
            None
        };

        let mut state = self.state.lock().unwrap();
        for vertex in vertices {
            let header = vertex.ledger_header;
            state
                .accumulators
                .insert(header.state_version, header.accumulator);
            self.archive.record(header, None);
        }
        self.archive.record(last, epoch_change.as_ref());
        if state
            .committed
            .map_or(true, |committed| committed.state_version <= last.state_version)
        {
            state.committed = Some(last);
        }

        Ok(LedgerUpdate {
            committed_header: last,
            epoch_change,
        })
    }

    fn next_payload(&mut self, view: ViewNumber, _previous: &[PreparedVertex]) -> Payload {
        Payload::new(vec![Transaction::new(view.int().to_le_bytes().to_vec())])
    }

    fn committed_header(&self) -> LedgerHeader {
        let mut state = self.state.lock().unwrap();
        if let Some(target) = state.sync_target {
            self.try_adopt(&mut state, target);
        }
        state.committed.unwrap_or_else(Self::genesis_header)
    }

    fn sync_to(&mut self, proof: &QuorumCertificate, _targets: &[VerifyingKeyBytes]) -> bool {
        let target = match proof.committed() {
            Some(committed) => committed.ledger_header,
            None => return false,
        };
        let mut state = self.state.lock().unwrap();
        self.try_adopt(&mut state, target)
    }

    fn process_epoch_proof(&mut self, proof: &QuorumCertificate, _author: VerifyingKeyBytes) {
        if let Some(committed) = proof.committed() {
            let mut state = self.state.lock().unwrap();
            self.try_adopt(&mut state, committed.ledger_header);
        }
    }

    fn synced_epoch_change(&mut self) -> Option<EpochChange> {
        self.state.lock().unwrap().synced_epoch_change.take()
    }
}
