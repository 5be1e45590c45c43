/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The client side of the BFT Sync protocol.
//!
//! Main type: [`BftSync`].

use std::{
    collections::{HashMap, VecDeque},
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use ed25519_dalek::VerifyingKey;
use rand::seq::SliceRandom;

use crate::{
    counters::{CounterType, SystemCounters},
    events::{EndSyncEvent, Event, StartSyncEvent},
    ledger::Ledger,
    networking::{network::Network, sending::SenderHandle},
    persistence::pluggables::KVStore,
    types::{
        certificates::{HighQC, QuorumCertificate},
        data_types::{VertexId, ViewNumber},
        signed_messages::Certificate,
        validator_set::ValidatorSet,
        vertex::{BftHeader, LedgerHeader, VerifiedVertexStoreState, Vertex},
    },
    vertex_store::implementation::{VertexStore, VertexStoreError},
};

use super::{
    messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse},
    rate_limiter::RateLimiter,
};

/// Number of vertices fetched by a committed sync: the committed vertex and the two vertices that
/// complete its 3-chain.
const COMMITTED_SYNC_COUNT: u32 = 3;

/// Maximum number of peers whose request rate is tracked at once.
const MAX_RATE_LIMITED_PEERS: usize = 1024;

/// How long a request that was held back by the rate limiter waits before it is tried again.
const RATE_LIMITED_RETRY_DELAY: Duration = Duration::from_millis(20);

/// The outcome of [`BftSync::sync_to_qc`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncResult {
    /// The vertex store contains the vertex certified by the QC, and the QC has been added.
    Synced,

    /// The vertices that the QC depends on are being fetched.
    InProgress,

    /// The QC is malformed, or too old to ever be synced to.
    Invalid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SyncStage {
    GetCommittedVertices,
    LedgerSync,
    GetQcVertices,
}

/// A high QC being synced to.
struct SyncState {
    high_qc: HighQC,
    committed_header: BftHeader,
    author: VerifyingKey,
    stage: SyncStage,

    // Vertices received so far, parent first.
    fetched: VecDeque<Vertex>,
}

/// A request in flight, shared by every sync that needs its response.
struct SyncRequestState {
    sync_ids: Vec<VertexId>,
    authors: Vec<VerifyingKey>,
    view: ViewNumber,
    deadline: Instant,

    // Attempts that were actually sent. Attempts held back by the rate limiter do not count.
    attempts: u32,

    // The peer asked last, or `None` if the last attempt was held back by the rate limiter.
    peer: Option<VerifyingKey>,
}

/// Fetches the vertices that a received [`HighQC`] depends on, so that the QC can be added to the
/// [`VertexStore`].
///
/// # QC sync
///
/// If the root of the local vertex store is at or above the vertex committed by the high QC, only the
/// uncommitted vertices are missing. They are fetched one at a time, child first, starting from the
/// vertex that the highest QC certifies, until a vertex whose parent is in the store arrives. The fetched
/// chain is then inserted in parent-before-child order.
///
/// # Committed sync
///
/// Otherwise, the local replica missed at least one commit. The 3-chain that ends at the vertex certified
/// by the highest committed QC is fetched, the [`Ledger`] is asked to catch up to the committed state,
/// and the vertex store is rebuilt on top of the committed vertex. A QC sync then fetches the rest.
///
/// # Requests
///
/// Requests are sent first to the replica that sent the high QC, and retried on a randomly chosen signer
/// of the QC when no response arrives within the configured patience.
pub(crate) struct BftSync<N: Network> {
    config: BftSyncConfiguration,
    syncing: HashMap<VertexId, SyncState>,
    requests: HashMap<GetVerticesRequest, SyncRequestState>,

    // Committed syncs waiting for the ledger to reach a header.
    ledger_syncing: Vec<(LedgerHeader, VertexId)>,
    current_ledger_header: LedgerHeader,

    rate_limiter: RateLimiter,
    sender: SenderHandle<N>,
    counters: SystemCounters,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> BftSync<N> {
    pub(crate) fn new(
        config: BftSyncConfiguration,
        current_ledger_header: LedgerHeader,
        sender: SenderHandle<N>,
        counters: SystemCounters,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.request_rate, MAX_RATE_LIMITED_PEERS);
        Self {
            config,
            syncing: HashMap::new(),
            requests: HashMap::new(),
            ledger_syncing: Vec::new(),
            current_ledger_header,
            rate_limiter,
            sender,
            counters,
            event_publisher,
        }
    }

    /// Whether a sync to the QC over `vertex_id` is running.
    pub(crate) fn is_syncing(&self, vertex_id: &VertexId) -> bool {
        self.syncing.contains_key(vertex_id)
    }

    /// Bring `vertex_store` up to `high_qc`, received from `author`.
    pub(crate) fn sync_to_qc<K: KVStore, L: Ledger>(
        &mut self,
        high_qc: &HighQC,
        author: &VerifyingKey,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<SyncResult, BftSyncError> {
        let qc = high_qc.highest_qc();
        let vertex_id = qc.vertex_id();

        // 1. Reject certificates that are too old or do not verify.
        if qc.view() < vertex_store.root().view()
            || (qc.epoch() == self.current_ledger_header.epoch
                && qc.view() < self.current_ledger_header.view)
        {
            return Ok(SyncResult::Invalid);
        }
        if !is_valid(high_qc, vertex_store) {
            log::warn!("Not syncing to an incorrectly signed high QC at view {}", qc.view());
            return Ok(SyncResult::Invalid);
        }

        // 2. Record the TC, and add the QC if its vertex is already known.
        if let Some(tc) = high_qc.highest_tc() {
            vertex_store.insert_timeout_certificate(tc.clone());
        }
        match vertex_store.add_qc(qc, ledger) {
            Ok(true) => return Ok(SyncResult::Synced),
            Ok(false) => (),
            Err(err) if !err.is_fatal() => {
                log::warn!("Not syncing to QC at view {}: {:?}", qc.view(), err);
                return Ok(SyncResult::Invalid);
            }
            Err(err) => return Err(err.into()),
        }

        if qc.is_genesis() {
            log::warn!("Not syncing to a genesis QC of an unknown vertex {}", vertex_id);
            return Ok(SyncResult::Invalid);
        }
        if self.syncing.contains_key(&vertex_id) {
            return Ok(SyncResult::InProgress);
        }

        // 3. Start fetching the missing vertices.
        Ok(self.start_sync(high_qc.clone(), *author, vertex_store))
    }

    /// Process a response to a request sent earlier.
    pub(crate) fn process_response<K: KVStore, L: Ledger>(
        &mut self,
        origin: &VerifyingKey,
        response: GetVerticesResponse,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        let request = match response.request() {
            Some(request) => request,
            None => return Ok(()),
        };
        if !is_chain(&response.vertices) {
            log::warn!("Dropping malformed sync response for {}", request.vertex_id);
            return Ok(());
        }
        let request_state = match self.requests.remove(&request) {
            Some(request_state) => request_state,
            None => {
                log::debug!("Dropping unexpected sync response from {:?}", origin);
                return Ok(());
            }
        };

        for sync_id in request_state.sync_ids {
            let stage = match self.syncing.get(&sync_id) {
                Some(sync_state) => sync_state.stage,
                // Completed by another sync.
                None => continue,
            };
            match stage {
                SyncStage::GetCommittedVertices => self.process_committed_vertices(
                    sync_id,
                    &response.vertices,
                    vertex_store,
                    ledger,
                )?,
                SyncStage::GetQcVertices => {
                    self.process_qc_vertex(sync_id, &response.vertices[0], vertex_store, ledger)?
                }
                SyncStage::LedgerSync => (),
            }
        }
        Ok(())
    }

    /// Process an error response from `origin`, which could not serve a request, and sync to its high
    /// QC instead if it is newer than ours.
    pub(crate) fn process_error_response<K: KVStore, L: Ledger>(
        &mut self,
        origin: &VerifyingKey,
        response: GetVerticesErrorResponse,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        let request_state = match self.requests.get_mut(&response.request) {
            Some(request_state) if request_state.peer == Some(*origin) => request_state,
            _ => return Ok(()),
        };
        if response.high_qc.highest_qc().view() <= vertex_store.high_qc().highest_qc().view() {
            // Ask another author on the next tick.
            request_state.deadline = Instant::now();
            return Ok(());
        }

        log::debug!(
            "Sync request for {} failed, syncing to the responder's QC at view {}",
            response.request.vertex_id,
            response.high_qc.highest_qc().view()
        );
        if let Some(request_state) = self.requests.remove(&response.request) {
            for sync_id in request_state.sync_ids {
                self.syncing.remove(&sync_id);
            }
        }
        self.sync_to_qc(&response.high_qc, origin, vertex_store, ledger)?;
        Ok(())
    }

    /// Forget syncs made obsolete by a commit, and complete committed syncs waiting for the ledger
    /// to reach `committed_header`.
    pub(crate) fn process_ledger_update<K: KVStore, L: Ledger>(
        &mut self,
        committed_header: LedgerHeader,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        self.current_ledger_header = committed_header;
        self.complete_ledger_syncs(vertex_store, ledger)?;

        let committed_view = committed_header.view;
        let obsolete: Vec<VertexId> = self
            .syncing
            .iter()
            .filter(|(_, sync_state)| sync_state.high_qc.highest_qc().view() <= committed_view)
            .map(|(sync_id, _)| *sync_id)
            .collect();
        for sync_id in obsolete {
            log::debug!("Dropping sync to {}: already committed", sync_id);
            self.syncing.remove(&sync_id);
        }
        Ok(())
    }

    /// Check whether in-flight requests timed out, and whether the ledger caught up with a committed
    /// sync.
    pub(crate) fn tick<K: KVStore, L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        // 1. Poll the ledger for progress on ledger syncs.
        if !self.ledger_syncing.is_empty() {
            let committed_header = ledger.committed_header();
            if committed_header.state_version > self.current_ledger_header.state_version {
                self.current_ledger_header = committed_header;
            }
            self.complete_ledger_syncs(vertex_store, ledger)?;
        }

        // 2. Retry or abandon requests past their deadline, oldest view first.
        let now = Instant::now();
        let mut expired: Vec<(ViewNumber, GetVerticesRequest)> = self
            .requests
            .iter()
            .filter(|(_, request_state)| request_state.deadline <= now)
            .map(|(request, request_state)| (request_state.view, *request))
            .collect();
        expired.sort_by_key(|(view, request)| (*view, request.vertex_id));
        for (_, request) in expired {
            self.process_request_timeout(request);
        }
        Ok(())
    }

    fn start_sync<K: KVStore>(
        &mut self,
        high_qc: HighQC,
        author: VerifyingKey,
        vertex_store: &VertexStore<K>,
    ) -> SyncResult {
        let committed_header = match high_qc.highest_committed_qc().committed() {
            Some(committed_header) => committed_header.clone(),
            None => return SyncResult::Invalid,
        };
        let sync_id = high_qc.highest_qc().vertex_id();
        let requires_ledger_sync = !vertex_store.contains_vertex(&committed_header.vertex_id)
            && vertex_store.root().view() < committed_header.view;

        let (qc, count, stage) = if requires_ledger_sync {
            (
                high_qc.highest_committed_qc().clone(),
                COMMITTED_SYNC_COUNT,
                SyncStage::GetCommittedVertices,
            )
        } else {
            (high_qc.highest_qc().clone(), 1, SyncStage::GetQcVertices)
        };

        let authors = self.authors(&author, &qc, vertex_store.validator_set());
        if authors.is_empty() {
            log::warn!("No peer to sync QC at view {} from", qc.view());
            return SyncResult::Invalid;
        }

        log::debug!(
            "Starting {:?} sync to QC at view {} from {:?}",
            stage,
            high_qc.highest_qc().view(),
            authors[0]
        );
        self.syncing.insert(
            sync_id,
            SyncState {
                high_qc,
                committed_header,
                author,
                stage,
                fetched: VecDeque::new(),
            },
        );
        self.send_request(qc.view(), qc.vertex_id(), count, authors, sync_id);
        SyncResult::InProgress
    }

    // Register `sync_id` as waiting for the request, sending the request if it is not in flight yet.
    fn send_request(
        &mut self,
        view: ViewNumber,
        vertex_id: VertexId,
        count: u32,
        authors: Vec<VerifyingKey>,
        sync_id: VertexId,
    ) {
        let request = GetVerticesRequest { vertex_id, count };
        if let Some(request_state) = self.requests.get_mut(&request) {
            if !request_state.sync_ids.contains(&sync_id) {
                request_state.sync_ids.push(sync_id);
            }
            return;
        }

        let peer = authors.first().copied();
        let mut request_state = SyncRequestState {
            sync_ids: vec![sync_id],
            authors,
            view,
            deadline: Instant::now(),
            attempts: 0,
            peer: None,
        };
        if let Some(peer) = peer {
            self.try_send(peer, request, &mut request_state);
        }
        self.requests.insert(request, request_state);
    }

    // Send `request` to `peer`, and record the attempt in `request_state`.
    fn try_send(
        &mut self,
        peer: VerifyingKey,
        request: GetVerticesRequest,
        request_state: &mut SyncRequestState,
    ) {
        if self.dispatch(peer, request) {
            request_state.attempts += 1;
            request_state.peer = Some(peer);
            request_state.deadline = Instant::now() + self.config.patience;
        } else {
            request_state.peer = None;
            request_state.deadline = Instant::now() + RATE_LIMITED_RETRY_DELAY;
        }
    }

    // Returns whether the request was sent.
    fn dispatch(&mut self, peer: VerifyingKey, request: GetVerticesRequest) -> bool {
        if !self.rate_limiter.try_acquire(&peer.to_bytes()) {
            log::debug!("Sync request for {} to {:?} rate limited", request.vertex_id, peer);
            self.counters.increment(CounterType::BftSyncRateLimited);
            return false;
        }
        self.sender.send(peer, request);
        self.counters.increment(CounterType::BftSyncRequestsSent);
        Event::StartSync(StartSyncEvent {
            timestamp: SystemTime::now(),
            peer,
            vertex: request.vertex_id,
            count: request.count,
        })
        .publish(&self.event_publisher);
        true
    }

    fn process_request_timeout(&mut self, request: GetVerticesRequest) {
        let mut request_state = match self.requests.remove(&request) {
            Some(request_state) => request_state,
            None => return,
        };
        if request_state.peer.is_some() {
            self.counters.increment(CounterType::BftSyncRequestTimeouts);
        }

        // 1. Give up on the request after too many attempts, or if there is nobody to ask.
        if request_state.attempts >= self.config.max_attempts || request_state.authors.is_empty() {
            log::warn!(
                "Abandoning sync request for {} after {} attempts",
                request.vertex_id,
                request_state.attempts
            );
            for sync_id in &request_state.sync_ids {
                if self.syncing.remove(sync_id).is_some() {
                    self.counters.increment(CounterType::BftSyncAbandoned);
                }
            }
            return;
        }

        // 2. Otherwise retry on a random author other than the last one asked.
        let last_peer = request_state.peer;
        let candidates: Vec<VerifyingKey> = request_state
            .authors
            .iter()
            .filter(|author| Some(**author) != last_peer)
            .copied()
            .collect();
        let peer = candidates
            .choose(&mut rand::thread_rng())
            .copied()
            .or(last_peer)
            .or_else(|| request_state.authors.first().copied());

        if let Some(peer) = peer {
            log::debug!(
                "Sync request for {} not answered, retrying with {:?}",
                request.vertex_id,
                peer
            );
            self.try_send(peer, request, &mut request_state);
        }
        self.requests.insert(request, request_state);
    }

    fn process_qc_vertex<K: KVStore, L: Ledger>(
        &mut self,
        sync_id: VertexId,
        vertex: &Vertex,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        let sync_state = match self.syncing.get_mut(&sync_id) {
            Some(sync_state) => sync_state,
            None => return Ok(()),
        };
        let expected = sync_state
            .fetched
            .front()
            .map(|child| child.parent_id())
            .unwrap_or(sync_state.high_qc.highest_qc().vertex_id());
        if vertex.id != expected {
            return Ok(());
        }
        sync_state.fetched.push_front(vertex.clone());

        // 1. The chain is complete: insert it and retry the sync, which now succeeds.
        let parent_id = vertex.parent_id();
        if vertex_store.contains_vertex(&parent_id) {
            if let Some(sync_state) = self.syncing.remove(&sync_id) {
                let fetched: Vec<Vertex> = sync_state.fetched.into_iter().collect();
                vertex_store.insert_vertex_chain(fetched, ledger)?;
                Event::EndSync(EndSyncEvent {
                    timestamp: SystemTime::now(),
                    vertex: sync_id,
                    view: sync_state.high_qc.highest_qc().view(),
                })
                .publish(&self.event_publisher);
                self.sync_to_qc(&sync_state.high_qc, &sync_state.author, vertex_store, ledger)?;
            }
            return Ok(());
        }

        // 2. A vertex at or below the root can never be connected to the store.
        if vertex.view <= vertex_store.root().view() {
            log::warn!("Abandoning sync to {}: chain does not extend the root", sync_id);
            self.syncing.remove(&sync_id);
            self.counters.increment(CounterType::BftSyncAbandoned);
            return Ok(());
        }

        // 3. Otherwise fetch the parent.
        let (author, view) = (sync_state.author, sync_state.high_qc.highest_qc().view());
        let authors = self.authors(&author, &vertex.qc, vertex_store.validator_set());
        self.send_request(view, parent_id, 1, authors, sync_id);
        Ok(())
    }

    fn process_committed_vertices<K: KVStore, L: Ledger>(
        &mut self,
        sync_id: VertexId,
        vertices: &[Vertex],
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        let sync_state = match self.syncing.get_mut(&sync_id) {
            Some(sync_state) => sync_state,
            None => return Ok(()),
        };
        sync_state.fetched = vertices.iter().rev().cloned().collect();
        let target = sync_state.committed_header.ledger_header;

        // 1. If the ledger is already at the committed state, rebuild immediately.
        if target.state_version <= self.current_ledger_header.state_version {
            return self.rebuild_and_sync_qc(sync_id, vertex_store, ledger);
        }

        // 2. Otherwise ask the ledger to catch up.
        sync_state.stage = SyncStage::LedgerSync;
        let proof = sync_state.high_qc.highest_committed_qc().clone();
        let targets = vec![sync_state.author.to_bytes()];
        self.counters.increment(CounterType::BftSyncLedgerSyncs);
        log::debug!(
            "Asking the ledger to sync to state version {}",
            target.state_version
        );
        if ledger.sync_to(&proof, &targets) {
            self.current_ledger_header = ledger.committed_header();
            self.rebuild_and_sync_qc(sync_id, vertex_store, ledger)
        } else {
            self.ledger_syncing.push((target, sync_id));
            Ok(())
        }
    }

    fn complete_ledger_syncs<K: KVStore, L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        let state_version = self.current_ledger_header.state_version;
        let (reached, waiting): (Vec<_>, Vec<_>) = self
            .ledger_syncing
            .drain(..)
            .partition(|(target, _)| target.state_version <= state_version);
        self.ledger_syncing = waiting;
        for (_, sync_id) in reached {
            self.rebuild_and_sync_qc(sync_id, vertex_store, ledger)?;
        }
        Ok(())
    }

    fn rebuild_and_sync_qc<K: KVStore, L: Ledger>(
        &mut self,
        sync_id: VertexId,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), BftSyncError> {
        let sync_state = match self.syncing.remove(&sync_id) {
            Some(sync_state) => sync_state,
            None => return Ok(()),
        };

        // The committed vertex may have been reached through normal progress in the meantime.
        let committed_header = &sync_state.committed_header;
        if !vertex_store.contains_vertex(&committed_header.vertex_id)
            && vertex_store.root().view() < committed_header.view
        {
            let mut fetched = sync_state.fetched.iter().cloned();
            if let Some(root) = fetched.next() {
                let committed_qc = sync_state.high_qc.highest_committed_qc().clone();
                let high_qc = HighQC::new(
                    committed_qc.clone(),
                    committed_qc,
                    vertex_store.highest_tc().cloned(),
                );
                match VerifiedVertexStoreState::new(high_qc, root, fetched.collect()) {
                    Ok(state) => {
                        if !vertex_store.try_rebuild(state, ledger)? {
                            log::warn!("Could not rebuild vertex store from synced vertices");
                        }
                    }
                    Err(err) => log::warn!("Synced vertices are inconsistent: {:?}", err),
                }
            }
        }

        Event::EndSync(EndSyncEvent {
            timestamp: SystemTime::now(),
            vertex: sync_id,
            view: sync_state.high_qc.highest_committed_qc().view(),
        })
        .publish(&self.event_publisher);
        self.sync_to_qc(&sync_state.high_qc, &sync_state.author, vertex_store, ledger)?;
        Ok(())
    }

    // The author of a high QC followed by the other signers of `qc`, except this replica.
    fn authors(
        &self,
        author: &VerifyingKey,
        qc: &QuorumCertificate,
        validator_set: &ValidatorSet,
    ) -> Vec<VerifyingKey> {
        let me = self.config.me;
        let mut authors = Vec::new();
        if *author != me {
            authors.push(*author);
        }
        for (pos, signature) in qc.signatures.iter().enumerate() {
            if signature.is_none() {
                continue;
            }
            if let Some(signer) = validator_set.validator_at(pos) {
                if *signer != me && !authors.contains(signer) {
                    authors.push(*signer);
                }
            }
        }
        authors
    }
}

/// Check that every certificate in `high_qc` belongs to the epoch of `vertex_store` and verifies.
fn is_valid<K: KVStore>(high_qc: &HighQC, vertex_store: &VertexStore<K>) -> bool {
    let epoch = vertex_store.epoch();
    let validator_set = vertex_store.validator_set();
    let qcs_are_valid = [high_qc.highest_qc(), high_qc.highest_committed_qc()]
        .iter()
        .all(|qc| qc.epoch() == epoch && qc.is_correctly_signed(validator_set));
    let tc_is_valid = high_qc
        .highest_tc()
        .map_or(true, |tc| tc.epoch == epoch && tc.is_correctly_signed(validator_set));
    qcs_are_valid && tc_is_valid
}

/// Check that `vertices` are well formed and each is the parent of the one before it.
fn is_chain(vertices: &[Vertex]) -> bool {
    vertices.iter().all(|vertex| vertex.is_correct())
        && vertices
            .windows(2)
            .all(|pair| pair[0].parent_id() == pair[1].id && pair[0].epoch == pair[1].epoch)
}

/// Configuration variables for [`BftSync`].
#[derive(Clone)]
pub(crate) struct BftSyncConfiguration {
    /// The verifying key of this replica, which is never asked for vertices.
    pub(crate) me: VerifyingKey,

    /// How long to wait for a response before retrying a request.
    pub(crate) patience: Duration,

    /// Maximum number of requests sent per second.
    pub(crate) request_rate: f64,

    /// Number of times a request is sent before its syncs are abandoned.
    pub(crate) max_attempts: u32,
}

/// Enumerates the different ways a call to any of [`BftSync`]'s methods can fail.
#[derive(Debug)]
pub enum BftSyncError {
    /// See: [`VertexStoreError`].
    VertexStore(VertexStoreError),
}

impl From<VertexStoreError> for BftSyncError {
    fn from(value: VertexStoreError) -> Self {
        BftSyncError::VertexStore(value)
    }
}
