/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`VertexStore`] type.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::mpsc::Sender,
    time::SystemTime,
};

use crate::{
    counters::{CounterType, SystemCounters},
    events::{
        CommitVertexEvent, Event, InsertVertexEvent, PruneVertexEvent, UpdateHighQCEvent,
    },
    ledger::{Ledger, LedgerError, LedgerUpdate},
    persistence::pluggables::{KVSetError, KVStore, StateWriteBatch},
    types::{
        certificates::{HighQC, QuorumCertificate, TimeoutCertificate},
        data_types::{EpochNumber, VertexId, ViewNumber},
        signed_messages::Certificate,
        validator_set::ValidatorSet,
        vertex::{
            BftHeader, PreparedVertex, VerifiedVertexStoreState, Vertex, VertexStoreStateError,
        },
    },
};

/// A change to the content of a [`VertexStore`].
#[derive(Clone, Debug)]
pub enum VertexStoreUpdate {
    /// A vertex was prepared and inserted.
    Inserted(PreparedVertex),

    /// The highest QC or the highest committed QC changed.
    HighQcUpdated(HighQC),

    /// `vertices` (in view order, ending with the new root) were committed.
    Committed {
        vertices: Vec<PreparedVertex>,
        ledger_update: LedgerUpdate,
    },

    /// The whole content of the store was replaced.
    Rebuilt(VerifiedVertexStoreState),
}

/// Number of committed vertices below the root kept to serve sync requests.
const COMMITTED_HISTORY_CAPACITY: usize = 64;

pub struct VertexStore<K: KVStore> {
    validator_set: ValidatorSet,
    root: PreparedVertex,

    // Uncommitted vertices. The root is not included.
    vertices: HashMap<VertexId, PreparedVertex>,
    children: HashMap<VertexId, HashSet<VertexId>>,
    high_qc: HighQC,

    // Vertices whose parent was missing when they were inserted, oldest first.
    pending: VecDeque<Vertex>,
    pending_capacity: usize,

    // Recently committed vertices below the root, oldest first.
    committed_history: HashMap<VertexId, Vertex>,
    committed_order: VecDeque<VertexId>,

    updates: VecDeque<VertexStoreUpdate>,
    kv_store: K,
    counters: SystemCounters,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore> VertexStore<K> {
    /// Build a vertex store with the content of `state`, preparing every uncommitted vertex with
    /// `ledger` on top of its ancestors.
    pub fn create<L: Ledger>(
        state: VerifiedVertexStoreState,
        validator_set: ValidatorSet,
        pending_capacity: usize,
        ledger: &mut L,
        kv_store: K,
        counters: SystemCounters,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, VertexStoreError> {
        let mut vertex_store = VertexStore {
            validator_set,
            root: root_of(&state),
            vertices: HashMap::new(),
            children: HashMap::new(),
            high_qc: state.high_qc().clone(),
            pending: VecDeque::new(),
            pending_capacity,
            committed_history: HashMap::new(),
            committed_order: VecDeque::new(),
            updates: VecDeque::new(),
            kv_store,
            counters,
            event_publisher,
        };
        if !vertex_store.rebuild(&state, ledger) {
            return Err(VertexStoreError::UnpreparableState {
                root: state.root().id,
            });
        }
        Ok(vertex_store)
    }

    /// Replace the content of the store with `state`, e.g., after the ledger synced to a state
    /// higher than the current root.
    ///
    /// Returns `false` and leaves the store unchanged if the ledger rejects any vertex in `state`.
    pub fn try_rebuild<L: Ledger>(
        &mut self,
        state: VerifiedVertexStoreState,
        ledger: &mut L,
    ) -> Result<bool, VertexStoreError> {
        if state.epoch() != self.epoch() {
            log::warn!(
                "Not rebuilding vertex store of epoch {} from a state of epoch {}",
                self.epoch(),
                state.epoch()
            );
            return Ok(false);
        }

        let saved = (
            self.root.clone(),
            self.vertices.clone(),
            self.children.clone(),
            self.high_qc.clone(),
        );
        if !self.rebuild(&state, ledger) {
            (self.root, self.vertices, self.children, self.high_qc) = saved;
            return Ok(false);
        }

        self.pending.clear();
        self.persist()?;
        self.updates.push_back(VertexStoreUpdate::Rebuilt(state));
        Ok(true)
    }

    // Load `state`, preparing its vertices in order. Returns whether every vertex was prepared.
    fn rebuild<L: Ledger>(&mut self, state: &VerifiedVertexStoreState, ledger: &mut L) -> bool {
        self.root = root_of(state);
        self.vertices.clear();
        self.children.clear();
        self.children.insert(self.root.id(), HashSet::new());
        self.high_qc = state.high_qc().clone();

        for vertex in state.vertices() {
            let previous = self.get_path_from_root(&vertex.parent_id());
            match ledger.prepare(&previous, vertex) {
                Some(ledger_header) => self.put(PreparedVertex {
                    vertex: vertex.clone(),
                    ledger_header,
                }),
                None => {
                    log::warn!("Ledger could not prepare stored vertex {}", vertex.id);
                    return false;
                }
            }
        }
        self.update_size_counter();
        true
    }

    /// Insert `vertex`, after adding the QC it carries.
    ///
    /// Returns the prepared vertex if it was newly inserted, and `None` if it was already present,
    /// is not above the root, or was rejected by the ledger.
    ///
    /// # Errors
    ///
    /// - [`VertexStoreError::InvalidVertex`] if the vertex is malformed or belongs to another epoch.
    /// - [`VertexStoreError::InvalidQC`] if the QC it carries does not reach a quorum of valid signatures.
    /// - [`VertexStoreError::MissingParent`] if the parent of the vertex is not in the store. The vertex
    ///   is then held and inserted as soon as the parent is.
    pub fn insert_vertex<L: Ledger>(
        &mut self,
        vertex: Vertex,
        ledger: &mut L,
    ) -> Result<Option<PreparedVertex>, VertexStoreError> {
        let inserted = self.insert_vertex_internal(vertex, ledger)?;

        // Insert every held vertex whose ancestors have now all arrived.
        if let Some(prepared) = &inserted {
            let mut arrived = VecDeque::from([prepared.id()]);
            while let Some(parent) = arrived.pop_front() {
                let (ready, held): (Vec<Vertex>, Vec<Vertex>) = self
                    .pending
                    .drain(..)
                    .partition(|held| held.parent_id() == parent);
                self.pending = held.into();
                for child in ready {
                    match self.insert_vertex_internal(child, ledger) {
                        Ok(Some(prepared_child)) => arrived.push_back(prepared_child.id()),
                        Ok(None) => (),
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => log::debug!("Dropping held vertex: {:?}", err),
                    }
                }
            }
        }

        Ok(inserted)
    }

    fn insert_vertex_internal<L: Ledger>(
        &mut self,
        vertex: Vertex,
        ledger: &mut L,
    ) -> Result<Option<PreparedVertex>, VertexStoreError> {
        if !vertex.is_correct() || vertex.epoch != self.epoch() || vertex.is_genesis() {
            return Err(VertexStoreError::InvalidVertex { vertex: vertex.id });
        }
        if self.contains_vertex(&vertex.id) || vertex.view <= self.root.view() {
            return Ok(None);
        }
        if vertex.qc.epoch() != self.epoch() || !vertex.qc.is_correctly_signed(&self.validator_set)
        {
            return Err(VertexStoreError::InvalidQC { vertex: vertex.id });
        }

        if !self.add_qc(&vertex.qc, ledger)? {
            let parent = vertex.parent_id();
            self.hold(vertex);
            return Err(VertexStoreError::MissingParent { parent });
        }

        // Adding the QC may have committed vertices, so the parent could now be the root.
        let previous = self.get_path_from_root(&vertex.parent_id());
        let ledger_header = match ledger.prepare(&previous, &vertex) {
            Some(ledger_header) => ledger_header,
            None => {
                log::warn!("Ledger rejected vertex {} at view {}", vertex.id, vertex.view);
                return Ok(None);
            }
        };

        let prepared = PreparedVertex {
            vertex,
            ledger_header,
        };
        self.put(prepared.clone());
        self.update_size_counter();

        Event::InsertVertex(InsertVertexEvent {
            timestamp: SystemTime::now(),
            vertex: prepared.vertex.clone(),
            ledger_header,
        })
        .publish(&self.event_publisher);
        self.updates
            .push_back(VertexStoreUpdate::Inserted(prepared.clone()));

        Ok(Some(prepared))
    }

    /// Insert `vertices`, which must be in parent-before-child order, stopping at the first vertex
    /// that cannot be inserted.
    pub fn insert_vertex_chain<L: Ledger>(
        &mut self,
        vertices: Vec<Vertex>,
        ledger: &mut L,
    ) -> Result<(), VertexStoreError> {
        for vertex in vertices {
            match self.insert_vertex(vertex, ledger) {
                Ok(_) => (),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("Could not insert synced vertex: {:?}", err);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Add `qc`, whose signatures the caller has already verified.
    ///
    /// Returns `false` if the vertex that `qc` certifies is not in the store. Otherwise updates the
    /// highest QC if `qc` is higher, and commits the vertex that `qc` commits, if any.
    ///
    /// # Errors
    ///
    /// [`VertexStoreError::InvalidQC`] if the headers that `qc` carries do not match the certified vertex
    /// and its ancestors, or if `qc` commits a vertex that the 3-chain rule does not commit.
    pub fn add_qc<L: Ledger>(
        &mut self,
        qc: &QuorumCertificate,
        ledger: &mut L,
    ) -> Result<bool, VertexStoreError> {
        let certified = match self.get_prepared_vertex(&qc.vertex_id()) {
            Some(certified) => certified,
            None => return Ok(false),
        };
        if !matches_certified_vertex(qc, certified) {
            log::warn!(
                "QC over vertex {} at view {} does not match the vertex",
                qc.vertex_id(),
                qc.view()
            );
            return Err(VertexStoreError::InvalidQC {
                vertex: qc.vertex_id(),
            });
        }

        // A vertex with children has already had a QC over it added.
        if self
            .children
            .get(&qc.vertex_id())
            .is_some_and(|children| !children.is_empty())
        {
            return Ok(true);
        }

        let is_high_qc = qc.view() > self.high_qc.highest_qc().view();
        if is_high_qc {
            self.high_qc = HighQC::new(
                qc.clone(),
                self.high_qc.highest_committed_qc().clone(),
                self.high_qc.highest_tc().cloned(),
            );
        }

        match qc.committed() {
            Some(committed) if committed.view > self.root.view() => {
                let committed = committed.clone();
                self.commit(&committed, qc, ledger)?;
            }
            _ if is_high_qc => {
                self.persist()?;
                self.publish_high_qc();
            }
            _ => (),
        }

        Ok(true)
    }

    // Commit the vertex described by `header`, proven by `qc`.
    fn commit<L: Ledger>(
        &mut self,
        header: &BftHeader,
        qc: &QuorumCertificate,
        ledger: &mut L,
    ) -> Result<(), VertexStoreError> {
        let tip_id = header.vertex_id;
        if !self.vertices.contains_key(&tip_id) {
            return Err(VertexStoreError::MissingCommittedVertex { vertex: tip_id });
        }

        // 1. Flush the path from the root to the committed vertex to the ledger.
        let path = self.get_path_from_root(&tip_id);
        let ledger_update = ledger.commit(&path, qc)?;

        // 2. Keep only the committed vertex and its descendants.
        let keep = self.descendants(&tip_id);
        let committed: HashSet<VertexId> = path.iter().map(|vertex| vertex.id()).collect();
        let removed: Vec<VertexId> = self
            .vertices
            .keys()
            .filter(|id| !keep.contains(*id))
            .copied()
            .collect();
        for id in &removed {
            self.vertices.remove(id);
            self.children.remove(id);
            if !committed.contains(id) {
                Event::PruneVertex(PruneVertexEvent {
                    timestamp: SystemTime::now(),
                    vertex: *id,
                })
                .publish(&self.event_publisher);
            }
        }
        self.children.remove(&self.root.id());

        // 3. Make the committed vertex the new root.
        if let Some(new_root) = self.vertices.remove(&tip_id) {
            let old_root = std::mem::replace(&mut self.root, new_root);
            self.remember_committed(old_root.vertex);
            for vertex in path.iter().filter(|vertex| vertex.id() != tip_id) {
                self.remember_committed(vertex.vertex.clone());
            }
        }
        self.pending.retain(|held| held.view > header.view);
        self.high_qc = HighQC::new(
            self.high_qc.highest_qc().clone(),
            qc.clone(),
            self.high_qc.highest_tc().cloned(),
        );

        for vertex in &path {
            Event::CommitVertex(CommitVertexEvent {
                timestamp: SystemTime::now(),
                vertex: vertex.id(),
                view: vertex.view(),
                ledger_header: vertex.ledger_header,
            })
            .publish(&self.event_publisher);
        }
        self.counters
            .add(CounterType::BftCommittedVertices, path.len() as u64);
        self.update_size_counter();

        self.persist()?;
        self.publish_high_qc();
        self.updates.push_back(VertexStoreUpdate::Committed {
            vertices: path,
            ledger_update,
        });
        Ok(())
    }

    /// Record `tc` if it is higher than the highest TC known.
    pub fn insert_timeout_certificate(&mut self, tc: TimeoutCertificate) {
        if self
            .high_qc
            .highest_tc()
            .is_some_and(|highest_tc| highest_tc.view >= tc.view)
        {
            return;
        }
        self.high_qc = HighQC::new(
            self.high_qc.highest_qc().clone(),
            self.high_qc.highest_committed_qc().clone(),
            Some(tc),
        );
        self.publish_high_qc();
    }

    /// Get the vertex with the given id, which may be the root.
    pub fn get_prepared_vertex(&self, id: &VertexId) -> Option<&PreparedVertex> {
        if *id == self.root.id() {
            Some(&self.root)
        } else {
            self.vertices.get(id)
        }
    }

    /// Get the chain of `count` vertices that ends at `id`, child first. The chain may include the
    /// root and recently committed vertices below it. Returns `None` if the store does not hold that
    /// many ancestors.
    pub fn get_vertices(&self, id: &VertexId, count: usize) -> Option<Vec<Vertex>> {
        let mut chain = Vec::with_capacity(count);
        let mut next = *id;
        while chain.len() < count {
            let vertex = self
                .get_prepared_vertex(&next)
                .map(|prepared| &prepared.vertex)
                .or_else(|| self.committed_history.get(&next))?;
            chain.push(vertex.clone());
            next = vertex.parent_id();
        }
        Some(chain)
    }

    /// Get the uncommitted vertices from the root (exclusive) to `id` (inclusive), in view order.
    /// Empty if `id` is the root or is not in the store.
    pub fn get_path_from_root(&self, id: &VertexId) -> Vec<PreparedVertex> {
        let mut path = Vec::new();
        let mut next = *id;
        while let Some(vertex) = self.vertices.get(&next) {
            path.push(vertex.clone());
            next = vertex.parent_id();
        }
        if next != self.root.id() {
            return Vec::new();
        }
        path.reverse();
        path
    }

    /// Get a snapshot of the content of the store, with uncommitted vertices in parent-before-child
    /// order.
    pub fn state(&self) -> Result<VerifiedVertexStoreState, VertexStoreError> {
        let mut ordered = Vec::with_capacity(self.vertices.len());
        let mut frontier = VecDeque::from([self.root.id()]);
        while let Some(parent) = frontier.pop_front() {
            if let Some(children) = self.children.get(&parent) {
                let mut children: Vec<&PreparedVertex> = children
                    .iter()
                    .filter_map(|child| self.vertices.get(child))
                    .collect();
                children.sort_by_key(|child| (child.view(), child.id().bytes()));
                for child in children {
                    ordered.push(child.vertex.clone());
                    frontier.push_back(child.id());
                }
            }
        }

        Ok(VerifiedVertexStoreState::new(
            self.high_qc.clone(),
            self.root.vertex.clone(),
            ordered,
        )?)
    }

    pub fn contains_vertex(&self, id: &VertexId) -> bool {
        *id == self.root.id() || self.vertices.contains_key(id)
    }

    pub fn root(&self) -> &PreparedVertex {
        &self.root
    }

    pub fn high_qc(&self) -> &HighQC {
        &self.high_qc
    }

    pub fn highest_tc(&self) -> Option<&TimeoutCertificate> {
        self.high_qc.highest_tc()
    }

    pub fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    pub fn epoch(&self) -> EpochNumber {
        self.root.vertex.epoch
    }

    /// Get the number of uncommitted vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Get the view of the highest committed QC's committed vertex, i.e., the view of the root.
    pub fn highest_committed_view(&self) -> ViewNumber {
        self.root.view()
    }

    /// Take the updates queued since the last call.
    pub fn drain_updates(&mut self) -> Vec<VertexStoreUpdate> {
        self.updates.drain(..).collect()
    }

    fn put(&mut self, prepared: PreparedVertex) {
        self.children
            .entry(prepared.parent_id())
            .or_default()
            .insert(prepared.id());
        self.children.entry(prepared.id()).or_default();
        self.vertices.insert(prepared.id(), prepared);
    }

    fn remember_committed(&mut self, vertex: Vertex) {
        if self.committed_history.contains_key(&vertex.id) {
            return;
        }
        if self.committed_order.len() >= COMMITTED_HISTORY_CAPACITY {
            if let Some(oldest) = self.committed_order.pop_front() {
                self.committed_history.remove(&oldest);
            }
        }
        self.committed_order.push_back(vertex.id);
        self.committed_history.insert(vertex.id, vertex);
    }

    fn hold(&mut self, vertex: Vertex) {
        if self.pending_capacity == 0 || self.pending.iter().any(|held| held.id == vertex.id) {
            return;
        }
        if self.pending.len() >= self.pending_capacity {
            self.pending.pop_front();
        }
        self.pending.push_back(vertex);
    }

    // `id` and every vertex that descends from it.
    fn descendants(&self, id: &VertexId) -> HashSet<VertexId> {
        let mut descendants = HashSet::from([*id]);
        let mut frontier = vec![*id];
        while let Some(next) = frontier.pop() {
            if let Some(children) = self.children.get(&next) {
                for child in children {
                    if descendants.insert(*child) {
                        frontier.push(*child);
                    }
                }
            }
        }
        descendants
    }

    fn persist(&mut self) -> Result<(), VertexStoreError> {
        let state = self.state()?;
        let mut wb = StateWriteBatch::<K::WriteBatch>::new();
        wb.set_vertex_store_state(&state)?;
        self.kv_store.write(wb.into_inner());
        Ok(())
    }

    fn publish_high_qc(&mut self) {
        Event::UpdateHighQC(UpdateHighQCEvent {
            timestamp: SystemTime::now(),
            high_qc: self.high_qc.clone(),
        })
        .publish(&self.event_publisher);
        self.updates
            .push_back(VertexStoreUpdate::HighQcUpdated(self.high_qc.clone()));
    }

    fn update_size_counter(&self) {
        self.counters
            .set(CounterType::BftVertexStoreSize, self.vertices.len() as u64);
    }
}

// Whether the headers in `qc` are those of `certified` and its ancestors, and `qc` commits exactly what
// the 3-chain rule commits, if anything.
fn matches_certified_vertex(qc: &QuorumCertificate, certified: &PreparedVertex) -> bool {
    let vertex = &certified.vertex;
    if qc.is_genesis() {
        return vertex.is_genesis()
            && *qc == QuorumCertificate::genesis(vertex, certified.ledger_header);
    }
    if vertex.is_genesis()
        || *qc.proposed() != certified.header()
        || qc.parent() != vertex.parent_header()
    {
        return false;
    }

    match qc.committed() {
        None => true,
        Some(committed) => {
            !vertex.touches_genesis()
                && vertex.has_direct_parent()
                && vertex.parent_has_direct_parent()
                && committed == vertex.grandparent_header()
        }
    }
}

fn root_of(state: &VerifiedVertexStoreState) -> PreparedVertex {
    PreparedVertex {
        vertex: state.root().clone(),
        ledger_header: state.root_header(),
    }
}

#[derive(Debug)]
pub enum VertexStoreError {
    MissingParent { parent: VertexId },
    InvalidQC { vertex: VertexId },
    InvalidVertex { vertex: VertexId },
    MissingCommittedVertex { vertex: VertexId },
    UnpreparableState { root: VertexId },
    InconsistentState(VertexStoreStateError),
    Ledger(LedgerError),
    Persistence(KVSetError),
}

impl VertexStoreError {
    /// Whether the error leaves the replica unable to continue safely, as opposed to an error caused
    /// by a faulty or lagging peer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VertexStoreError::MissingCommittedVertex { .. }
                | VertexStoreError::UnpreparableState { .. }
                | VertexStoreError::InconsistentState(_)
                | VertexStoreError::Ledger(_)
                | VertexStoreError::Persistence(_)
        )
    }
}

impl From<VertexStoreStateError> for VertexStoreError {
    fn from(value: VertexStoreStateError) -> Self {
        VertexStoreError::InconsistentState(value)
    }
}

impl From<LedgerError> for VertexStoreError {
    fn from(value: LedgerError) -> Self {
        VertexStoreError::Ledger(value)
    }
}

impl From<KVSetError> for VertexStoreError {
    fn from(value: KVSetError) -> Self {
        VertexStoreError::Persistence(value)
    }
}
