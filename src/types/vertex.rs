/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'vertex' type, the headers that summarize vertices, and the persisted form of
//! the vertex store.

use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::HashSet;

use super::{
    certificates::{HighQC, QuorumCertificate, TimestampedSignatures, VoteData},
    crypto_primitives::{encode, hash},
    data_types::{CryptoHash, EpochNumber, Payload, VerifyingKeyBytes, VertexId, ViewNumber},
};

/// The state of the ledger after executing a vertex, as reported by the
/// [`Ledger`](crate::ledger::Ledger).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct LedgerHeader {
    pub epoch: EpochNumber,
    pub view: ViewNumber,
    pub state_version: u64,
    pub accumulator: CryptoHash,
    pub timestamp_ms: u64,

    /// Whether this header closes its epoch. No further transactions are proposed on top of a vertex
    /// whose ledger header has this flag set.
    pub end_of_epoch: bool,
}

impl LedgerHeader {
    /// Create the ledger header that the genesis vertex of `epoch` carries.
    pub fn genesis(epoch: EpochNumber, accumulator: CryptoHash, timestamp_ms: u64) -> Self {
        Self {
            epoch,
            view: ViewNumber::genesis(),
            state_version: 0,
            accumulator,
            timestamp_ms,
            end_of_epoch: false,
        }
    }
}

/// Summary of a vertex: its view, its id, and the ledger state after executing it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct BftHeader {
    pub view: ViewNumber,
    pub vertex_id: VertexId,
    pub ledger_header: LedgerHeader,
}

impl BftHeader {
    /// Create a new `BftHeader`.
    pub fn new(view: ViewNumber, vertex_id: VertexId, ledger_header: LedgerHeader) -> Self {
        Self {
            view,
            vertex_id,
            ledger_header,
        }
    }
}

/// A proposed batch of transactions, chained to its parent through the quorum certificate `qc`.
///
/// Vertices are immutable. The `id` field caches the hash of the remaining fields; use
/// [`is_correct`](Self::is_correct) to check that a vertex received from the network is consistent.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub epoch: EpochNumber,
    pub qc: QuorumCertificate,
    pub view: ViewNumber,
    pub payload: Payload,

    /// The validator that proposed this vertex. `None` for genesis and timeout vertices.
    pub proposer: Option<VerifyingKeyBytes>,

    /// Whether this is an empty vertex that a validator created locally after timing out in `view`.
    pub is_timeout: bool,
}

impl Vertex {
    /// Create a new proposed vertex on top of the vertex certified by `qc`.
    pub fn new(
        epoch: EpochNumber,
        qc: QuorumCertificate,
        view: ViewNumber,
        payload: Payload,
        proposer: VerifyingKeyBytes,
    ) -> Vertex {
        Self::create(epoch, qc, view, payload, Some(proposer), false)
    }

    /// Create the empty vertex that a validator votes for after timing out in `view` without having
    /// voted.
    pub fn timeout(epoch: EpochNumber, qc: QuorumCertificate, view: ViewNumber) -> Vertex {
        Self::create(epoch, qc, view, Payload::empty(), None, true)
    }

    /// Create the genesis vertex of `epoch`, whose parent QC certifies a "pre-genesis" vertex with the
    /// all-zeroes id.
    pub fn genesis(epoch: EpochNumber, ledger_header: LedgerHeader) -> Vertex {
        let pre_genesis = BftHeader::new(ViewNumber::genesis(), CryptoHash::zero(), ledger_header);
        let qc = QuorumCertificate::new(
            VoteData::new(pre_genesis.clone(), pre_genesis.clone(), Some(pre_genesis)),
            TimestampedSignatures::genesis(),
        );
        Self::create(epoch, qc, ViewNumber::genesis(), Payload::empty(), None, false)
    }

    fn create(
        epoch: EpochNumber,
        qc: QuorumCertificate,
        view: ViewNumber,
        payload: Payload,
        proposer: Option<VerifyingKeyBytes>,
        is_timeout: bool,
    ) -> Vertex {
        Vertex {
            id: Vertex::hash(epoch, &qc, view, &payload, &proposer, is_timeout),
            epoch,
            qc,
            view,
            payload,
            proposer,
            is_timeout,
        }
    }

    /// Compute the id of a vertex with the given fields.
    pub fn hash(
        epoch: EpochNumber,
        qc: &QuorumCertificate,
        view: ViewNumber,
        payload: &Payload,
        proposer: &Option<VerifyingKeyBytes>,
        is_timeout: bool,
    ) -> VertexId {
        let mut bytes = encode(&epoch);
        bytes.extend(encode(qc));
        bytes.extend(encode(&view));
        bytes.extend(encode(payload));
        bytes.extend(encode(proposer));
        bytes.extend(encode(&is_timeout));
        hash(&bytes)
    }

    /// Checks that the cached `id` matches the contents of the vertex, and that the vertex extends its
    /// parent (i.e., its view is higher than the parent's, unless it is a genesis vertex).
    pub fn is_correct(&self) -> bool {
        self.id
            == Vertex::hash(
                self.epoch,
                &self.qc,
                self.view,
                &self.payload,
                &self.proposer,
                self.is_timeout,
            )
            && (self.is_genesis() || self.view > self.qc.view())
    }

    /// Get the id of this vertex's parent.
    pub fn parent_id(&self) -> VertexId {
        self.qc.vertex_id()
    }

    /// Get the header of this vertex's parent.
    pub fn parent_header(&self) -> &BftHeader {
        self.qc.proposed()
    }

    /// Get the header of this vertex's grandparent.
    pub fn grandparent_header(&self) -> &BftHeader {
        self.qc.parent()
    }

    /// Check whether this is the genesis vertex of its epoch.
    pub fn is_genesis(&self) -> bool {
        self.view.is_genesis()
    }

    /// Check whether this vertex, its parent, or its grandparent is a genesis vertex.
    pub fn touches_genesis(&self) -> bool {
        self.is_genesis()
            || self.parent_header().view.is_genesis()
            || self.grandparent_header().view.is_genesis()
    }

    /// Check whether this vertex is in the view directly after its parent's.
    pub fn has_direct_parent(&self) -> bool {
        self.view == self.parent_header().view.next()
    }

    /// Check whether this vertex's parent is in the view directly after its grandparent's.
    pub fn parent_has_direct_parent(&self) -> bool {
        self.parent_header().view == self.grandparent_header().view.next()
    }
}

/// A vertex that the ledger has prepared (speculatively executed) on top of its ancestors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedVertex {
    pub vertex: Vertex,
    pub ledger_header: LedgerHeader,
}

impl PreparedVertex {
    pub fn id(&self) -> VertexId {
        self.vertex.id
    }

    pub fn view(&self) -> ViewNumber {
        self.vertex.view
    }

    pub fn parent_id(&self) -> VertexId {
        self.vertex.parent_id()
    }

    /// Get the [`BftHeader`] that votes for this vertex carry as their `proposed` header.
    pub fn header(&self) -> BftHeader {
        BftHeader::new(self.vertex.view, self.vertex.id, self.ledger_header)
    }
}

/// The content of a vertex store: its root, the uncommitted vertices above the root in
/// parent-before-child order, and the best certificates known.
///
/// Values of this type are only constructed through [`new`](Self::new) and
/// [`genesis`](Self::genesis), which check that the vertices form a tree rooted at `root`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VerifiedVertexStoreState {
    high_qc: HighQC,
    root: Vertex,
    root_qc: QuorumCertificate,
    vertices: Vec<Vertex>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VertexStoreStateError {
    RootNotCommitted {
        root: VertexId,
    },
    DisconnectedVertex {
        vertex: VertexId,
        parent: VertexId,
    },
    MissingHighQcVertex {
        vertex: VertexId,
    },
}

impl VerifiedVertexStoreState {
    /// Check that `root` is the vertex committed by `high_qc.highest_committed_qc()`, that every
    /// vertex in `vertices` has its parent earlier in the list (or is a child of the root), and that
    /// the vertex certified by `high_qc.highest_qc()` is part of the state.
    pub fn new(
        high_qc: HighQC,
        root: Vertex,
        vertices: Vec<Vertex>,
    ) -> Result<Self, VertexStoreStateError> {
        let root_qc = high_qc.highest_committed_qc().clone();
        match root_qc.committed() {
            Some(committed) if committed.vertex_id == root.id => {}
            _ => return Err(VertexStoreStateError::RootNotCommitted { root: root.id }),
        }

        let mut known: HashSet<VertexId> = HashSet::from([root.id]);
        for vertex in &vertices {
            if !known.contains(&vertex.parent_id()) {
                return Err(VertexStoreStateError::DisconnectedVertex {
                    vertex: vertex.id,
                    parent: vertex.parent_id(),
                });
            }
            known.insert(vertex.id);
        }

        let high_qc_vertex = high_qc.highest_qc().vertex_id();
        if !known.contains(&high_qc_vertex) {
            return Err(VertexStoreStateError::MissingHighQcVertex {
                vertex: high_qc_vertex,
            });
        }

        Ok(Self {
            high_qc,
            root,
            root_qc,
            vertices,
        })
    }

    /// Create the starting state of `epoch`: a store that contains only the genesis vertex.
    pub fn genesis(epoch: EpochNumber, ledger_header: LedgerHeader) -> Self {
        let root = Vertex::genesis(epoch, ledger_header);
        let root_qc = QuorumCertificate::genesis(&root, ledger_header);
        Self {
            high_qc: HighQC::from_qc(root_qc.clone()),
            root,
            root_qc,
            vertices: Vec::new(),
        }
    }

    pub fn high_qc(&self) -> &HighQC {
        &self.high_qc
    }

    pub fn root(&self) -> &Vertex {
        &self.root
    }

    /// Get the QC whose committed header is the root, i.e., the proof that the root is committed.
    pub fn root_qc(&self) -> &QuorumCertificate {
        &self.root_qc
    }

    /// Get the ledger header of the root, as certified by [`root_qc`](Self::root_qc).
    pub fn root_header(&self) -> LedgerHeader {
        self.root_qc
            .committed()
            .map(|committed| committed.ledger_header)
            .unwrap_or(self.root_qc.proposed().ledger_header)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn epoch(&self) -> EpochNumber {
        self.root.epoch
    }
}
