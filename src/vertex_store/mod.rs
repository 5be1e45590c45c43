/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The in-memory tree of speculative vertices, and the 3-chain commit rule.
//!
//! # The Vertex Store
//!
//! The vertex store of an epoch holds a **root** (the most recently committed vertex) and every
//! uncommitted vertex that descends from it. Vertices reference their parent by id (through the
//! `proposed` header of their parent QC), so the store is an arena of vertices keyed by
//! [`VertexId`](crate::types::data_types::VertexId) plus a map from every vertex to its children.
//!
//! Every vertex in the store has been [prepared](crate::ledger::Ledger::prepare) by the ledger on top
//! of its ancestors, so the store also knows the [`LedgerHeader`](crate::types::vertex::LedgerHeader)
//! that executing each vertex produces.
//!
//! # The commit rule
//!
//! Let `X` be a vertex in view `v`, `P` its parent and `G` its grandparent. A QC over `X` commits `G` if
//! and only if `P` is in view `v-1` and `G` is in view `v-2`: three QCs over consecutive views, namely
//! QC(G) inside `P`, QC(P) inside `X`, and QC(X).
//!
//! Validators compute this when they vote: the [vote data](crate::types::certificates::VoteData) of a
//! vote for `X` carries `G`'s header as its `committed` header only when the rule holds. The store then
//! commits `G` as soon as it sees a QC whose `committed` header is above the root:
//! 1. The path from the root to `G` is handed, in view order, to the ledger.
//! 2. `G` becomes the root.
//! 3. Every vertex that does not descend from `G` is pruned.
//!
//! The most recently committed vertices below the root are kept aside, so that peers that lag behind
//! can still [fetch](implementation::VertexStore::get_vertices) the 3-chain that proves a commit.
//!
//! # Persistence
//!
//! The content of the store is written to the [`KVStore`](crate::persistence::pluggables::KVStore) as a
//! [`VerifiedVertexStoreState`](crate::types::vertex::VerifiedVertexStoreState) every time the highest
//! QC changes and every time a vertex is committed, so that a restarted replica can
//! [rebuild](implementation::VertexStore::create) its store.
//!
//! # Updates
//!
//! Other components react to changes in the store (e.g., the [Pacemaker](crate::pacemaker) votes for a
//! vertex once it is inserted). The store does not call them directly: it queues
//! [`VertexStoreUpdate`](implementation::VertexStoreUpdate)s, which the owner of the store
//! [drains](implementation::VertexStore::drain_updates) after every operation.

pub mod implementation;
