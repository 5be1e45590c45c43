/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A chained BFT consensus core in the HotStuff family.
//!
//! A set of validators, up to a third of whose voting power may be Byzantine, agrees on a single chain
//! of vertices. Every vertex extends its parent through the parent's quorum certificate (QC), and a
//! vertex is committed once it heads a 3-chain of vertices proposed in consecutive views. Commits are
//! handed to a pluggable [`Ledger`](ledger::Ledger), which decides the content of vertices and where
//! epochs end.
//!
//! ## Components
//!
//! The consensus core of every epoch is made up of:
//! 1. [Leader Election](leader_election): weighted round-robin choice of the proposer of every view.
//! 2. [Safety Rules](safety_rules): the voting rules, and the signer of proposals and votes.
//! 3. [Vertex Store](vertex_store): the tree of uncommitted vertices and the 3-chain commit rule.
//! 4. [Pacemaker](pacemaker): view progression, proposal, vote collection and exponential timeouts.
//! 5. [BFT Sync](bft_sync): fetching the vertices that certificates from peers refer to.
//!
//! The [Epoch Manager](epoch_manager) runs one such core per epoch, and replaces it when the ledger
//! closes the epoch.
//!
//! ## Pluggables
//!
//! Library users provide implementations of:
//! 1. [`Network`](networking::network::Network): peer-to-peer message delivery.
//! 2. [`KVStore`](persistence::pluggables::KVStore): crash-safe storage of consensus state.
//! 3. [`Ledger`](ledger::Ledger): the state machine that consensus orders the input of.
//!
//! and start a [replica](replica) with them.

pub mod types;

pub mod leader_election;

pub mod safety_rules;

pub mod vertex_store;

pub mod pacemaker;

pub mod bft_sync;

pub mod epoch_manager;

pub mod networking;

pub mod persistence;

pub mod ledger;

pub mod counters;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod replica;
