/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that brings a lagging replica up to the certificates its peers have.
//!
//! Every proposal and vote carries its sender's [`HighQC`](crate::types::certificates::HighQC). Before
//! such a message is processed, the replica makes sure that its [vertex store](crate::vertex_store)
//! contains the vertex certified by the message's highest QC. If it does not, the message is held in
//! the [`Preprocessor`](preprocessor::Preprocessor) while the missing vertices are fetched from the
//! sender and the other signers of the QC, using [`GetVerticesRequest`](messages::GetVerticesRequest)s.
//!
//! A replica that is only missing uncommitted vertices fetches them one by one ("QC sync"). A replica
//! that is missing commits first fetches the 3-chain that proves the latest commit, waits for the
//! [`Ledger`](crate::ledger::Ledger) to catch up to the committed state, and rebuilds its vertex store
//! on top of it ("committed sync").
//!
//! Every replica also answers the requests of its peers, see [`server`].

pub(crate) mod implementation;

pub mod messages;

pub(crate) mod preprocessor;

pub(crate) mod rate_limiter;

pub(crate) mod server;
