/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! Replicas are reachable by their verifying keys. Network providers interact with the consensus core
//! through implementations of the [`Network`](network::Network) trait: a poller thread moves received
//! [`Message`](messages::Message)s into a channel read by the algorithm thread, and the components of the
//! consensus core send messages through [`SenderHandle`](sending::SenderHandle)s.

pub mod network;

pub mod messages;

pub(crate) mod receiving;

pub(crate) mod sending;
