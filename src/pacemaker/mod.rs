/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol that drives views forward: proposing, voting, vote aggregation, and timeouts.
//!
//! # Views
//!
//! Every epoch starts at view 0, the view of its genesis vertex. A replica leaves view `v` and enters
//! view `v + 1` as soon as it learns of a certificate for `v` or a higher view:
//! - A **quorum certificate** (QC) over a vertex proposed in `v`, or
//! - A **timeout certificate** (TC) for `v`.
//!
//! More precisely, whenever the highest QC or the highest TC known to the replica changes, the replica
//! enters the view `max(qc.view, tc.view) + 1`, if that is higher than its current view. Certificates
//! reach a replica inside proposals and votes (every message carries its sender's
//! [`HighQC`](crate::types::certificates::HighQC)), or are formed by the replica itself from votes.
//!
//! # Happy path
//!
//! 1. On entering a view, the [leader](crate::leader_election) of the view proposes a new vertex on top
//!    of the vertex certified by its highest QC, and broadcasts the [`Proposal`](messages::Proposal).
//! 2. On receiving the proposal, every validator inserts the vertex into its
//!    [vertex store](crate::vertex_store), asks [safety rules](crate::safety_rules) to vote for it, and
//!    sends the [`Vote`](messages::Vote) to the leader of the **next** view.
//! 3. The next leader collects the votes into a QC, which moves it to the next view, where it proposes
//!    on top of the new QC. Other validators learn about the QC from that proposal.
//!
//! # Timeouts
//!
//! If a view does not end before its deadline, a validator broadcasts a **timeout vote**: its vote in the
//! view augmented with a signature over `(epoch, view)`. A validator that had not voted in the view first
//! creates an empty *timeout vertex* on top of its highest QC and votes for it. Timeout votes from a
//! quorum form a TC. Since a timeout vote is still a vote for a vertex, timeout votes for the same vertex
//! can also form a QC.
//!
//! The deadline of a view depends on how many views passed since the last commit:
//! `timeout(n) = base * rate^min(n, max_exponent)`, where `n = max(0, view - highest_committed_view - 3)`.
//! A view that times out re-arms its deadline, so that the timeout vote is re-sent until the view ends.

pub(crate) mod implementation;

pub mod messages;

pub mod pending_votes;

pub mod timeout;
