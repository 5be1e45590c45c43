/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events that a replica emits, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published
//! on the algorithm thread and handled on the [event bus](crate::event_bus) thread, so handlers never
//! delay consensus.

use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::{
    pacemaker::messages::{Proposal, Vote},
    types::{
        certificates::{HighQC, QuorumCertificate, TimeoutCertificate},
        crypto_primitives::VerifyingKey,
        data_types::{EpochNumber, VertexId, ViewNumber},
        validator_set::ValidatorSet,
        vertex::{LedgerHeader, Vertex},
    },
};

/// Enumerates all events defined for a replica.
pub enum Event {
    // Events that change persistent state.
    InsertVertex(InsertVertexEvent),
    CommitVertex(CommitVertexEvent),
    PruneVertex(PruneVertexEvent),
    UpdateHighQC(UpdateHighQCEvent),
    UpdateLockedView(UpdateLockedViewEvent),
    EnterEpoch(EnterEpochEvent),

    // Events that involve broadcasting or sending a message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    TimeoutVote(TimeoutVoteEvent),

    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),

    // Pacemaker events.
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),
    CollectQC(CollectQCEvent),
    CollectTC(CollectTCEvent),

    // Sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    SendSyncResponse(SendSyncResponseEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one. Events published after the event bus shut down
    /// are dropped.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A vertex was prepared by the ledger and inserted into the vertex store.
pub struct InsertVertexEvent {
    pub timestamp: SystemTime,
    pub vertex: Vertex,
    pub ledger_header: LedgerHeader,
}

/// A vertex was committed and handed to the ledger.
pub struct CommitVertexEvent {
    pub timestamp: SystemTime,
    pub vertex: VertexId,
    pub view: ViewNumber,
    pub ledger_header: LedgerHeader,
}

/// A vertex that conflicts with a committed vertex was removed from the vertex store.
pub struct PruneVertexEvent {
    pub timestamp: SystemTime,
    pub vertex: VertexId,
}

pub struct UpdateHighQCEvent {
    pub timestamp: SystemTime,
    pub high_qc: HighQC,
}

pub struct UpdateLockedViewEvent {
    pub timestamp: SystemTime,
    pub locked_view: ViewNumber,
}

/// The replica started running consensus in a new epoch.
pub struct EnterEpochEvent {
    pub timestamp: SystemTime,
    pub epoch: EpochNumber,
    pub validator_set: ValidatorSet,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct TimeoutVoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub vote: Vote,
}

pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub leader: VerifyingKey,
    pub view: ViewNumber,
    pub timeout: Duration,
}

pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,

    /// How many times the view has timed out, starting from 1.
    pub count: u32,
}

pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_certificate: QuorumCertificate,
}

pub struct CollectTCEvent {
    pub timestamp: SystemTime,
    pub timeout_certificate: TimeoutCertificate,
}

/// A request for `count` vertices ending at `vertex` was sent to `peer`.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub vertex: VertexId,
    pub count: u32,
}

/// The vertex store caught up with a QC that it was syncing to.
pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub vertex: VertexId,
    pub view: ViewNumber,
}

pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub vertex: VertexId,
    pub count: u32,
}

/// A sync request from `peer` was answered. `vertices` is zero if it was answered with an error response.
pub struct SendSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: VerifyingKey,
    pub vertices: usize,
    pub high_qc: HighQC,
}
