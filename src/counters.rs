/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Liveness counters shared between the algorithm thread and the library user.
//!
//! Counters are monotonically increasing (except [`CounterType::EpochManagerQueuedConsensusEvents`],
//! which tracks the current size of a buffer). A [`SystemCounters`] handle is cheap to clone, and every
//! clone observes the same values.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterType {
    BftProposalsMade,
    BftProcessedProposals,
    BftVotesSent,
    BftTimeoutsSent,
    BftTimedOutViews,
    BftVoteQuorums,
    BftTimeoutQuorums,
    BftRejectedVotes,
    BftRejectedProposals,
    BftCommittedVertices,
    BftVertexStoreSize,
    BftSyncRequestsSent,
    BftSyncRequestsReceived,
    BftSyncRequestTimeouts,
    BftSyncRateLimited,
    BftSyncAbandoned,
    BftSyncLedgerSyncs,
    EpochManagerQueuedConsensusEvents,
    EpochManagerEpochChanges,
}

const COUNTER_TYPES: usize = 19;

impl CounterType {
    fn index(self) -> usize {
        self as usize
    }

    /// Name of the counter in dotted lowercase, e.g., `bft.sync.abandoned`.
    pub fn name(self) -> &'static str {
        match self {
            CounterType::BftProposalsMade => "bft.proposals_made",
            CounterType::BftProcessedProposals => "bft.processed_proposals",
            CounterType::BftVotesSent => "bft.votes_sent",
            CounterType::BftTimeoutsSent => "bft.timeouts_sent",
            CounterType::BftTimedOutViews => "bft.timed_out_views",
            CounterType::BftVoteQuorums => "bft.vote_quorums",
            CounterType::BftTimeoutQuorums => "bft.timeout_quorums",
            CounterType::BftRejectedVotes => "bft.rejected_votes",
            CounterType::BftRejectedProposals => "bft.rejected_proposals",
            CounterType::BftCommittedVertices => "bft.committed_vertices",
            CounterType::BftVertexStoreSize => "bft.vertex_store_size",
            CounterType::BftSyncRequestsSent => "bft.sync.requests_sent",
            CounterType::BftSyncRequestsReceived => "bft.sync.requests_received",
            CounterType::BftSyncRequestTimeouts => "bft.sync.request_timeouts",
            CounterType::BftSyncRateLimited => "bft.sync.rate_limited",
            CounterType::BftSyncAbandoned => "bft.sync.abandoned",
            CounterType::BftSyncLedgerSyncs => "bft.sync.ledger_syncs",
            CounterType::EpochManagerQueuedConsensusEvents => "epoch_manager.queued_consensus_events",
            CounterType::EpochManagerEpochChanges => "epoch_manager.epoch_changes",
        }
    }
}

/// Handle to a shared set of counters.
#[derive(Clone, Debug, Default)]
pub struct SystemCounters {
    counters: Arc<[AtomicU64; COUNTER_TYPES]>,
}

impl SystemCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: CounterType) {
        self.add(counter, 1)
    }

    pub fn add(&self, counter: CounterType, amount: u64) {
        self.counters[counter.index()].fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set(&self, counter: CounterType, value: u64) {
        self.counters[counter.index()].store(value, Ordering::Relaxed);
    }

    pub fn get(&self, counter: CounterType) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }
}
