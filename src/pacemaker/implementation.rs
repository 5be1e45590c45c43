/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the Pacemaker subprotocol.
//!
//! Main type: [`Pacemaker`].

use std::{
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    counters::{CounterType, SystemCounters},
    events::{
        CollectQCEvent, CollectTCEvent, Event, ProposeEvent, ReceiveProposalEvent, ReceiveVoteEvent,
        StartViewEvent, TimeoutVoteEvent, ViewTimeoutEvent, VoteEvent,
    },
    leader_election::LeaderElection,
    ledger::Ledger,
    networking::{network::Network, sending::SenderHandle},
    persistence::pluggables::KVStore,
    safety_rules::{SafetyRules, SafetyRulesError},
    types::{
        certificates::HighQC,
        crypto_primitives::Keypair,
        data_types::{Payload, ViewNumber},
        signed_messages::SignedMessage,
        vertex::{PreparedVertex, Vertex},
    },
    vertex_store::implementation::{VertexStore, VertexStoreError},
};

use super::{
    messages::{Proposal, Vote},
    pending_votes::{PendingVotes, ViewVotingResult, VoteProcessingResult, VoteRejectedReason},
    timeout::ExponentialTimeout,
};

/// A single participant in the Pacemaker subprotocol.
///
/// # Usage
///
/// After creating an instance of `Pacemaker` using [`new`](Self::new) and entering the first view with
/// [`start`](Self::start), the owner of the `Pacemaker` should interact with it by calling:
/// 1. [`process_proposal`](Self::process_proposal) and [`process_vote`](Self::process_vote) whenever a
///    proposal or vote for the current view is received.
/// 2. [`process_high_qc`](Self::process_high_qc) whenever the highest QC or TC of the vertex store
///    changes, and [`process_inserted`](Self::process_inserted) whenever a vertex is inserted into it.
/// 3. [`tick`](Self::tick): *as often as is practical*.
pub(crate) struct Pacemaker<N: Network, K: KVStore> {
    config: PacemakerConfiguration,
    view_info: ViewInfo,
    state: PacemakerState,
    pending_votes: PendingVotes,
    safety_rules: SafetyRules<K>,
    leader_election: LeaderElection,
    sender: SenderHandle<N>,
    counters: SystemCounters,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network, K: KVStore> Pacemaker<N, K> {
    /// Create a new `Pacemaker` in the genesis view. The first view is only entered when
    /// [`start`](Self::start) is called.
    pub(crate) fn new(
        config: PacemakerConfiguration,
        safety_rules: SafetyRules<K>,
        leader_election: LeaderElection,
        sender: SenderHandle<N>,
        counters: SystemCounters,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            view_info: ViewInfo::new(ViewNumber::genesis(), Instant::now()),
            state: PacemakerState::default(),
            pending_votes: PendingVotes::new(),
            safety_rules,
            leader_election,
            sender,
            counters,
            event_publisher,
        }
    }

    /// Enter the view that follows the highest QC or TC in `vertex_store`.
    pub(crate) fn start<L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        let view = vertex_store.high_qc().highest_view().next();
        self.start_view(view, vertex_store, ledger)
    }

    /// Get the current view.
    pub(crate) fn view(&self) -> ViewNumber {
        self.view_info.view
    }

    pub(crate) fn view_info(&self) -> &ViewInfo {
        &self.view_info
    }

    pub(crate) fn leader_election(&mut self) -> &mut LeaderElection {
        &mut self.leader_election
    }

    /// Advance to the view after the highest certificate in `high_qc`, if that is higher than the
    /// current view.
    pub(crate) fn process_high_qc<L: Ledger>(
        &mut self,
        high_qc: &HighQC,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        let next_view = high_qc.highest_view().next();
        if next_view <= self.view_info.view {
            return Ok(());
        }
        self.start_view(next_view, vertex_store, ledger)
    }

    /// Cause the Pacemaker to check the current time, possibly timing out the current view.
    pub(crate) fn tick<L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        if Instant::now() > self.view_info.deadline {
            self.process_local_timeout(vertex_store, ledger)?;
        }
        Ok(())
    }

    /// Execute the required steps upon receiving a proposal from `origin`.
    ///
    /// # Precondition
    ///
    /// The highest QC carried by the proposal has been synced into `vertex_store`.
    pub(crate) fn process_proposal<L: Ledger>(
        &mut self,
        origin: &VerifyingKey,
        proposal: Proposal,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin: *origin,
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);

        // 1. Ignore proposals for any view other than the current one.
        let view = proposal.view();
        if view != self.view_info.view {
            log::debug!(
                "Ignoring proposal for view {} in view {}",
                view,
                self.view_info.view
            );
            return Ok(());
        }

        // 2. Check that the proposal was signed by the leader of its view.
        let leader = self.leader_election.proposer(view);
        let is_from_leader = proposal
            .vertex
            .proposer
            .is_some_and(|proposer| proposer == leader.to_bytes());
        if !is_from_leader || !proposal.is_correct(&leader.to_bytes()) {
            log::warn!(
                "Rejecting proposal for view {}: not signed by the leader of the view",
                view
            );
            self.counters.increment(CounterType::BftRejectedProposals);
            return Ok(());
        }

        // 3. Insert the proposed vertex. Voting for it happens when the insertion is reported back.
        match vertex_store.insert_vertex(proposal.vertex, ledger) {
            Ok(_) => {
                self.counters.increment(CounterType::BftProcessedProposals);
                Ok(())
            }
            Err(err) if !err.is_fatal() => {
                log::warn!("Rejecting proposal for view {}: {:?}", view, err);
                self.counters.increment(CounterType::BftRejectedProposals);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Vote for `vertex` if it was just inserted as the proposal of the current view.
    pub(crate) fn process_inserted(
        &mut self,
        vertex: &PreparedVertex,
        vertex_store: &VertexStore<K>,
    ) -> Result<(), PacemakerError> {
        let view = self.view_info.view;
        if vertex.view() != view || vertex.vertex.is_timeout || self.state.is_view_timed_out {
            return Ok(());
        }

        let vote = self.safety_rules.vote_for(
            &vertex.vertex,
            vertex.header(),
            unix_millis(),
            vertex_store.high_qc().clone(),
        )?;
        match vote {
            Some(vote) => {
                let next_leader = self.leader_election.proposer(view.next());
                self.sender.send(next_leader, vote.clone());
                self.counters.increment(CounterType::BftVotesSent);
                Event::Vote(VoteEvent {
                    timestamp: SystemTime::now(),
                    vote,
                })
                .publish(&self.event_publisher);
            }
            None => log::debug!("Not voting for vertex {} in view {}", vertex.id(), view),
        }
        Ok(())
    }

    /// Execute the required steps upon receiving a vote from `origin`.
    ///
    /// Returns the certificate formed by the vote, if any. The caller is responsible for syncing a
    /// formed QC into the vertex store, or recording a formed TC.
    pub(crate) fn process_vote(
        &mut self,
        origin: &VerifyingKey,
        vote: Vote,
        vertex_store: &VertexStore<K>,
    ) -> Option<ViewVotingResult> {
        Event::ReceiveVote(ReceiveVoteEvent {
            timestamp: SystemTime::now(),
            origin: *origin,
            vote: vote.clone(),
        })
        .publish(&self.event_publisher);

        // 1. Ignore votes that can no longer make a difference.
        let view = vote.view();
        if view < self.view_info.view
            || (view == self.view_info.view && self.state.has_reached_quorum)
        {
            log::debug!("Ignoring vote for view {} in view {}", view, self.view_info.view);
            return None;
        }

        // 2. Regular votes are only collected by the next leader. Timeout votes are broadcast and
        //    collected by every validator.
        if !vote.is_timeout()
            && self.leader_election.proposer(view.next()) != self.config.keypair.public()
        {
            log::debug!("Ignoring vote for view {}: not the next leader", view);
            return None;
        }

        // 3. Check the vote's origin and signatures.
        let validator_set = vertex_store.validator_set();
        if vote.epoch() != vertex_store.epoch()
            || !validator_set.contains_bytes(&vote.author)
            || !vote.is_correct(&vote.author)
            || !vote.is_timeout_signature_correct()
        {
            log::warn!("Rejecting incorrectly signed vote for view {}", view);
            self.counters.increment(CounterType::BftRejectedVotes);
            return None;
        }

        // 4. Collect the vote.
        match self.pending_votes.insert_vote(&vote, validator_set) {
            VoteProcessingResult::Accepted => None,
            VoteProcessingResult::Rejected(VoteRejectedReason::AlreadyCounted) => {
                log::debug!("Vote for view {} already counted", view);
                None
            }
            VoteProcessingResult::Rejected(reason) => {
                log::warn!("Rejecting vote for view {}: {:?}", view, reason);
                self.counters.increment(CounterType::BftRejectedVotes);
                None
            }
            VoteProcessingResult::QuorumReached(result) => {
                if view == self.view_info.view {
                    self.state.has_reached_quorum = true;
                }
                match &result {
                    ViewVotingResult::FormedQC(qc) => {
                        self.counters.increment(CounterType::BftVoteQuorums);
                        Event::CollectQC(CollectQCEvent {
                            timestamp: SystemTime::now(),
                            quorum_certificate: qc.clone(),
                        })
                        .publish(&self.event_publisher);
                    }
                    ViewVotingResult::FormedTC(tc) => {
                        self.counters.increment(CounterType::BftTimeoutQuorums);
                        Event::CollectTC(CollectTCEvent {
                            timestamp: SystemTime::now(),
                            timeout_certificate: tc.clone(),
                        })
                        .publish(&self.event_publisher);
                    }
                }
                Some(result)
            }
        }
    }

    /// Update the Pacemaker's state in order to enter `view`, and propose if this replica is the
    /// leader of `view`.
    fn start_view<L: Ledger>(
        &mut self,
        view: ViewNumber,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        // 1. Reset the per-view state and arm the deadline of the new view.
        let timeout = self.current_timeout(view, vertex_store);
        self.view_info = ViewInfo::new(view, Instant::now() + timeout);
        self.state = PacemakerState::default();
        self.pending_votes.remove_votes_below(view);

        let leader = self.leader_election.proposer(view);
        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader,
            view,
            timeout,
        })
        .publish(&self.event_publisher);

        // 2. If this replica is the leader of the view, propose.
        if leader == self.config.keypair.public() {
            self.propose(vertex_store, ledger)?;
        }
        Ok(())
    }

    fn propose<L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        if self.state.has_proposed {
            return Ok(());
        }
        let view = self.view_info.view;
        let high_qc = vertex_store.high_qc().clone();
        let highest_qc = high_qc.highest_qc().clone();

        // A vertex on top of the end of an epoch carries no transactions.
        let payload = if highest_qc.proposed().ledger_header.end_of_epoch {
            Payload::empty()
        } else {
            let previous = vertex_store.get_path_from_root(&highest_qc.vertex_id());
            ledger.next_payload(view, &previous)
        };

        let vertex = Vertex::new(
            vertex_store.epoch(),
            highest_qc,
            view,
            payload,
            self.config.keypair.public_bytes(),
        );
        let proposal = self.safety_rules.sign_proposal(
            vertex,
            high_qc.highest_committed_qc().clone(),
            high_qc.highest_tc().cloned(),
        )?;
        match proposal {
            Some(proposal) => {
                self.state.has_proposed = true;
                self.sender.broadcast(proposal.clone());
                self.counters.increment(CounterType::BftProposalsMade);
                Event::Propose(ProposeEvent {
                    timestamp: SystemTime::now(),
                    proposal,
                })
                .publish(&self.event_publisher);
            }
            None => log::warn!("Safety rules refused to sign a proposal for view {}", view),
        }
        Ok(())
    }

    fn process_local_timeout<L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<(), PacemakerError> {
        let view = self.view_info.view;

        // 1. Record the timeout.
        if !self.state.is_view_timed_out {
            self.counters.increment(CounterType::BftTimedOutViews);
        }
        self.state.is_view_timed_out = true;
        self.state.timeout_count += 1;
        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view,
            count: self.state.timeout_count,
        })
        .publish(&self.event_publisher);

        // 2. Time out with the vote cast in this view, or with a vote for a fresh timeout vertex.
        let vote = match self.safety_rules.get_last_vote(view) {
            Some(vote) => Some(vote),
            None => self.vote_for_timeout_vertex(vertex_store, ledger)?,
        };

        // 3. Broadcast the timeout vote.
        let timeout_vote = match vote {
            Some(vote) => self.safety_rules.timeout_vote(vote)?,
            None => None,
        };
        if let Some(timeout_vote) = timeout_vote {
            self.sender.broadcast(timeout_vote.clone());
            self.counters.increment(CounterType::BftTimeoutsSent);
            Event::TimeoutVote(TimeoutVoteEvent {
                timestamp: SystemTime::now(),
                vote: timeout_vote,
            })
            .publish(&self.event_publisher);
        }

        // 4. Re-arm the deadline, so that the timeout vote is re-sent if the view still does not end.
        let timeout = self.current_timeout(view, vertex_store);
        self.view_info = self.view_info.with_new_deadline(Instant::now() + timeout);
        Ok(())
    }

    fn vote_for_timeout_vertex<L: Ledger>(
        &mut self,
        vertex_store: &mut VertexStore<K>,
        ledger: &mut L,
    ) -> Result<Option<Vote>, PacemakerError> {
        let view = self.view_info.view;
        let highest_qc = vertex_store.high_qc().highest_qc().clone();
        let vertex = Vertex::timeout(vertex_store.epoch(), highest_qc, view);
        let vertex_id = vertex.id;

        match vertex_store.insert_vertex(vertex, ledger) {
            Ok(_) => (),
            Err(err) if !err.is_fatal() => {
                log::warn!("Could not insert timeout vertex for view {}: {:?}", view, err);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }
        let prepared = match vertex_store.get_prepared_vertex(&vertex_id) {
            Some(prepared) => prepared.clone(),
            None => {
                log::warn!("Timeout vertex for view {} was not prepared", view);
                return Ok(None);
            }
        };

        let vote = self.safety_rules.vote_for(
            &prepared.vertex,
            prepared.header(),
            unix_millis(),
            vertex_store.high_qc().clone(),
        )?;
        if vote.is_none() {
            log::warn!("Safety rules refused to vote for timeout vertex of view {}", view);
        }
        Ok(vote)
    }

    fn current_timeout(&self, view: ViewNumber, vertex_store: &VertexStore<K>) -> Duration {
        let highest_committed_view = vertex_store.high_qc().highest_committed_qc().view();
        self.config.timeout.timeout_for(view, highest_committed_view)
    }
}

/// Configuration variables for the [`Pacemaker`] struct.
#[derive(Clone)]
pub(crate) struct PacemakerConfiguration {
    /// The keypair of this replica. Used to tell whether this replica leads a view.
    pub(crate) keypair: Keypair,

    /// How long a view lasts, given how many views passed since the last commit.
    pub(crate) timeout: ExponentialTimeout,
}

/// Per-view state of a [`Pacemaker`]. Reset on entering every view.
#[derive(Default)]
struct PacemakerState {
    is_view_timed_out: bool,
    timeout_count: u32,
    has_proposed: bool,
    has_reached_quorum: bool,
}

/// Enumerates the different ways a call to any of [`Pacemaker`]'s methods can fail.
#[derive(Debug)]
pub enum PacemakerError {
    /// See: [`SafetyRulesError`].
    SafetyRules(SafetyRulesError),

    /// See: [`VertexStoreError`].
    VertexStore(VertexStoreError),
}

impl From<SafetyRulesError> for PacemakerError {
    fn from(value: SafetyRulesError) -> Self {
        PacemakerError::SafetyRules(value)
    }
}

impl From<VertexStoreError> for PacemakerError {
    fn from(value: VertexStoreError) -> Self {
        PacemakerError::VertexStore(value)
    }
}

/// Describes a view (most often the current view), in terms of its view number and its view deadline (the
/// instant in time in which the view should end if no progress was made).
#[derive(PartialEq, Eq, Clone, Debug)]
pub(crate) struct ViewInfo {
    pub(crate) view: ViewNumber,
    pub(crate) deadline: Instant,
}

impl ViewInfo {
    pub(crate) fn new(view: ViewNumber, deadline: Instant) -> Self {
        Self { view, deadline }
    }

    /// Return a given [`ViewInfo`] with an updated deadline.
    pub(crate) fn with_new_deadline(&self, deadline: Instant) -> Self {
        Self {
            view: self.view,
            deadline,
        }
    }
}

/// Milliseconds since the Unix epoch, as carried in vote timestamps.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
