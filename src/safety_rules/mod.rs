/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The only component that signs votes, timeout votes and proposals.
//!
//! ## Rules
//!
//! Safety Rules refuses to sign anything that could contribute to two conflicting vertices being
//! committed:
//! 1. **No double votes**: a validator votes at most once per view, and only for views strictly higher
//!    than the view it last voted in. Asking again for the vote it already cast for the same vertex
//!    returns that vote unchanged.
//! 2. **Locking**: a validator only votes for (or proposes) a vertex whose parent's view is at least its
//!    locked view. Voting for a vertex raises the locked view to the view of the vertex's grandparent.
//! 3. **Timeouts**: only the last vote cast can be turned into a timeout vote.
//!
//! Every vote is written to the [`KVStore`] **before** it is returned, so that a validator that
//! crashes and restarts cannot be tricked into voting twice in the same view.

pub mod state;

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::{
    events::{Event, UpdateLockedViewEvent},
    pacemaker::messages::{Proposal, Vote},
    persistence::pluggables::{KVSetError, KVStore, StateWriteBatch},
    types::{
        certificates::{HighQC, QuorumCertificate, TimeoutCertificate, VoteData},
        crypto_primitives::Keypair,
        data_types::ViewNumber,
        vertex::{BftHeader, Vertex},
    },
};

use self::state::SafetyState;

pub struct SafetyRules<K: KVStore> {
    keypair: Keypair,
    state: SafetyState,
    kv_store: K,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore> SafetyRules<K> {
    pub fn new(
        keypair: Keypair,
        initial_state: SafetyState,
        kv_store: K,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            keypair,
            state: initial_state,
            kv_store,
            event_publisher,
        }
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    /// Sign a proposal for `vertex`, unless the vertex does not respect the locked view.
    ///
    /// Proposing raises the locked view in the same way as voting does, and the raised lock is persisted
    /// before the proposal is returned.
    pub fn sign_proposal(
        &mut self,
        vertex: Vertex,
        highest_committed_qc: QuorumCertificate,
        highest_tc: Option<TimeoutCertificate>,
    ) -> Result<Option<Proposal>, SafetyRulesError> {
        let next_state = match self.check_locked(&vertex, self.state.clone()) {
            Some(next_state) => next_state,
            None => return Ok(None),
        };
        if next_state != self.state {
            self.commit_state(next_state)?;
        }

        let signature = self.keypair.sign(&vertex.id.bytes());
        Ok(Some(Proposal {
            vertex,
            signature,
            highest_committed_qc,
            highest_tc,
        }))
    }

    /// Vote for `vertex`, whose prepared header is `proposed_header`, if doing so respects the
    /// [rules](self#rules).
    ///
    /// The new safety state is persisted before the vote is returned.
    pub fn vote_for(
        &mut self,
        vertex: &Vertex,
        proposed_header: BftHeader,
        timestamp: u64,
        high_qc: HighQC,
    ) -> Result<Option<Vote>, SafetyRulesError> {
        // 1. Check that the vertex does not violate an earlier vote.
        if vertex.view <= self.state.last_voted_view() {
            if let Some(last_vote) = self.state.last_vote() {
                if last_vote.view() == vertex.view && last_vote.vertex_id() == vertex.id {
                    return Ok(Some(last_vote.clone()));
                }
            }
            log::warn!(
                "Safety warning: vertex at view {} violates earlier vote at view {}",
                vertex.view,
                self.state.last_voted_view()
            );
            return Ok(None);
        }

        // 2. Check that the vertex respects the locked view, and compute the new lock.
        let next_state = match self.check_locked(vertex, self.state.clone()) {
            Some(next_state) => next_state,
            None => return Ok(None),
        };

        // 3. Sign the vote, persist, and only then return it.
        let vote = self.create_vote(vertex, proposed_header, timestamp, high_qc);
        self.commit_state(next_state.with_last_vote(vote.clone()))?;
        Ok(Some(vote))
    }

    /// Augment `vote` with a signature over its [`VoteTimeout`](crate::types::certificates::VoteTimeout),
    /// and persist it as the last vote.
    ///
    /// Only the last vote cast can time out. Returns `None` for any other vote, including votes of
    /// earlier views.
    pub fn timeout_vote(&mut self, vote: Vote) -> Result<Option<Vote>, SafetyRulesError> {
        let last_vote = match self.state.last_vote() {
            Some(last_vote)
                if last_vote.view() == vote.view() && last_vote.vote_data == vote.vote_data =>
            {
                last_vote.clone()
            }
            _ => {
                log::warn!(
                    "Safety warning: not timing out vote at view {}, last voted view is {}",
                    vote.view(),
                    self.state.last_voted_view()
                );
                return Ok(None);
            }
        };
        if last_vote.is_timeout() {
            return Ok(Some(last_vote));
        }

        let timeout_signature = self.keypair.sign(&last_vote.timeout().signing_bytes());
        let timeout_vote = Vote {
            timeout_signature: Some(timeout_signature),
            ..last_vote
        };
        self.commit_state(self.state.clone().with_last_vote(timeout_vote.clone()))?;
        Ok(Some(timeout_vote))
    }

    /// Get the last vote cast, if it was cast in `view`.
    pub fn get_last_vote(&self, view: ViewNumber) -> Option<Vote> {
        self.state
            .last_vote()
            .filter(|last_vote| last_vote.view() == view)
            .cloned()
    }

    fn check_locked(&self, vertex: &Vertex, next_state: SafetyState) -> Option<SafetyState> {
        if vertex.parent_header().view < self.state.locked_view() {
            log::warn!(
                "Safety warning: vertex at view {} does not respect locked view {}",
                vertex.view,
                self.state.locked_view()
            );
            return None;
        }

        let grandparent_view = vertex.grandparent_header().view;
        if grandparent_view > self.state.locked_view() {
            Some(next_state.with_locked_view(grandparent_view))
        } else {
            Some(next_state)
        }
    }

    fn create_vote(
        &self,
        vertex: &Vertex,
        proposed_header: BftHeader,
        timestamp: u64,
        high_qc: HighQC,
    ) -> Vote {
        // A QC over this vote commits the grandparent only if it closes three consecutive views.
        let committed = if vertex.touches_genesis()
            || !vertex.has_direct_parent()
            || !vertex.parent_has_direct_parent()
        {
            None
        } else {
            Some(vertex.grandparent_header().clone())
        };
        let vote_data = VoteData::new(proposed_header, vertex.parent_header().clone(), committed);
        let signature = self.keypair.sign(&vote_data.signing_bytes(timestamp));

        Vote {
            author: self.keypair.public_bytes(),
            high_qc,
            vote_data,
            timestamp,
            signature,
            timeout_signature: None,
        }
    }

    fn commit_state(&mut self, state: SafetyState) -> Result<(), SafetyRulesError> {
        let mut wb = StateWriteBatch::<K::WriteBatch>::new();
        wb.set_safety_state(&state)?;
        self.kv_store.write(wb.into_inner());

        if state.locked_view() > self.state.locked_view() {
            Event::UpdateLockedView(UpdateLockedViewEvent {
                timestamp: SystemTime::now(),
                locked_view: state.locked_view(),
            })
            .publish(&self.event_publisher);
        }
        self.state = state;
        Ok(())
    }
}

#[derive(Debug)]
pub enum SafetyRulesError {
    Persistence(KVSetError),
}

impl From<KVSetError> for SafetyRulesError {
    fn from(value: KVSetError) -> Self {
        SafetyRulesError::Persistence(value)
    }
}
