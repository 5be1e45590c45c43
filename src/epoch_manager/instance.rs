/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus state machine of a single epoch.
//!
//! Main type: [`ConsensusInstance`].

use std::{collections::VecDeque, sync::mpsc::Sender, time::Instant};

use ed25519_dalek::VerifyingKey;

use crate::{
    bft_sync::{
        implementation::{BftSync, SyncResult},
        messages::SyncMessage,
        preprocessor::Preprocessor,
        server::SyncServer,
    },
    counters::SystemCounters,
    events::Event,
    leader_election::LeaderElection,
    ledger::{EpochChange, Ledger},
    networking::{network::Network, sending::SenderHandle},
    pacemaker::{
        implementation::Pacemaker, messages::PacemakerMessage, pending_votes::ViewVotingResult,
    },
    persistence::pluggables::KVStore,
    safety_rules::{state::SafetyState, SafetyRules},
    types::{
        certificates::HighQC,
        data_types::{EpochNumber, ViewNumber},
        validator_set::ValidatorSet,
        vertex::VerifiedVertexStoreState,
    },
    vertex_store::implementation::{VertexStore, VertexStoreUpdate},
};

use super::implementation::{EpochManagerConfiguration, EpochManagerError};

type Queue = VecDeque<(VerifyingKey, PacemakerMessage)>;

/// Vertex Store, Safety Rules, Leader Election, Pacemaker and BFT Sync of one epoch, wired together.
///
/// Every operation ends by reacting to the [`VertexStoreUpdate`]s it caused, and by replaying the
/// held messages that became processable, until nothing is left to do.
pub(crate) struct ConsensusInstance<N: Network, K: KVStore> {
    vertex_store: VertexStore<K>,
    pacemaker: Pacemaker<N, K>,
    bft_sync: BftSync<N>,
    sync_server: SyncServer<N>,
    preprocessor: Preprocessor,

    // Highest view whose held messages were released.
    released_view: ViewNumber,

    // Set once a commit closes the epoch. The instance does nothing after that.
    epoch_change: Option<EpochChange>,
}

impl<N: Network, K: KVStore> ConsensusInstance<N, K> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new<L: Ledger>(
        config: &EpochManagerConfiguration,
        validator_set: ValidatorSet,
        state: VerifiedVertexStoreState,
        safety_state: SafetyState,
        ledger: &mut L,
        kv_store: K,
        network: N,
        counters: SystemCounters,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, EpochManagerError> {
        let vertex_store = VertexStore::create(
            state,
            validator_set.clone(),
            config.pending_vertex_capacity,
            ledger,
            kv_store.clone(),
            counters.clone(),
            event_publisher.clone(),
        )?;
        let leader_election = LeaderElection::new(validator_set, config.leader_election)?;
        let safety_rules = SafetyRules::new(
            config.keypair.clone(),
            safety_state,
            kv_store,
            event_publisher.clone(),
        );
        let pacemaker = Pacemaker::new(
            config.pacemaker.clone(),
            safety_rules,
            leader_election,
            SenderHandle::new(network.clone()),
            counters.clone(),
            event_publisher.clone(),
        );
        let bft_sync = BftSync::new(
            config.bft_sync.clone(),
            ledger.committed_header(),
            SenderHandle::new(network.clone()),
            counters.clone(),
            event_publisher.clone(),
        );
        let sync_server = SyncServer::new(
            SenderHandle::new(network),
            config.max_vertices_per_response,
            counters,
            event_publisher,
        );

        Ok(Self {
            vertex_store,
            pacemaker,
            bft_sync,
            sync_server,
            preprocessor: Preprocessor::new(config.sync_buffer_capacity),
            released_view: ViewNumber::genesis(),
            epoch_change: None,
        })
    }

    /// Enter the first view.
    pub(crate) fn start<L: Ledger>(&mut self, ledger: &mut L) -> Result<(), EpochManagerError> {
        self.pacemaker.start(&mut self.vertex_store, ledger)?;
        self.run(VecDeque::new(), ledger)
    }

    pub(crate) fn epoch(&self) -> EpochNumber {
        self.vertex_store.epoch()
    }

    pub(crate) fn view(&self) -> ViewNumber {
        self.pacemaker.view()
    }

    /// The instant at which the current view times out.
    pub(crate) fn deadline(&self) -> Instant {
        self.pacemaker.view_info().deadline
    }

    /// Take the start of the next epoch, if a commit closed this one.
    pub(crate) fn take_epoch_change(&mut self) -> Option<EpochChange> {
        self.epoch_change.take()
    }

    /// Process proposals and votes of this epoch, in order.
    pub(crate) fn process_consensus_messages<L: Ledger>(
        &mut self,
        messages: Vec<(VerifyingKey, PacemakerMessage)>,
        ledger: &mut L,
    ) -> Result<(), EpochManagerError> {
        self.run(messages.into(), ledger)
    }

    pub(crate) fn process_sync_message<L: Ledger>(
        &mut self,
        origin: &VerifyingKey,
        message: SyncMessage,
        ledger: &mut L,
    ) -> Result<(), EpochManagerError> {
        match message {
            SyncMessage::GetVerticesRequest(request) => {
                self.sync_server
                    .process_request(origin, request, &self.vertex_store);
                return Ok(());
            }
            SyncMessage::GetVerticesResponse(response) => {
                self.bft_sync
                    .process_response(origin, response, &mut self.vertex_store, ledger)?
            }
            SyncMessage::GetVerticesErrorResponse(response) => self
                .bft_sync
                .process_error_response(origin, response, &mut self.vertex_store, ledger)?,
        }
        self.run(VecDeque::new(), ledger)
    }

    /// Time out the current view and pending sync requests, if their deadlines passed.
    pub(crate) fn tick<L: Ledger>(&mut self, ledger: &mut L) -> Result<(), EpochManagerError> {
        self.pacemaker.tick(&mut self.vertex_store, ledger)?;
        self.bft_sync.tick(&mut self.vertex_store, ledger)?;
        self.run(VecDeque::new(), ledger)
    }

    fn run<L: Ledger>(&mut self, mut queue: Queue, ledger: &mut L) -> Result<(), EpochManagerError> {
        self.process_updates(&mut queue, ledger)?;
        while let Some((origin, message)) = queue.pop_front() {
            if self.epoch_change.is_some() {
                break;
            }
            self.process_message(origin, message, &mut queue, ledger)?;
            self.process_updates(&mut queue, ledger)?;
        }
        Ok(())
    }

    fn process_message<L: Ledger>(
        &mut self,
        origin: VerifyingKey,
        message: PacemakerMessage,
        queue: &mut Queue,
        ledger: &mut L,
    ) -> Result<(), EpochManagerError> {
        // 1. Drop messages for views that already ended.
        if message.view() < self.pacemaker.view() {
            log::debug!(
                "Dropping message for view {} in view {}",
                message.view(),
                self.pacemaker.view()
            );
            return Ok(());
        }

        // 2. Make sure the vertex store holds the vertex certified by the message's highest QC.
        let high_qc = message.high_qc();
        match self
            .bft_sync
            .sync_to_qc(&high_qc, &origin, &mut self.vertex_store, ledger)?
        {
            SyncResult::Invalid => {
                log::warn!("Dropping message for view {} with invalid high QC", message.view());
                return Ok(());
            }
            SyncResult::InProgress => {
                let vertex_id = high_qc.highest_qc().vertex_id();
                self.preprocessor.buffer_syncing(vertex_id, origin, message);
                return Ok(());
            }
            SyncResult::Synced => (),
        }

        // 3. The certificates may have moved this replica into the message's view.
        self.process_updates(queue, ledger)?;
        let view = self.pacemaker.view();
        if message.view() > view {
            self.preprocessor.buffer_future(origin, message);
            return Ok(());
        }
        if message.view() < view {
            return Ok(());
        }

        // 4. Hand the message to the Pacemaker.
        match message {
            PacemakerMessage::Proposal(proposal) => {
                self.pacemaker
                    .process_proposal(&origin, proposal, &mut self.vertex_store, ledger)?
            }
            PacemakerMessage::Vote(vote) => {
                if let Some(result) = self.pacemaker.process_vote(&origin, vote, &self.vertex_store) {
                    self.process_voting_result(origin, result, ledger)?;
                }
            }
        }
        Ok(())
    }

    fn process_voting_result<L: Ledger>(
        &mut self,
        origin: VerifyingKey,
        result: ViewVotingResult,
        ledger: &mut L,
    ) -> Result<(), EpochManagerError> {
        match result {
            ViewVotingResult::FormedQC(qc) => {
                let high_qc = HighQC::new(
                    qc,
                    self.vertex_store.high_qc().highest_committed_qc().clone(),
                    self.vertex_store.highest_tc().cloned(),
                );
                let view = high_qc.highest_qc().view();
                if self
                    .bft_sync
                    .sync_to_qc(&high_qc, &origin, &mut self.vertex_store, ledger)?
                    == SyncResult::Invalid
                {
                    log::warn!("Could not sync to the QC formed in view {}", view);
                }
            }
            ViewVotingResult::FormedTC(tc) => self.vertex_store.insert_timeout_certificate(tc),
        }
        Ok(())
    }

    // React to changes in the vertex store, then queue the held messages that can now be processed.
    fn process_updates<L: Ledger>(
        &mut self,
        queue: &mut Queue,
        ledger: &mut L,
    ) -> Result<(), EpochManagerError> {
        loop {
            let updates = self.vertex_store.drain_updates();
            if updates.is_empty() {
                break;
            }
            for update in updates {
                match update {
                    VertexStoreUpdate::Inserted(prepared) => self
                        .pacemaker
                        .process_inserted(&prepared, &self.vertex_store)?,
                    VertexStoreUpdate::HighQcUpdated(high_qc) => {
                        self.pacemaker
                            .process_high_qc(&high_qc, &mut self.vertex_store, ledger)?
                    }
                    VertexStoreUpdate::Rebuilt(state) => self.pacemaker.process_high_qc(
                        state.high_qc(),
                        &mut self.vertex_store,
                        ledger,
                    )?,
                    VertexStoreUpdate::Committed { ledger_update, .. } => {
                        self.bft_sync.process_ledger_update(
                            ledger_update.committed_header,
                            &mut self.vertex_store,
                            ledger,
                        )?;
                        if let Some(epoch_change) = ledger_update.epoch_change {
                            log::info!("Epoch {} closed by commit", self.epoch());
                            self.epoch_change = Some(epoch_change);
                        }
                    }
                }
            }
        }

        let view = self.pacemaker.view();
        if view > self.released_view {
            self.released_view = view;
            queue.extend(self.preprocessor.take_view(view));
        }

        for vertex_id in self.preprocessor.syncing_ids() {
            if self.vertex_store.contains_vertex(&vertex_id) {
                queue.extend(self.preprocessor.take_syncing(&vertex_id));
            } else if !self.bft_sync.is_syncing(&vertex_id) {
                let dropped = self.preprocessor.take_syncing(&vertex_id);
                log::debug!(
                    "Dropping {} messages waiting for {}: sync ended",
                    dropped.len(),
                    vertex_id
                );
            }
        }
        Ok(())
    }
}
