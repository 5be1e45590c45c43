/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Routes messages to the consensus instance of the current epoch, and replaces the instance when
//! the epoch ends.
//!
//! Main type: [`EpochManager`].

use std::{
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    bft_sync::implementation::{BftSyncConfiguration, BftSyncError},
    counters::{CounterType, SystemCounters},
    events::{EnterEpochEvent, Event},
    leader_election::{LeaderElectionConfiguration, LeaderElectionError},
    ledger::{closed_epoch, EpochChange, Ledger},
    networking::{
        messages::Message,
        network::{Network, ValidatorSetUpdateHandle},
        sending::SenderHandle,
    },
    pacemaker::{
        implementation::{PacemakerConfiguration, PacemakerError},
        messages::PacemakerMessage,
    },
    persistence::pluggables::{KVGetError, KVSetError, KVStore, StateWriteBatch},
    safety_rules::state::SafetyState,
    types::{
        crypto_primitives::Keypair, data_types::EpochNumber, signed_messages::Certificate,
        vertex::VerifiedVertexStoreState,
    },
    vertex_store::implementation::VertexStoreError,
};

use super::{
    future_epoch_buffer::FutureEpochBuffer,
    instance::ConsensusInstance,
    messages::{EpochMessage, GetEpochRequest, GetEpochResponse},
};

/// Owns the [`ConsensusInstance`] of the current epoch.
///
/// # Routing
///
/// - Proposals and votes of the current epoch go to the instance.
/// - Proposals and votes of the next epoch are held in a bounded buffer. Any message of a future epoch
///   may make the replica ask its sender for the proof that the current epoch ended.
/// - Proposals and votes of a past epoch are dropped.
/// - Sync messages go to the instance. Epoch messages are handled by the `EpochManager` itself.
///
/// A replica that is not a validator in the current epoch runs no instance. It only routes, and
/// answers epoch requests.
pub(crate) struct EpochManager<N: Network, K: KVStore, L: Ledger> {
    config: EpochManagerConfiguration,
    ledger: L,
    kv_store: K,
    network: N,
    sender: SenderHandle<N>,
    validator_set_update_handle: ValidatorSetUpdateHandle<N>,

    // The start of the current epoch.
    epoch_change: EpochChange,
    instance: Option<ConsensusInstance<N, K>>,

    future_messages: FutureEpochBuffer,

    counters: SystemCounters,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network, K: KVStore, L: Ledger> EpochManager<N, K, L> {
    /// Create an `EpochManager` in the latest epoch persisted in `kv_store`, or in the epoch started
    /// by `initial_epoch` if none was persisted.
    pub(crate) fn new(
        config: EpochManagerConfiguration,
        initial_epoch: EpochChange,
        ledger: L,
        kv_store: K,
        mut network: N,
        counters: SystemCounters,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, EpochManagerError> {
        let epoch_change = match kv_store.epoch_change()? {
            Some(persisted) if persisted.epoch >= initial_epoch.epoch => persisted,
            _ => initial_epoch,
        };
        network.init_validator_set(epoch_change.validator_set.clone());
        let future_messages =
            FutureEpochBuffer::new(epoch_change.epoch, config.future_epoch_buffer_capacity);

        Ok(Self {
            config,
            ledger,
            kv_store,
            sender: SenderHandle::new(network.clone()),
            validator_set_update_handle: ValidatorSetUpdateHandle::new(network.clone()),
            network,
            epoch_change,
            instance: None,
            future_messages,
            counters,
            event_publisher,
        })
    }

    /// Start running consensus in the current epoch, resuming from the persisted vertex store and
    /// safety state if they belong to it.
    pub(crate) fn start(&mut self) -> Result<(), EpochManagerError> {
        let epoch = self.epoch_change.epoch;
        self.persist_epoch_change(false)?;

        let state = match self.kv_store.vertex_store_state()? {
            Some(state) if state.epoch() == epoch => state,
            _ => self.epoch_change.genesis.clone(),
        };
        let safety_state = match self.kv_store.safety_state()? {
            Some(safety_state) if safety_state.epoch() == epoch => safety_state,
            _ => SafetyState::initial(epoch),
        };
        log::info!("Starting in epoch {}", epoch);
        self.start_instance(state, safety_state)?;
        self.process_epoch_changes()
    }

    pub(crate) fn epoch(&self) -> EpochNumber {
        self.epoch_change.epoch
    }

    /// The instant by which [`tick`](Self::tick) should be called.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.instance.as_ref().map(|instance| instance.deadline())
    }

    pub(crate) fn process_message(
        &mut self,
        origin: VerifyingKey,
        message: Message,
    ) -> Result<(), EpochManagerError> {
        match message {
            Message::PacemakerMessage(message) => self.process_consensus_message(origin, message)?,
            Message::SyncMessage(message) => {
                if let Some(instance) = &mut self.instance {
                    instance.process_sync_message(&origin, message, &mut self.ledger)?;
                }
            }
            Message::EpochMessage(EpochMessage::GetEpochRequest(request)) => {
                self.process_get_epoch_request(origin, request)
            }
            Message::EpochMessage(EpochMessage::GetEpochResponse(response)) => {
                self.process_get_epoch_response(origin, response)
            }
        }
        self.process_epoch_changes()
    }

    /// Let the instance check its deadlines, and check whether the ledger synced into a later epoch.
    pub(crate) fn tick(&mut self) -> Result<(), EpochManagerError> {
        if let Some(instance) = &mut self.instance {
            instance.tick(&mut self.ledger)?;
        }
        self.process_epoch_changes()?;

        if let Some(epoch_change) = self.ledger.synced_epoch_change() {
            if epoch_change.epoch > self.epoch() {
                log::info!("Ledger synced to epoch {}", epoch_change.epoch);
                self.enter_epoch(epoch_change)?;
                self.process_epoch_changes()?;
            }
        }
        Ok(())
    }

    fn process_consensus_message(
        &mut self,
        origin: VerifyingKey,
        message: PacemakerMessage,
    ) -> Result<(), EpochManagerError> {
        let epoch = message.epoch();
        let current_epoch = self.epoch();

        if epoch < current_epoch {
            log::debug!("Dropping message of past epoch {} in epoch {}", epoch, current_epoch);
            return Ok(());
        }

        if epoch > current_epoch {
            self.future_messages.hold(origin, message);
            self.counters.set(
                CounterType::EpochManagerQueuedConsensusEvents,
                self.future_messages.len() as u64,
            );

            if self.future_messages.should_request_epoch(Instant::now()) {
                log::debug!(
                    "Received message of epoch {} in epoch {}, asking for the epoch proof",
                    epoch,
                    current_epoch
                );
                self.sender.send(
                    origin,
                    GetEpochRequest {
                        epoch: current_epoch,
                    },
                );
            }
            return Ok(());
        }

        match &mut self.instance {
            Some(instance) => {
                instance.process_consensus_messages(vec![(origin, message)], &mut self.ledger)
            }
            None => Ok(()),
        }
    }

    // Answer with the proof that the requested epoch ended, if this replica has moved past it.
    fn process_get_epoch_request(&mut self, origin: VerifyingKey, request: GetEpochRequest) {
        let proof = if request.epoch < self.epoch() {
            Some(self.epoch_change.proof.clone())
        } else {
            log::debug!(
                "Cannot prove the end of epoch {} in epoch {}",
                request.epoch,
                self.epoch()
            );
            None
        };
        self.sender.send(origin, GetEpochResponse { proof });
    }

    // Hand a proof that a later epoch started to the ledger, which catches up to it.
    fn process_get_epoch_response(&mut self, origin: VerifyingKey, response: GetEpochResponse) {
        let proof = match response.proof {
            Some(proof) => proof,
            None => return,
        };
        let closed = match closed_epoch(&proof) {
            Some(closed) => closed,
            None => {
                log::warn!("Dropping epoch proof that does not close an epoch");
                return;
            }
        };
        if closed < self.epoch() {
            return;
        }

        // Only a proof of the end of the current epoch can be checked against a known validator set.
        if closed == self.epoch()
            && !proof.is_correctly_signed(&self.epoch_change.validator_set)
        {
            log::warn!("Dropping incorrectly signed proof of the end of epoch {}", closed);
            return;
        }
        log::info!("Received proof that epoch {} ended", closed);
        self.ledger.process_epoch_proof(&proof, origin.to_bytes());
    }

    fn process_epoch_changes(&mut self) -> Result<(), EpochManagerError> {
        while let Some(epoch_change) = self
            .instance
            .as_mut()
            .and_then(|instance| instance.take_epoch_change())
        {
            if epoch_change.epoch != self.epoch().next() {
                log::warn!(
                    "Ignoring epoch change to {} in epoch {}",
                    epoch_change.epoch,
                    self.epoch()
                );
                continue;
            }
            self.enter_epoch(epoch_change)?;
        }
        Ok(())
    }

    fn enter_epoch(&mut self, epoch_change: EpochChange) -> Result<(), EpochManagerError> {
        let epoch = epoch_change.epoch;
        log::info!("Entering epoch {}", epoch);

        // 1. Tear down the old instance, with its deadlines and sync requests.
        self.instance = None;

        // 2. Record the new epoch.
        self.epoch_change = epoch_change;
        self.persist_epoch_change(true)?;
        self.validator_set_update_handle
            .update_validator_set(self.epoch_change.validator_set.clone());
        self.counters.increment(CounterType::EpochManagerEpochChanges);

        // 3. Start a fresh instance.
        let genesis = self.epoch_change.genesis.clone();
        self.start_instance(genesis, SafetyState::initial(epoch))?;

        // 4. Replay the held messages of the new epoch, from their highest view only.
        let mut messages = self.future_messages.enter_epoch(epoch);
        self.counters.set(
            CounterType::EpochManagerQueuedConsensusEvents,
            self.future_messages.len() as u64,
        );

        if let Some(highest_view) = messages.iter().map(|(_, message)| message.view()).max() {
            messages.retain(|(_, message)| message.view() == highest_view);
            if let Some(instance) = &mut self.instance {
                instance.process_consensus_messages(messages, &mut self.ledger)?;
            }
        }
        Ok(())
    }

    fn start_instance(
        &mut self,
        state: VerifiedVertexStoreState,
        safety_state: SafetyState,
    ) -> Result<(), EpochManagerError> {
        let validator_set = self.epoch_change.validator_set.clone();
        Event::EnterEpoch(EnterEpochEvent {
            timestamp: SystemTime::now(),
            epoch: self.epoch_change.epoch,
            validator_set: validator_set.clone(),
        })
        .publish(&self.event_publisher);

        if !validator_set.contains(&self.config.keypair.public()) {
            log::info!(
                "Not a validator in epoch {}, running no consensus instance",
                self.epoch_change.epoch
            );
            return Ok(());
        }

        let mut instance = ConsensusInstance::new(
            &self.config,
            validator_set,
            state,
            safety_state,
            &mut self.ledger,
            self.kv_store.clone(),
            self.network.clone(),
            self.counters.clone(),
            self.event_publisher.clone(),
        )?;
        instance.start(&mut self.ledger)?;
        log::debug!(
            "Consensus instance of epoch {} started in view {}",
            instance.epoch(),
            instance.view()
        );
        self.instance = Some(instance);
        Ok(())
    }

    // The vertex store of a past epoch is never restored, so it is cleared together with the epoch switch.
    fn persist_epoch_change(&mut self, clear_vertex_store: bool) -> Result<(), EpochManagerError> {
        let mut wb = StateWriteBatch::<K::WriteBatch>::new();
        wb.set_epoch_change(&self.epoch_change)?;
        if clear_vertex_store {
            wb.delete_vertex_store_state();
        }
        self.kv_store.write(wb.into_inner());
        Ok(())
    }
}

/// Configuration of an [`EpochManager`] and of the consensus instances it runs.
#[derive(Clone)]
pub(crate) struct EpochManagerConfiguration {
    pub(crate) keypair: Keypair,
    pub(crate) pacemaker: PacemakerConfiguration,
    pub(crate) bft_sync: BftSyncConfiguration,
    pub(crate) leader_election: LeaderElectionConfiguration,

    /// Maximum number of vertices held by the vertex store while their parent is missing.
    pub(crate) pending_vertex_capacity: usize,

    /// Maximum number of proposals and votes held while the vertices they depend on are synced.
    pub(crate) sync_buffer_capacity: usize,

    /// Maximum number of proposals and votes of future epochs held.
    pub(crate) future_epoch_buffer_capacity: usize,

    /// Maximum number of vertices served in a single sync response.
    pub(crate) max_vertices_per_response: u32,
}

/// Enumerates the failures that stop a replica. Each of them is either a local storage failure or a
/// violation of an invariant that the replica cannot recover from.
#[derive(Debug)]
pub enum EpochManagerError {
    LeaderElection(LeaderElectionError),
    VertexStore(VertexStoreError),
    Pacemaker(PacemakerError),
    BftSync(BftSyncError),
    PersistenceGet(KVGetError),
    PersistenceSet(KVSetError),
}

impl From<LeaderElectionError> for EpochManagerError {
    fn from(value: LeaderElectionError) -> Self {
        EpochManagerError::LeaderElection(value)
    }
}

impl From<VertexStoreError> for EpochManagerError {
    fn from(value: VertexStoreError) -> Self {
        EpochManagerError::VertexStore(value)
    }
}

impl From<PacemakerError> for EpochManagerError {
    fn from(value: PacemakerError) -> Self {
        EpochManagerError::Pacemaker(value)
    }
}

impl From<BftSyncError> for EpochManagerError {
    fn from(value: BftSyncError) -> Self {
        EpochManagerError::BftSync(value)
    }
}

impl From<KVGetError> for EpochManagerError {
    fn from(value: KVGetError) -> Self {
        EpochManagerError::PersistenceGet(value)
    }
}

impl From<KVSetError> for EpochManagerError {
    fn from(value: KVSetError) -> Self {
        EpochManagerError::PersistenceSet(value)
    }
}
