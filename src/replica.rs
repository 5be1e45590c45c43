/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! A replica is one process taking part in consensus, uniquely identified by an
//! [Ed25519 verifying key](ed25519_dalek::VerifyingKey). Replicas that are members of the validator set
//! of the current epoch propose and vote ("validators"). Other replicas merely follow the decisions of
//! the validators ("listeners"). A replica can move between the two roles at every epoch change.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [`ReplicaSpec`],
//! - The function to [start](ReplicaSpec::start) a [`Replica`] given its specification,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let configuration = Configuration::builder()
//!     .me(signing_key)
//!     .base_timeout(Duration::from_millis(500))
//!     .timeout_rate(1.2)
//!     .max_timeout_exponent(6)
//!     .sync_patience(Duration::from_millis(200))
//!     .sync_request_rate(50.0)
//!     .log_events(true)
//!     .build();
//!
//! let replica = ReplicaSpec::builder()
//!     .network(network)
//!     .ledger(ledger)
//!     .kv_store(kv_store)
//!     .configuration(configuration)
//!     .initial_epoch(initial_epoch)
//!     .on_commit_vertex(commit_handler)
//!     .build()
//!     .start();
//! ```
//!
//! ## Threads
//!
//! A running replica owns up to three threads:
//! 1. The poller, which moves messages from the [`Network`] into a channel.
//! 2. The algorithm thread, which runs the [Epoch Manager](crate::epoch_manager) and every component
//!    it owns. All consensus state is confined to this thread.
//! 3. The [event bus](crate::event_bus), started only if event handlers were registered or
//!    `log_events` is set.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

use crate::bft_sync::implementation::BftSyncConfiguration;
use crate::counters::SystemCounters;
use crate::epoch_manager::implementation::{EpochManager, EpochManagerConfiguration};
use crate::event_bus::*;
use crate::events::*;
use crate::leader_election::LeaderElectionConfiguration;
use crate::ledger::{EpochChange, Ledger};
use crate::networking::network::Network;
use crate::networking::receiving::{start_polling, MessageReceiveError, MessageStub};
use crate::pacemaker::implementation::PacemakerConfiguration;
use crate::pacemaker::timeout::ExponentialTimeout;
use crate::persistence::pluggables::KVStore;
use crate::types::crypto_primitives::Keypair;

// Longest time the algorithm thread waits for a message before checking sync deadlines and the ledger.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Stores the user-defined parameters required to start the replica.
///
/// ## Timeouts
///
/// A view entered `n` views after the last commit (beyond the three views a commit always takes) lasts
/// `base_timeout * timeout_rate^min(n, max_timeout_exponent)`.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a
/// [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.base_timeout(...)`
    - `.timeout_rate(...)`
    - `.max_timeout_exponent(...)`
    - `.sync_patience(...)`
    - `.sync_request_rate(...)`
    - `.log_events(...)`

    Optional:
    - `.sync_max_attempts(...)`
    - `.pending_vertex_capacity(...)`
    - `.sync_buffer_capacity(...)`
    - `.future_epoch_buffer_capacity(...)`
    - `.max_vertices_per_response(...)`
    - `.leader_election(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's signing key, used to sign proposals and votes. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the timeout of a view entered right after a commit. Required."))]
    pub base_timeout: Duration,
    #[builder(setter(doc = "Set the factor by which the timeout grows for every view without a commit. Values below 1.0 are treated as 1.0. Required."))]
    pub timeout_rate: f64,
    #[builder(setter(doc = "Set the number of views without a commit after which the timeout stops growing. Required."))]
    pub max_timeout_exponent: u32,
    #[builder(setter(doc = "Set how long to wait for a sync response before asking another peer. Required."))]
    pub sync_patience: Duration,
    #[builder(setter(doc = "Set the maximum number of sync requests sent per second. Required."))]
    pub sync_request_rate: f64,
    #[builder(default = 3, setter(doc = "Set the number of times a sync request is sent before it is abandoned. Optional, defaults to 3."))]
    pub sync_max_attempts: u32,
    #[builder(default = 64, setter(doc = "Set the maximum number of received vertices held while their parent is missing. Optional, defaults to 64."))]
    pub pending_vertex_capacity: usize,
    #[builder(default = 512, setter(doc = "Set the maximum number of proposals and votes held while the vertices they depend on are synced. Optional, defaults to 512."))]
    pub sync_buffer_capacity: usize,
    #[builder(default = 1024, setter(doc = "Set the maximum number of proposals and votes of future epochs held. Optional, defaults to 1024."))]
    pub future_epoch_buffer_capacity: usize,
    #[builder(default = 64, setter(doc = "Set the maximum number of vertices served in a single sync response. Optional, defaults to 64."))]
    pub max_vertices_per_response: u32,
    #[builder(default, setter(doc = "Set the cache sizes of leader election. Optional."))]
    pub leader_election: LeaderElectionConfiguration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<Configuration> for EpochManagerConfiguration {
    fn from(config: Configuration) -> Self {
        let keypair = Keypair::new(config.me);
        let pacemaker = PacemakerConfiguration {
            keypair: keypair.clone(),
            timeout: ExponentialTimeout::new(
                config.base_timeout,
                config.timeout_rate,
                config.max_timeout_exponent,
            ),
        };
        let bft_sync = BftSyncConfiguration {
            me: keypair.public(),
            patience: config.sync_patience,
            request_rate: config.sync_request_rate,
            max_attempts: config.sync_max_attempts,
        };
        EpochManagerConfiguration {
            keypair,
            pacemaker,
            bft_sync,
            leader_election: config.leader_election,
            pending_vertex_capacity: config.pending_vertex_capacity,
            sync_buffer_capacity: config.sync_buffer_capacity,
            future_epoch_buffer_capacity: config.future_epoch_buffer_capacity,
            max_vertices_per_response: config.max_vertices_per_response,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Replica`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.network(...)`
    - `.ledger(...)`
    - `.kv_store(...)`
    - `.configuration(...)`
    - `.initial_epoch(...)`

    Optional: one `.on_*(...)` setter per event in [crate::events].
"))]
pub struct ReplicaSpec<N: Network + 'static, K: KVStore, L: Ledger> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the ledger whose input is decided by consensus. The argument must implement the [Ledger](crate::ledger::Ledger) trait. Required."))]
    ledger: L,
    #[builder(setter(doc = "Set the implementation of the replica's Key-Value store. The argument must implement the [KVStore](crate::persistence::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    #[builder(setter(doc = "Set the epoch that the replica starts in, unless a later epoch was persisted in the Key-Value store. Required."))]
    initial_epoch: EpochChange,

    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&InsertVertexEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertVertexEvent>),
    doc = "Register a handler closure to be invoked after a vertex is inserted into the vertex store. Optional."))]
    on_insert_vertex: Option<HandlerPtr<InsertVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitVertexEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitVertexEvent>),
    doc = "Register a handler closure to be invoked after a vertex is committed. Optional."))]
    on_commit_vertex: Option<HandlerPtr<CommitVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PruneVertexEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PruneVertexEvent>),
    doc = "Register a handler closure to be invoked after a vertex that conflicts with a committed vertex is removed. Optional."))]
    on_prune_vertex: Option<HandlerPtr<PruneVertexEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateHighQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateHighQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its highest QC. Optional."))]
    on_update_high_qc: Option<HandlerPtr<UpdateHighQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockedViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockedViewEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its locked view. Optional."))]
    on_update_locked_view: Option<HandlerPtr<UpdateLockedViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EnterEpochEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EnterEpochEvent>),
    doc = "Register a handler closure to be invoked after the replica enters an epoch. Optional."))]
    on_enter_epoch: Option<HandlerPtr<EnterEpochEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica votes for a proposal. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TimeoutVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TimeoutVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a timeout vote. Optional."))]
    on_timeout_vote: Option<HandlerPtr<TimeoutVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a valid proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a valid vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a view. Optional."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's view times out. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a quorum certificate. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectTCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectTCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a timeout certificate. Optional."))]
    on_collect_tc: Option<HandlerPtr<CollectTCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica requests vertices from a peer. Optional."))]
    on_start_sync: Option<HandlerPtr<StartSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndSyncEvent>),
    doc = "Register a handler closure to be invoked after the replica finishes syncing to a vertex. Optional."))]
    on_end_sync: Option<HandlerPtr<EndSyncEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSyncRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSyncRequestEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a sync request from a peer. Optional."))]
    on_receive_sync_request: Option<HandlerPtr<ReceiveSyncRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendSyncResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendSyncResponseEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a sync response to a peer. Optional."))]
    on_send_sync_response: Option<HandlerPtr<SendSyncResponseEvent>>,
}

impl<N: Network + 'static, K: KVStore, L: Ledger> ReplicaSpec<N, K, L> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [`Replica`] struct.
    pub fn start(mut self) -> Replica {
        let log_events = self.configuration.log_events;
        let event_handlers = self.event_handlers(log_events);

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, messages) = start_polling(self.network.clone(), poller_shutdown_receiver);

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let counters = SystemCounters::new();
        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = start_algorithm(
            self.configuration.into(),
            self.initial_epoch,
            self.ledger,
            self.kv_store,
            self.network,
            MessageStub::new(messages),
            counters.clone(),
            event_publisher,
            algorithm_shutdown_receiver,
        );

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus =
                    start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
                (Some(event_bus), Some(event_bus_shutdown))
            }
            None => (None, None),
        };

        Replica {
            counters,
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }

    fn event_handlers(&mut self, log_events: bool) -> EventHandlers {
        let mut handlers = EventHandlers::default();
        if log_events {
            handlers.add_loggers();
        }

        handlers.insert_vertex_handlers.extend(self.on_insert_vertex.take());
        handlers.commit_vertex_handlers.extend(self.on_commit_vertex.take());
        handlers.prune_vertex_handlers.extend(self.on_prune_vertex.take());
        handlers.update_high_qc_handlers.extend(self.on_update_high_qc.take());
        handlers
            .update_locked_view_handlers
            .extend(self.on_update_locked_view.take());
        handlers.enter_epoch_handlers.extend(self.on_enter_epoch.take());
        handlers.propose_handlers.extend(self.on_propose.take());
        handlers.vote_handlers.extend(self.on_vote.take());
        handlers.timeout_vote_handlers.extend(self.on_timeout_vote.take());
        handlers
            .receive_proposal_handlers
            .extend(self.on_receive_proposal.take());
        handlers.receive_vote_handlers.extend(self.on_receive_vote.take());
        handlers.start_view_handlers.extend(self.on_start_view.take());
        handlers.view_timeout_handlers.extend(self.on_view_timeout.take());
        handlers.collect_qc_handlers.extend(self.on_collect_qc.take());
        handlers.collect_tc_handlers.extend(self.on_collect_tc.take());
        handlers.start_sync_handlers.extend(self.on_start_sync.take());
        handlers.end_sync_handlers.extend(self.on_end_sync.take());
        handlers
            .receive_sync_request_handlers
            .extend(self.on_receive_sync_request.take());
        handlers
            .send_sync_response_handlers
            .extend(self.on_send_sync_response.take());

        handlers
    }
}

/// Spawn the algorithm thread, which owns the [`EpochManager`] and feeds it messages and deadlines
/// until it is shut down or fails.
#[allow(clippy::too_many_arguments)]
fn start_algorithm<N: Network + 'static, K: KVStore, L: Ledger>(
    config: EpochManagerConfiguration,
    initial_epoch: EpochChange,
    ledger: L,
    kv_store: K,
    network: N,
    messages: MessageStub,
    counters: SystemCounters,
    event_publisher: Option<Sender<Event>>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut epoch_manager = match EpochManager::new(
            config,
            initial_epoch,
            ledger,
            kv_store,
            network,
            counters,
            event_publisher,
        ) {
            Ok(epoch_manager) => epoch_manager,
            Err(err) => {
                log::error!("Failed to restore the replica's state: {:?}", err);
                return;
            }
        };
        if let Err(err) = epoch_manager.start() {
            log::error!("Failed to start consensus: {:?}", err);
            return;
        }

        loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    log::error!("Algorithm thread disconnected from main thread");
                    return;
                }
            }

            let next_tick = Instant::now() + TICK_INTERVAL;
            let deadline = epoch_manager
                .deadline()
                .map_or(next_tick, |deadline| deadline.min(next_tick));

            let result = match messages.recv(deadline) {
                Ok((origin, message)) => epoch_manager.process_message(origin, message),
                Err(MessageReceiveError::Timeout) => Ok(()),
                Err(MessageReceiveError::Disconnected) => {
                    log::error!("Algorithm thread disconnected from the poller");
                    return;
                }
            };
            if let Err(err) = result.and_then(|()| epoch_manager.tick()) {
                log::error!(
                    "Halting consensus in epoch {}: {:?}",
                    epoch_manager.epoch(),
                    err
                );
                return;
            }
        }
    })
}

/// A handle to the background threads of a replica. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Replica {
    counters: SystemCounters,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Get the [system counters](crate::counters) of the replica, which are updated live by the
    /// algorithm thread.
    pub fn counters(&self) -> &SystemCounters {
        &self.counters
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The algorithm thread receives messages from the poller, so the poller is stopped last.
        // Send errors mean the receiving thread already exited.

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}
