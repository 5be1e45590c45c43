/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable [`Network`] trait.

use ed25519_dalek::VerifyingKey;

use crate::types::validator_set::ValidatorSet;

use super::messages::Message;

/// A peer-to-peer network in which every peer is reachable by its verifying key.
///
/// Delivery may be unordered, duplicated, or lossy: the consensus core tolerates all three.
pub trait Network: Clone + Send {
    /// Inform the network provider of the validator set on wake-up.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Inform the network provider of the validator set of a newly started epoch.
    fn update_validator_set(&mut self, validator_set: ValidatorSet);

    /// Send a message to all peers (including self and listeners) without blocking.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}

/// Handle for informing the network provider about epoch changes.
///
/// The network provider may want to know the validator set of a new epoch, for example, to establish
/// connections to validators that joined.
#[derive(Clone)]
pub(crate) struct ValidatorSetUpdateHandle<N: Network> {
    network: N,
}

impl<N: Network> ValidatorSetUpdateHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn update_validator_set(&mut self, validator_set: ValidatorSet) {
        self.network.update_validator_set(validator_set)
    }
}
