/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable persistence of consensus state.

use std::fmt::Display;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    ledger::{EpochChange, EpochChangeBytes},
    safety_rules::state::SafetyState,
    types::{crypto_primitives::SignatureError, vertex::VerifiedVertexStoreState},
};

use super::variables;

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Safety State ↓↓↓ */

    fn safety_state(&self) -> Result<Option<SafetyState>, KVGetError> {
        if let Some(bytes) = self.get(&variables::SAFETY_STATE) {
            let safety_state = SafetyState::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::SafetyState,
                    source: err,
                }
            })?;
            Ok(Some(safety_state))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Vertex Store State ↓↓↓ */

    fn vertex_store_state(&self) -> Result<Option<VerifiedVertexStoreState>, KVGetError> {
        if let Some(bytes) = self.get(&variables::VERTEX_STORE_STATE) {
            let state = VerifiedVertexStoreState::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::VertexStoreState,
                    source: err,
                }
            })?;
            Ok(Some(state))
        } else {
            Ok(None)
        }
    }

    /* ↓↓↓ Epoch Change ↓↓↓ */

    fn epoch_change(&self) -> Result<Option<EpochChange>, KVGetError> {
        if let Some(bytes) = self.get(&variables::EPOCH_CHANGE) {
            let epoch_change_bytes =
                EpochChangeBytes::deserialize(&mut &*bytes).map_err(|err| {
                    KVGetError::DeserializeValueError {
                        key: Key::EpochChange,
                        source: err,
                    }
                })?;
            let epoch_change = EpochChange::try_from(epoch_change_bytes).map_err(|err| {
                KVGetError::Ed25519DalekError {
                    key: Key::EpochChange,
                    source: err,
                }
            })?;
            Ok(Some(epoch_change))
        } else {
            Ok(None)
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// A [`WriteBatch`] wrapper that forms the keys of consensus state variables and serializes their
/// values.
pub struct StateWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> StateWriteBatch<W> {
    pub fn new() -> StateWriteBatch<W> {
        StateWriteBatch(W::new())
    }

    pub fn set_safety_state(&mut self, safety_state: &SafetyState) -> Result<(), KVSetError> {
        self.0.set(
            &variables::SAFETY_STATE,
            &safety_state
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::SafetyState,
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn set_vertex_store_state(
        &mut self,
        state: &VerifiedVertexStoreState,
    ) -> Result<(), KVSetError> {
        self.0.set(
            &variables::VERTEX_STORE_STATE,
            &state
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::VertexStoreState,
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn delete_vertex_store_state(&mut self) {
        self.0.delete(&variables::VERTEX_STORE_STATE)
    }

    pub fn set_epoch_change(&mut self, epoch_change: &EpochChange) -> Result<(), KVSetError> {
        self.0.set(
            &variables::EPOCH_CHANGE,
            &EpochChangeBytes::from(epoch_change)
                .try_to_vec()
                .map_err(|err| KVSetError::SerializeValueError {
                    key: Key::EpochChange,
                    source: err,
                })?,
        );
        Ok(())
    }

    /// Get the underlying `WriteBatch`, ready to be passed to [`KVStore::write`].
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: WriteBatch> Default for StateWriteBatch<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error arises when the value corresponding to a given key cannot be deserialized into its
/// expected type.
#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
    Ed25519DalekError { key: Key, source: SignatureError },
}

/// Error when trying to serialize a value into a [`WriteBatch`].
#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}

#[derive(Debug)]
pub enum Key {
    SafetyState,
    VertexStoreState,
    EpochChange,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::SafetyState => write!(f, "Safety State"),
            Key::VertexStoreState => write!(f, "Vertex Store State"),
            Key::EpochChange => write!(f, "Epoch Change"),
        }
    }
}
