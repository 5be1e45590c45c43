/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The persisted state of [Safety Rules](super::SafetyRules).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    pacemaker::messages::Vote,
    types::data_types::{EpochNumber, ViewNumber},
};

/// The locked view and the last vote cast by a validator in `epoch`.
///
/// # Invariant
///
/// Both `locked_view` and the view of `last_vote` never decrease within an epoch.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SafetyState {
    epoch: EpochNumber,
    locked_view: ViewNumber,
    last_vote: Option<Vote>,
}

impl SafetyState {
    /// The safety state of a validator that has not voted in `epoch` yet.
    pub fn initial(epoch: EpochNumber) -> Self {
        Self {
            epoch,
            locked_view: ViewNumber::genesis(),
            last_vote: None,
        }
    }

    pub fn epoch(&self) -> EpochNumber {
        self.epoch
    }

    pub fn locked_view(&self) -> ViewNumber {
        self.locked_view
    }

    pub fn last_vote(&self) -> Option<&Vote> {
        self.last_vote.as_ref()
    }

    /// Get the view of the last vote, or the genesis view if no vote has been cast in this epoch.
    pub fn last_voted_view(&self) -> ViewNumber {
        self.last_vote
            .as_ref()
            .map(|vote| vote.view())
            .unwrap_or(ViewNumber::genesis())
    }

    pub(super) fn with_locked_view(self, locked_view: ViewNumber) -> Self {
        Self {
            locked_view,
            ..self
        }
    }

    pub(super) fn with_last_vote(self, last_vote: Vote) -> Self {
        Self {
            last_vote: Some(last_vote),
            ..self
        }
    }
}
