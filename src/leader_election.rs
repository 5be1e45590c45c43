/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic, power-weighted election of the proposer of each view.
//!
//! ## Weighted round robin
//!
//! Leader election is a sequence of "rounds", one per view, that run over a vector of credits (one
//! credit per validator, all starting at zero in view 0). In every round:
//! 1. Every validator's credit is increased by its power.
//! 2. The validator with the highest credit is selected as the proposer of the round's view. Ties are
//!    broken in favour of the validator that comes first in the
//!    [ordering of validators](crate::types::validator_set::ValidatorSet#ordering-of-validators).
//! 3. The selected validator's credit is reduced by the total power of the validator set.
//!
//! Over any `total_power` consecutive views, each validator is selected exactly `power` times. If all
//! validators have the same power, the schedule degenerates into plain round robin in key order.
//!
//! ## Caching
//!
//! Computing the proposer of view `v` from scratch takes `v` rounds. To serve lookups for arbitrary
//! views cheaply, [`LeaderElection`] keeps:
//! - A cursor: the credits at the start of the highest view computed so far.
//! - Checkpoints: snapshots of the credits at the start of every `checkpoint_interval`-th view, kept in a
//!   bounded least-recently-used cache.
//! - A bounded window of recently computed proposers.
//!
//! A lookup that misses the window restarts the rounds from the nearest usable starting point (the
//! cursor, or the highest cached checkpoint at or below the view, or the all-zero credits of view 0).
//! Since rounds are deterministic, the answer never depends on what is cached.

use std::collections::{HashMap, VecDeque};

use typed_builder::TypedBuilder;

use crate::types::{
    crypto_primitives::VerifyingKey, data_types::ViewNumber, validator_set::ValidatorSet,
};

/// Sizes of the caches kept by [`LeaderElection`].
#[derive(Clone, Copy, Debug, TypedBuilder)]
pub struct LeaderElectionConfiguration {
    #[builder(default = 64, setter(doc = "Set the number of views between two checkpoints of the credits."))]
    pub checkpoint_interval: u64,

    #[builder(default = 16, setter(doc = "Set the maximum number of checkpoints kept in the least-recently-used cache."))]
    pub checkpoint_capacity: usize,

    #[builder(default = 128, setter(doc = "Set the number of recently computed proposers to remember."))]
    pub recent_proposers_capacity: usize,
}

impl Default for LeaderElectionConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LeaderElectionError {
    EmptyValidatorSet,
    ZeroTotalPower,
}

/// Credits of every validator, indexed by their position in the validator set.
type Credits = Vec<i128>;

pub struct LeaderElection {
    validator_set: ValidatorSet,
    validators: Vec<VerifyingKey>,
    powers: Vec<i128>,
    total_power: i128,
    config: LeaderElectionConfiguration,

    // Credits at the start of `cursor_view`.
    cursor_view: ViewNumber,
    cursor: Credits,

    checkpoints: HashMap<u64, Credits>,
    checkpoints_lru: VecDeque<u64>,

    recent_proposers: HashMap<ViewNumber, usize>,
    recent_proposers_order: VecDeque<ViewNumber>,
}

impl LeaderElection {
    pub fn new(
        validator_set: ValidatorSet,
        config: LeaderElectionConfiguration,
    ) -> Result<LeaderElection, LeaderElectionError> {
        if validator_set.is_empty() {
            return Err(LeaderElectionError::EmptyValidatorSet);
        }
        let (validators, powers): (Vec<VerifyingKey>, Vec<i128>) = validator_set
            .validators_and_powers()
            .into_iter()
            .map(|(validator, power)| (validator, power.int() as i128))
            .unzip();
        let total_power: i128 = powers.iter().sum();
        if total_power == 0 {
            return Err(LeaderElectionError::ZeroTotalPower);
        }

        let initial_credits = vec![0; powers.len()];
        Ok(LeaderElection {
            validator_set,
            validators,
            powers,
            total_power,
            config: LeaderElectionConfiguration {
                checkpoint_interval: config.checkpoint_interval.max(1),
                ..config
            },
            cursor_view: ViewNumber::genesis(),
            cursor: initial_credits,
            checkpoints: HashMap::new(),
            checkpoints_lru: VecDeque::new(),
            recent_proposers: HashMap::new(),
            recent_proposers_order: VecDeque::new(),
        })
    }

    pub fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    /// Get the proposer of `view`.
    pub fn proposer(&mut self, view: ViewNumber) -> VerifyingKey {
        if let Some(pos) = self.recent_proposers.get(&view) {
            return self.validator_at(*pos);
        }

        let (mut current_view, mut credits) = self.starting_point(view);
        let mut selected = 0;
        while current_view <= view {
            if current_view.int() % self.config.checkpoint_interval == 0 {
                self.put_checkpoint(current_view.int(), &credits);
            }
            selected = self.round(&mut credits);
            self.remember_proposer(current_view, selected);
            current_view = current_view.next();
        }

        if current_view > self.cursor_view {
            self.cursor_view = current_view;
            self.cursor = credits;
        }

        self.validator_at(selected)
    }

    /// Check whether `validator` is the proposer of `view`.
    pub fn is_proposer(&mut self, view: ViewNumber, validator: &VerifyingKey) -> bool {
        &self.proposer(view) == validator
    }

    // Find the closest view at or below `view` whose credits are known, without modifying the cache
    // order of checkpoints that are not chosen.
    fn starting_point(&mut self, view: ViewNumber) -> (ViewNumber, Credits) {
        if self.cursor_view <= view {
            return (self.cursor_view, self.cursor.clone());
        }

        let best_checkpoint = self
            .checkpoints
            .keys()
            .filter(|checkpoint| **checkpoint <= view.int())
            .max()
            .copied();
        match best_checkpoint {
            Some(checkpoint) => {
                self.touch_checkpoint(checkpoint);
                let credits = self.checkpoints[&checkpoint].clone();
                (ViewNumber::new(checkpoint), credits)
            }
            None => (ViewNumber::genesis(), vec![0; self.powers.len()]),
        }
    }

    // Run one round over `credits`, returning the position of the selected validator.
    fn round(&self, credits: &mut Credits) -> usize {
        let mut selected = 0;
        for (pos, power) in self.powers.iter().enumerate() {
            credits[pos] += power;
            if credits[pos] > credits[selected] {
                selected = pos;
            }
        }
        credits[selected] -= self.total_power;
        selected
    }

    fn put_checkpoint(&mut self, checkpoint: u64, credits: &Credits) {
        if self.checkpoints.contains_key(&checkpoint) {
            self.touch_checkpoint(checkpoint);
            return;
        }
        if self.checkpoints.len() >= self.config.checkpoint_capacity {
            if let Some(evicted) = self.checkpoints_lru.pop_front() {
                self.checkpoints.remove(&evicted);
            }
        }
        if self.config.checkpoint_capacity > 0 {
            self.checkpoints.insert(checkpoint, credits.clone());
            self.checkpoints_lru.push_back(checkpoint);
        }
    }

    fn touch_checkpoint(&mut self, checkpoint: u64) {
        if let Some(pos) = self.checkpoints_lru.iter().position(|c| *c == checkpoint) {
            self.checkpoints_lru.remove(pos);
            self.checkpoints_lru.push_back(checkpoint);
        }
    }

    fn remember_proposer(&mut self, view: ViewNumber, pos: usize) {
        if self.config.recent_proposers_capacity == 0 || self.recent_proposers.contains_key(&view) {
            return;
        }
        if self.recent_proposers.len() >= self.config.recent_proposers_capacity {
            if let Some(evicted) = self.recent_proposers_order.pop_front() {
                self.recent_proposers.remove(&evicted);
            }
        }
        self.recent_proposers.insert(view, pos);
        self.recent_proposers_order.push_back(view);
    }

    fn validator_at(&self, pos: usize) -> VerifyingKey {
        self.validators[pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{crypto_primitives::SigningKey, data_types::Power};
    use rand_core::OsRng;

    fn validator_set(powers: &[u64]) -> ValidatorSet {
        let mut csprg = OsRng {};
        ValidatorSet::from_powers(
            powers
                .iter()
                .map(|power| (SigningKey::generate(&mut csprg).verifying_key(), Power::new(*power))),
        )
    }

    fn sequential_schedule(validator_set: &ValidatorSet, views: u64) -> Vec<VerifyingKey> {
        let mut leader_election = LeaderElection::new(
            validator_set.clone(),
            LeaderElectionConfiguration::default(),
        )
        .unwrap();
        (0..views)
            .map(|v| leader_election.proposer(ViewNumber::new(v)))
            .collect()
    }

    /// Tests if the number of times each validator is selected as a leader is proportional to its power.
    #[test]
    fn proposer_fairness_test() {
        let powers: Vec<u64> = (1..=20).collect();
        let validator_set = validator_set(&powers);
        let total_power = validator_set.total_power().int() as u64;

        let schedule = sequential_schedule(&validator_set, total_power);
        validator_set.validators().for_each(|validator| {
            assert_eq!(
                schedule.iter().filter(|leader| leader == &validator).count(),
                validator_set.power(validator).unwrap().int() as usize
            )
        })
    }

    #[test]
    fn equal_powers_degenerate_to_round_robin() {
        let validator_set = validator_set(&[5, 5, 5, 5]);
        let schedule = sequential_schedule(&validator_set, 12);
        let in_key_order: Vec<VerifyingKey> = validator_set.validators().copied().collect();
        for (view, leader) in schedule.iter().enumerate() {
            assert_eq!(leader, &in_key_order[view % 4]);
        }

        let mut leader_election =
            LeaderElection::new(validator_set, LeaderElectionConfiguration::default()).unwrap();
        assert!(leader_election.is_proposer(ViewNumber::new(5), &in_key_order[1]));
        assert!(!leader_election.is_proposer(ViewNumber::new(5), &in_key_order[2]));
    }

    #[test]
    fn skipping_lookups_match_sequential_computation() {
        let validator_set = validator_set(&[1, 2, 3, 7, 11]);
        let expected = sequential_schedule(&validator_set, 2000);

        // 1. Jump far ahead first, then look back, with tiny caches so that checkpoints and recent
        //    proposers are evicted many times.
        let config = LeaderElectionConfiguration::builder()
            .checkpoint_interval(16)
            .checkpoint_capacity(3)
            .recent_proposers_capacity(8)
            .build();
        let mut leader_election = LeaderElection::new(validator_set.clone(), config).unwrap();
        for view in [1999, 5, 1500, 1000, 17, 0, 64, 1999, 333, 1234, 700] {
            assert_eq!(
                leader_election.proposer(ViewNumber::new(view)),
                expected[view as usize],
                "mismatch at view {}",
                view
            );
        }

        // 2. Every view, in reverse order.
        for view in (0..2000).rev() {
            assert_eq!(
                leader_election.proposer(ViewNumber::new(view)),
                expected[view as usize]
            );
        }
        assert!(leader_election.checkpoints.len() <= 3);
        assert!(leader_election.recent_proposers.len() <= 8);
    }

    #[test]
    fn empty_validator_set_is_rejected() {
        assert_eq!(
            LeaderElection::new(ValidatorSet::new(), LeaderElectionConfiguration::default()).err(),
            Some(LeaderElectionError::EmptyValidatorSet)
        );
    }
}
