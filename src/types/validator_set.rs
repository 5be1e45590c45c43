/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The set of validators that run consensus in a given epoch, and their voting powers.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::HashMap, slice};

use super::{
    crypto_primitives::{SignatureError, VerifyingKey},
    data_types::{Power, TotalPower, VerifyingKeyBytes},
};

/// Stores the identities of validators and their voting powers.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `VerifyingKey`s, and avails the methods [`validators`](ValidatorSet::validators),
/// [`validators_and_powers`](ValidatorSet::validators_and_powers), and
/// [`position`](ValidatorSet::position) that users can use to get them in this order.
///
/// This order is the fixed comparator that every replica uses wherever ties need to be broken
/// deterministically (e.g., in [leader election](crate::leader_election)), and is also the order in
/// which signatures appear in certificates.
///
/// ## Limits to total power
///
/// Users must make sure that the total power of the validator set does not exceed `u128::MAX/2`.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl Default for ValidatorSet {
    // Create an empty validator set.
    fn default() -> Self {
        ValidatorSet::new()
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.validators_and_powers()
                    .iter()
                    .map(|(validator, power)| (validator.to_bytes()[..4].to_vec(), power.int())),
            )
            .finish()
    }
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Create a validator set containing the given `validators` with their respective powers.
    pub fn from_powers(validators: impl IntoIterator<Item = (VerifyingKey, Power)>) -> ValidatorSet {
        let mut validator_set = ValidatorSet::new();
        for (validator, power) in validators {
            validator_set.put(&validator, power);
        }
        validator_set
    }

    /// Put a `validator` with the specified `power` into the validator set, placing them in a position that
    /// preserves the [ordering of validators](Self#ordering-of-validators).
    ///
    /// If `validator` already exists in the validator set, this function updates its power instead.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) {
        let validator_bytes = validator.to_bytes();
        if let Err(insert_pos) = self
            .validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
        {
            self.validators.insert(insert_pos, *validator);
        }

        self.powers.insert(*validator, power);
    }

    /// Remove `validator` from the validator set, if it actually is in the validator set.
    ///
    /// If a validator is removed, then its `VerifyingKey` is returned with its power in the validator set
    /// before the removal. If a validator is not removed, then this function will return `None`.
    pub fn remove(&mut self, validator: &VerifyingKey) -> Option<(VerifyingKey, Power)> {
        let validator_bytes = validator.to_bytes();
        if let Ok(pos) = self
            .validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
        {
            self.validators.remove(pos);
            self.powers.remove_entry(validator)
        } else {
            None
        }
    }

    /// Get the power of the specified `validator` inside the validator set.
    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.powers.get(validator)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.powers.contains_key(validator)
    }

    /// Check whether the validator set contains a validator whose verifying key serializes to `validator`.
    pub fn contains_bytes(&self, validator: &VerifyingKeyBytes) -> bool {
        self.position_of_bytes(validator).is_some()
    }

    /// Get an iterator through validators' verifying keys which walks through them in ascending order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get a vector containing each validator and its power, in ascending order of the validators' verifying keys.
    pub fn validators_and_powers(&self) -> Vec<(VerifyingKey, Power)> {
        self.validators
            .iter()
            .filter_map(|v| self.power(v).map(|power| (*v, *power)))
            .collect()
    }

    /// Get the validator at position `pos` in the [sorted order](Self#ordering-of-validators).
    pub fn validator_at(&self, pos: usize) -> Option<&VerifyingKey> {
        self.validators.get(pos)
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the index of the given `validator` in the [sorted order](Self#ordering-of-validators) of
    /// `VerifyingKey`s in the validator set, if it is actually in the validator set.
    pub fn position(&self, validator: &VerifyingKey) -> Option<usize> {
        self.position_of_bytes(&validator.to_bytes())
    }

    /// Same as [`position`](Self::position), but identifies the validator by its bytes.
    pub fn position_of_bytes(&self, validator: &VerifyingKeyBytes) -> Option<usize> {
        self.validators
            .binary_search_by(|v| v.to_bytes().cmp(validator))
            .ok()
    }

    /// Compute the total power that a certificate must match or exceed (`>=`) in order to count as a quorum
    /// under the validator set, i.e., strictly more than two-thirds of the total power.
    pub fn quorum(&self) -> TotalPower {
        quorum(self.total_power())
    }
}

/// Compute the minimum voting power that a certificate produced by a validator set with
/// `validator_set_power` total power must contain in order for it to correspond to a "quorum" of
/// validators.
///
/// "Minimum" here is understood in the inclusive sense, a certificate corresponds to a quorum if its power
/// is **greater than or equal** to the return value of `quorum`. Every replica in a network must apply
/// exactly this rounding.
pub fn quorum(validator_set_power: TotalPower) -> TotalPower {
    TotalPower::new(validator_set_power.int().saturating_mul(2) / 3 + 1)
}

/// Intermediate representation of [`ValidatorSet`] for safe serialization and deserialization.
///
/// To serialize an instance of `ValidatorSet`, convert it a `ValidatorSetBytes` using the former type's
/// implementation of `From<&ValidatorSet>`, then, serialize the `ValidatorSetBytes` using Borsh.
/// Reverse the steps to deserialize a `ValidatorSet`.
///
/// ## Rationale
///
/// This type exists because [`ed25519_dalek::VerifyingKey`] does not implement the Borsh traits.
/// Instances of this type are not guaranteed to contain "valid" Ed25519 verifying keys, and therefore
/// conversion from this type into `ValidatorSet` using `TryFrom` is fallible.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ValidatorSetBytes {
    // Validators and their powers, in ascending order of the verifying keys.
    validators: Vec<(VerifyingKeyBytes, Power)>,
}

impl TryFrom<ValidatorSetBytes> for ValidatorSet {
    type Error = SignatureError;

    fn try_from(value: ValidatorSetBytes) -> Result<Self, Self::Error> {
        let mut validator_set = ValidatorSet::new();
        for (validator_bytes, power) in value.validators {
            validator_set.put(&VerifyingKey::from_bytes(&validator_bytes)?, power);
        }
        Ok(validator_set)
    }
}

impl From<&ValidatorSet> for ValidatorSetBytes {
    fn from(value: &ValidatorSet) -> Self {
        ValidatorSetBytes {
            validators: value
                .validators_and_powers()
                .into_iter()
                .map(|(validator, power)| (validator.to_bytes(), power))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::crypto_primitives::SigningKey;
    use rand_core::OsRng;

    #[test]
    fn validators_are_kept_in_ascending_key_order() {
        let mut csprg = OsRng {};
        let keys: Vec<VerifyingKey> = (0..8)
            .map(|_| SigningKey::generate(&mut csprg).verifying_key())
            .collect();
        let validator_set = ValidatorSet::from_powers(keys.iter().map(|k| (*k, Power::new(1))));

        let ordered: Vec<[u8; 32]> = validator_set.validators().map(|v| v.to_bytes()).collect();
        let mut sorted = ordered.clone();
        sorted.sort();
        assert_eq!(ordered, sorted);

        for key in &keys {
            let pos = validator_set.position(key).unwrap();
            assert_eq!(validator_set.validator_at(pos), Some(key));
        }
    }

    #[test]
    fn debug_lists_key_prefixes_and_powers() {
        let mut csprg = OsRng {};
        let key = SigningKey::generate(&mut csprg).verifying_key();
        let validator_set = ValidatorSet::from_powers([(key, Power::new(7))]);

        let prefix = key.to_bytes()[..4].to_vec();
        assert_eq!(format!("{:?}", validator_set), format!("[({:?}, 7)]", prefix));
        assert_eq!(format!("{:?}", ValidatorSet::new()), "[]");
    }

    #[test]
    fn quorum_is_strictly_more_than_two_thirds() {
        assert_eq!(quorum(TotalPower::new(4)).int(), 3);
        assert_eq!(quorum(TotalPower::new(3)).int(), 3);
        assert_eq!(quorum(TotalPower::new(6)).int(), 5);
        assert_eq!(quorum(TotalPower::new(100)).int(), 67);
        assert_eq!(quorum(TotalPower::new(1)).int(), 1);
    }

    #[test]
    fn validator_set_bytes_conversion_preserves_powers() {
        let mut csprg = OsRng {};
        let validator_set = ValidatorSet::from_powers(
            (1..=4).map(|p| (SigningKey::generate(&mut csprg).verifying_key(), Power::new(p))),
        );
        let bytes = ValidatorSetBytes::from(&validator_set);
        let restored = ValidatorSet::try_from(bytes).unwrap();
        assert_eq!(restored, validator_set);
        assert_eq!(restored.total_power().int(), 10);
    }
}
