/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number that identifies an epoch, i.e., a period of consensus run by one fixed validator set.
///
/// Every message exchanged by the consensus core is tagged with the epoch it belongs to, and the
/// [Epoch Manager](crate::epoch_manager) routes messages by this number.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct EpochNumber(u64);

impl EpochNumber {
    /// Create a new `EpochNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` of this `EpochNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the epoch that directly follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for EpochNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// View number. Starts at 0 (the genesis view) at the start of every epoch, and increases as views
/// are completed by a quorum certificate or a timeout certificate.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the genesis `ViewNumber`, which is 0.
    pub const fn genesis() -> Self {
        Self(0)
    }

    /// Check whether this is the genesis view.
    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    /// Get the inner `u64` of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the view that directly follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the view that directly precedes this one, saturating at genesis.
    pub const fn previous(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.add(rhs))
    }
}

impl Sub<ViewNumber> for ViewNumber {
    type Output = u64;

    /// Number of views between `rhs` and `self`, saturating at 0.
    fn sub(self, rhs: ViewNumber) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// 32-byte cryptographic hash.
///
/// Within this crate, `CryptoHash`-es are always SHA256 hashes, produced by [`CryptoHasher`]
/// (re-exported from [`crypto_primitives`](super::crypto_primitives)) over the Borsh serialization of
/// the hashed value.
///
/// [`CryptoHasher`]: super::crypto_primitives::CryptoHasher
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The all-zeroes hash.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a [`Vertex`](super::vertex::Vertex): the hash of its serialization.
pub type VertexId = CryptoHash;

/// Byte representation of an Ed25519 verifying key.
///
/// Types that need to be Borsh-serialized store validator identities as `VerifyingKeyBytes` instead of
/// [`VerifyingKey`](super::crypto_primitives::VerifyingKey), which does not implement the Borsh traits.
pub type VerifyingKeyBytes = [u8; 32];

/// Ed25519 digital signature.
///
/// Within this crate, these are produced using the [`ed25519_dalek`] crate, whose main definitions are
/// re-exported from the [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0[..8].fmt(f)
    }
}

/// Weight of a specific validator's votes in consensus decisions.
///
/// The higher the power, the more weight the validator's votes have, and the more often the validator
/// is elected as a leader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of a set of validators.
///
/// The inner type that this newtype wraps around is `u128`, which is bigger than inner `u64` that
/// `Power` wraps around. This is so that summing up large `Power`s do not cause `TotalPower`'s inner
/// value to overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

/// An opaque transaction. Its meaning is defined entirely by the [`Ledger`](crate::ledger::Ledger).
#[derive(Clone, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Transaction(Vec<u8>);

impl Transaction {
    /// Create a new `Transaction` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner bytes of this `Transaction`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Transaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Transaction({} bytes)", self.0.len())
    }
}

/// Ordered list of [`Transaction`]s proposed in a single [`Vertex`](super::vertex::Vertex).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Payload(Vec<Transaction>);

impl Payload {
    /// Create a new `Payload` wrapping `transactions`.
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self(transactions)
    }

    /// Create an empty `Payload`.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Get a reference to the inner `Vec<Transaction>` of this `Payload`.
    pub const fn vec(&self) -> &Vec<Transaction> {
        &self.0
    }

    /// Iterate through the `Transaction`s in this `Payload` in proposal order.
    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.0.iter()
    }

    /// Get how many `Transaction`s are in this `Payload`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this `Payload` contains no transactions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
