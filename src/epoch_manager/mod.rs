/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Runs consensus one epoch at a time.
//!
//! An epoch is a period of consensus run by one fixed validator set. Every epoch starts from a genesis
//! vertex at view 0, with fresh [safety rules](crate::safety_rules) state and an empty
//! [vertex store](crate::vertex_store). An epoch ends when the [ledger](crate::ledger::Ledger) commits a
//! header marked as the end of the epoch: the commit returns an
//! [`EpochChange`](crate::ledger::EpochChange) with the validator set of the next epoch.
//!
//! The Epoch Manager then:
//! 1. Drops the consensus instance of the ended epoch, together with its deadlines and sync requests.
//! 2. Persists the `EpochChange`, so that a restarted replica resumes in the new epoch.
//! 3. Informs the [network](crate::networking::network::Network) of the new validator set.
//! 4. Starts a fresh instance, if this replica is a validator of the new epoch.
//! 5. Replays the proposals and votes of the new epoch that arrived early. Only messages of the epoch
//!    directly after the current one are held, see [`future_epoch_buffer`].
//!
//! A replica that receives a message of a later epoch than its own asks the sender for the proof that
//! its current epoch ended ([`GetEpochRequest`](messages::GetEpochRequest)), and hands the proof to the
//! ledger, which syncs to it.

pub(crate) mod future_epoch_buffer;

pub(crate) mod implementation;

pub(crate) mod instance;

pub mod messages;
