/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple components of the consensus core.
//!
//! Types specific to a single component, e.g., the messages of the [pacemaker](crate::pacemaker), can
//! be found in the "messages" submodules of those components.

pub mod data_types;

pub mod crypto_primitives;

pub mod validator_set;

pub mod signed_messages;

pub mod certificates;

pub mod vertex;
