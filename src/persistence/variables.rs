/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each persisted consensus variable is stored in the user-provided
//! key-value store.
//!
//! # List of State Variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Safety State|[`SafetyState`](crate::safety_rules::state::SafetyState)|The locked view and the last vote cast by this validator in the current epoch. Written before every vote leaves the replica.|
//! |Vertex Store State|[`VerifiedVertexStoreState`](crate::types::vertex::VerifiedVertexStoreState)|The root, uncommitted vertices and best certificates of the vertex store. Written on every high QC update and commit.|
//! |Epoch Change|[`EpochChange`](crate::ledger::EpochChange)|The start of the latest epoch this replica entered. Read on startup to resume in that epoch.|
//!
//! # Persistence of state variables
//!
//! All three variables are "single values": they are stored as **Borsh-serialized values** in one-byte,
//! constant keys defined in constants sharing the variable's name.

pub const SAFETY_STATE: [u8; 1] = [0];
pub const VERTEX_STORE_STATE: [u8; 1] = [1];

pub const EPOCH_CHANGE: [u8; 1] = [2];
