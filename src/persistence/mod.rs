/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable persistence of the consensus state that must survive a crash.
//!
//! Library users provide a key-value store implementing [`KVStore`](pluggables::KVStore). The
//! consensus core writes two [state variables](variables) into it: the safety state of
//! [Safety Rules](crate::safety_rules), and the content of the [Vertex Store](crate::vertex_store).
//! Every write completes before the operation that triggered it returns.

pub mod pluggables;

pub mod variables;
