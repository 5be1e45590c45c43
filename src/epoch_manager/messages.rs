/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages that replicas exchange to find out about epochs they missed.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{certificates::QuorumCertificate, data_types::EpochNumber};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum EpochMessage {
    GetEpochRequest(GetEpochRequest),
    GetEpochResponse(GetEpochResponse),
}

impl From<GetEpochRequest> for EpochMessage {
    fn from(value: GetEpochRequest) -> Self {
        EpochMessage::GetEpochRequest(value)
    }
}

impl From<GetEpochResponse> for EpochMessage {
    fn from(value: GetEpochResponse) -> Self {
        EpochMessage::GetEpochResponse(value)
    }
}

/// Sent by a replica in `epoch` after it received a message from a later epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GetEpochRequest {
    pub epoch: EpochNumber,
}

/// `proof` is the QC that committed the end of the epoch before the responder's current epoch, or `None`
/// if the responder is not ahead of the requester.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GetEpochResponse {
    pub proof: Option<QuorumCertificate>,
}
