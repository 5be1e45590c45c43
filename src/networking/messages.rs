/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of every message variant exchanged between replicas.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    bft_sync::messages::{
        GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse, SyncMessage,
    },
    epoch_manager::messages::{EpochMessage, GetEpochRequest, GetEpochResponse},
    pacemaker::messages::{PacemakerMessage, Proposal, Vote},
    types::data_types::EpochNumber,
};

/// All message variants.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See: [`PacemakerMessage`].
    PacemakerMessage(PacemakerMessage),

    /// See: [`SyncMessage`].
    SyncMessage(SyncMessage),

    /// See: [`EpochMessage`].
    EpochMessage(EpochMessage),
}

impl Message {
    /// Get the epoch that the message is tagged with. Sync and epoch messages are not tagged: sync
    /// messages are always handled by the current epoch, and epoch messages are about epochs.
    pub fn epoch(&self) -> Option<EpochNumber> {
        match self {
            Message::PacemakerMessage(msg) => Some(msg.epoch()),
            Message::SyncMessage(_) | Message::EpochMessage(_) => None,
        }
    }
}

impl From<PacemakerMessage> for Message {
    fn from(value: PacemakerMessage) -> Self {
        Message::PacemakerMessage(value)
    }
}

impl From<Proposal> for Message {
    fn from(value: Proposal) -> Self {
        Message::PacemakerMessage(PacemakerMessage::Proposal(value))
    }
}

impl From<Vote> for Message {
    fn from(value: Vote) -> Self {
        Message::PacemakerMessage(PacemakerMessage::Vote(value))
    }
}

impl From<SyncMessage> for Message {
    fn from(value: SyncMessage) -> Self {
        Message::SyncMessage(value)
    }
}

impl From<GetVerticesRequest> for Message {
    fn from(value: GetVerticesRequest) -> Self {
        Message::SyncMessage(SyncMessage::GetVerticesRequest(value))
    }
}

impl From<GetVerticesResponse> for Message {
    fn from(value: GetVerticesResponse) -> Self {
        Message::SyncMessage(SyncMessage::GetVerticesResponse(value))
    }
}

impl From<GetVerticesErrorResponse> for Message {
    fn from(value: GetVerticesErrorResponse) -> Self {
        Message::SyncMessage(SyncMessage::GetVerticesErrorResponse(value))
    }
}

impl From<EpochMessage> for Message {
    fn from(value: EpochMessage) -> Self {
        Message::EpochMessage(value)
    }
}

impl From<GetEpochRequest> for Message {
    fn from(value: GetEpochRequest) -> Self {
        Message::EpochMessage(EpochMessage::GetEpochRequest(value))
    }
}

impl From<GetEpochResponse> for Message {
    fn from(value: GetEpochResponse) -> Self {
        Message::EpochMessage(EpochMessage::GetEpochResponse(value))
    }
}
