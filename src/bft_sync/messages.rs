/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the
//! [BFT Sync](super) protocol.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    certificates::HighQC,
    data_types::{VertexId, ViewNumber},
    vertex::Vertex,
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SyncMessage {
    GetVerticesRequest(GetVerticesRequest),
    GetVerticesResponse(GetVerticesResponse),
    GetVerticesErrorResponse(GetVerticesErrorResponse),
}

impl From<GetVerticesRequest> for SyncMessage {
    fn from(value: GetVerticesRequest) -> Self {
        SyncMessage::GetVerticesRequest(value)
    }
}

impl From<GetVerticesResponse> for SyncMessage {
    fn from(value: GetVerticesResponse) -> Self {
        SyncMessage::GetVerticesResponse(value)
    }
}

impl From<GetVerticesErrorResponse> for SyncMessage {
    fn from(value: GetVerticesErrorResponse) -> Self {
        SyncMessage::GetVerticesErrorResponse(value)
    }
}

/// A request for the chain of `count` vertices that ends at `vertex_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesRequest {
    pub vertex_id: VertexId,
    pub count: u32,
}

/// The chain of vertices requested by a [`GetVerticesRequest`], child first.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesResponse {
    pub vertices: Vec<Vertex>,
}

impl GetVerticesResponse {
    /// Get the request that this response answers, if the response is well formed.
    pub fn request(&self) -> Option<GetVerticesRequest> {
        self.vertices.first().map(|first| GetVerticesRequest {
            vertex_id: first.id,
            count: self.vertices.len() as u32,
        })
    }

    pub fn view(&self) -> Option<ViewNumber> {
        self.vertices.first().map(|first| first.view)
    }
}

/// The reply to a [`GetVerticesRequest`] that the responder could not serve. Carries the responder's
/// [`HighQC`] so that the requester can sync to it instead.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesErrorResponse {
    pub high_qc: HighQC,
    pub request: GetVerticesRequest,
}
