/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Serves [`GetVerticesRequest`]s from the local vertex store.
//!
//! A request for `count` vertices ending at `vertex_id` is answered with the chain of vertices, child
//! first, if the store holds all of them. Otherwise it is answered with a [`GetVerticesErrorResponse`]
//! carrying the local [`HighQC`](crate::types::certificates::HighQC), which the requester can sync to
//! instead.

use std::{sync::mpsc::Sender, time::SystemTime};

use ed25519_dalek::VerifyingKey;

use crate::{
    counters::{CounterType, SystemCounters},
    events::{Event, ReceiveSyncRequestEvent, SendSyncResponseEvent},
    networking::{network::Network, sending::SenderHandle},
    persistence::pluggables::KVStore,
    vertex_store::implementation::VertexStore,
};

use super::messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse};

pub(crate) struct SyncServer<N: Network> {
    sender: SenderHandle<N>,
    max_vertices_per_response: u32,
    counters: SystemCounters,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> SyncServer<N> {
    pub(crate) fn new(
        sender: SenderHandle<N>,
        max_vertices_per_response: u32,
        counters: SystemCounters,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            sender,
            max_vertices_per_response,
            counters,
            event_publisher,
        }
    }

    pub(crate) fn process_request<K: KVStore>(
        &mut self,
        origin: &VerifyingKey,
        request: GetVerticesRequest,
        vertex_store: &VertexStore<K>,
    ) {
        Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
            timestamp: SystemTime::now(),
            peer: *origin,
            vertex: request.vertex_id,
            count: request.count,
        })
        .publish(&self.event_publisher);
        self.counters
            .increment(CounterType::BftSyncRequestsReceived);

        let vertices = if request.count == 0 || request.count > self.max_vertices_per_response {
            None
        } else {
            vertex_store.get_vertices(&request.vertex_id, request.count as usize)
        };

        let high_qc = vertex_store.high_qc().clone();
        match vertices {
            Some(vertices) => {
                let count = vertices.len();
                self.sender.send(*origin, GetVerticesResponse { vertices });
                Event::SendSyncResponse(SendSyncResponseEvent {
                    timestamp: SystemTime::now(),
                    peer: *origin,
                    vertices: count,
                    high_qc,
                })
                .publish(&self.event_publisher);
            }
            None => {
                log::debug!(
                    "Cannot serve {} vertices ending at {}",
                    request.count,
                    request.vertex_id
                );
                self.sender.send(
                    *origin,
                    GetVerticesErrorResponse {
                        high_qc: high_qc.clone(),
                        request,
                    },
                );
                Event::SendSyncResponse(SendSyncResponseEvent {
                    timestamp: SystemTime::now(),
                    peer: *origin,
                    vertices: 0,
                    high_qc,
                })
                .publish(&self.event_publisher);
            }
        }
    }
}
