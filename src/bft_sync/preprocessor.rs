/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Holds consensus messages that cannot be processed yet.
//!
//! A message is held back either because the vertex its high QC certifies is still being synced,
//! or because it is for a view that the replica has not entered yet. Held messages are released once
//! the vertex is inserted or the view is entered, respectively.

use std::collections::{BTreeMap, HashMap};

use crate::{
    pacemaker::messages::PacemakerMessage,
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{VertexId, ViewNumber},
    },
};

pub(crate) struct Preprocessor {
    syncing: HashMap<VertexId, Vec<(VerifyingKey, PacemakerMessage)>>,
    future_views: BTreeMap<ViewNumber, Vec<(VerifyingKey, PacemakerMessage)>>,
    len: usize,
    capacity: usize,
}

impl Preprocessor {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            syncing: HashMap::new(),
            future_views: BTreeMap::new(),
            len: 0,
            capacity,
        }
    }

    /// Hold `message` until the vertex `vertex_id` is inserted. Returns `false` if the buffer is full.
    pub(crate) fn buffer_syncing(
        &mut self,
        vertex_id: VertexId,
        origin: VerifyingKey,
        message: PacemakerMessage,
    ) -> bool {
        if self.len >= self.capacity {
            log::debug!("Preprocessor full, dropping message for view {}", message.view());
            return false;
        }
        self.syncing
            .entry(vertex_id)
            .or_default()
            .push((origin, message));
        self.len += 1;
        true
    }

    /// Hold `message` until the replica enters the message's view. Returns `false` if the buffer is full.
    pub(crate) fn buffer_future(&mut self, origin: VerifyingKey, message: PacemakerMessage) -> bool {
        if self.len >= self.capacity {
            log::debug!("Preprocessor full, dropping message for view {}", message.view());
            return false;
        }
        self.future_views
            .entry(message.view())
            .or_default()
            .push((origin, message));
        self.len += 1;
        true
    }

    /// Release the messages waiting for `vertex_id`.
    pub(crate) fn take_syncing(
        &mut self,
        vertex_id: &VertexId,
    ) -> Vec<(VerifyingKey, PacemakerMessage)> {
        let messages = self.syncing.remove(vertex_id).unwrap_or_default();
        self.len -= messages.len();
        messages
    }

    /// Release the messages for `view`, and drop those for lower views, which are stale.
    pub(crate) fn take_view(&mut self, view: ViewNumber) -> Vec<(VerifyingKey, PacemakerMessage)> {
        let mut newer = self.future_views.split_off(&view);
        let stale: usize = self.future_views.values().map(Vec::len).sum();
        let messages = newer.remove(&view).unwrap_or_default();
        self.future_views = newer;
        self.len -= stale + messages.len();
        messages
    }

    /// Get the vertices that held messages are waiting for.
    pub(crate) fn syncing_ids(&self) -> Vec<VertexId> {
        self.syncing.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pacemaker::messages::Vote,
        types::{
            certificates::{HighQC, QuorumCertificate, VoteData},
            crypto_primitives::{Keypair, SigningKey},
            data_types::{CryptoHash, EpochNumber},
            vertex::{BftHeader, LedgerHeader, Vertex},
        },
    };
    use rand_core::OsRng;

    fn vote_in(view: u64, keypair: &Keypair) -> PacemakerMessage {
        let epoch = EpochNumber::new(0);
        let header = LedgerHeader::genesis(epoch, CryptoHash::zero(), 0);
        let genesis = Vertex::genesis(epoch, header);
        let genesis_qc = QuorumCertificate::genesis(&genesis, header);
        let vertex = Vertex::new(
            epoch,
            genesis_qc.clone(),
            ViewNumber::new(view),
            Default::default(),
            keypair.public_bytes(),
        );
        let vote_data = VoteData::new(
            BftHeader::new(vertex.view, vertex.id, header),
            genesis_qc.proposed().clone(),
            None,
        );
        let signature = keypair.sign(&vote_data.signing_bytes(0));
        PacemakerMessage::Vote(Vote {
            author: keypair.public_bytes(),
            high_qc: HighQC::from_qc(genesis_qc),
            vote_data,
            timestamp: 0,
            signature,
            timeout_signature: None,
        })
    }

    #[test]
    fn take_view_drops_stale_views() {
        let keypair = Keypair::new(SigningKey::generate(&mut OsRng {}));
        let mut preprocessor = Preprocessor::new(10);
        for view in [2, 3, 3, 5] {
            assert!(preprocessor.buffer_future(keypair.public(), vote_in(view, &keypair)));
        }
        assert_eq!(preprocessor.len(), 4);

        let released = preprocessor.take_view(ViewNumber::new(3));
        assert_eq!(released.len(), 2);
        assert!(released
            .iter()
            .all(|(_, message)| message.view() == ViewNumber::new(3)));
        assert_eq!(preprocessor.len(), 1);
        assert_eq!(preprocessor.take_view(ViewNumber::new(5)).len(), 1);
        assert_eq!(preprocessor.len(), 0);
    }

    #[test]
    fn buffer_is_bounded() {
        let keypair = Keypair::new(SigningKey::generate(&mut OsRng {}));
        let mut preprocessor = Preprocessor::new(2);
        let vertex_id = CryptoHash::zero();
        assert!(preprocessor.buffer_syncing(vertex_id, keypair.public(), vote_in(1, &keypair)));
        assert!(preprocessor.buffer_future(keypair.public(), vote_in(2, &keypair)));
        assert!(!preprocessor.buffer_future(keypair.public(), vote_in(3, &keypair)));

        assert_eq!(preprocessor.take_syncing(&vertex_id).len(), 1);
        assert!(preprocessor.take_syncing(&vertex_id).is_empty());
        assert_eq!(preprocessor.len(), 1);
    }
}
