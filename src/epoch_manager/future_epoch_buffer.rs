/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Holds proposals and votes that arrive before the replica enters their epoch.
//!
//! The validator set of a future epoch is not known yet, so these messages cannot be authenticated.
//! The buffer therefore only holds messages of the epoch directly after the current one, with a bound
//! on both its total size and the share of any single sender. Messages of later epochs are dropped.
//!
//! Every early message is also a hint that the current epoch ended. The buffer decides when that hint
//! is worth a [`GetEpochRequest`](super::messages::GetEpochRequest): at most once per
//! [`EPOCH_REQUEST_INTERVAL`], whatever the epoch of the messages.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::{
    pacemaker::messages::PacemakerMessage,
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{EpochNumber, VerifyingKeyBytes},
    },
};

/// Minimum time between two requests for the proof that the current epoch ended.
pub(crate) const EPOCH_REQUEST_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum number of held messages from a single sender.
const MAX_MESSAGES_PER_PEER: usize = 64;

pub(crate) struct FutureEpochBuffer {
    // The only epoch whose messages are held.
    epoch: EpochNumber,
    messages: Vec<(VerifyingKey, PacemakerMessage)>,
    per_peer: HashMap<VerifyingKeyBytes, usize>,
    capacity: usize,
    last_epoch_request: Option<Instant>,
}

impl FutureEpochBuffer {
    /// Create an empty buffer for a replica in `current_epoch`.
    pub(crate) fn new(current_epoch: EpochNumber, capacity: usize) -> Self {
        Self {
            epoch: current_epoch.next(),
            messages: Vec::new(),
            per_peer: HashMap::new(),
            capacity,
            last_epoch_request: None,
        }
    }

    /// Hold `message` from `origin`. Returns `false` if the message was dropped.
    pub(crate) fn hold(&mut self, origin: VerifyingKey, message: PacemakerMessage) -> bool {
        if message.epoch() != self.epoch {
            log::debug!(
                "Dropping message of epoch {}, only epoch {} is held",
                message.epoch(),
                self.epoch
            );
            return false;
        }
        let held_from_peer = self.per_peer.entry(origin.to_bytes()).or_default();
        if self.messages.len() >= self.capacity || *held_from_peer >= MAX_MESSAGES_PER_PEER {
            log::debug!("Future epoch buffer full, dropping message from {:?}", origin);
            return false;
        }
        *held_from_peer += 1;
        self.messages.push((origin, message));
        true
    }

    /// Whether a request for the proof that the current epoch ended may be sent at `now`. Records the
    /// request if so.
    pub(crate) fn should_request_epoch(&mut self, now: Instant) -> bool {
        match self.last_epoch_request {
            Some(last) if now.saturating_duration_since(last) < EPOCH_REQUEST_INTERVAL => false,
            _ => {
                self.last_epoch_request = Some(now);
                true
            }
        }
    }

    /// Move to `new_epoch`, and take the messages held for it.
    pub(crate) fn enter_epoch(
        &mut self,
        new_epoch: EpochNumber,
    ) -> Vec<(VerifyingKey, PacemakerMessage)> {
        let messages = std::mem::take(&mut self.messages);
        let held_epoch = self.epoch;
        self.epoch = new_epoch.next();
        self.per_peer.clear();
        self.last_epoch_request = None;
        if held_epoch == new_epoch {
            messages
        } else {
            Vec::new()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
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
            data_types::{CryptoHash, ViewNumber},
            vertex::{BftHeader, LedgerHeader, Vertex},
        },
    };
    use rand_core::OsRng;

    fn vote_of_epoch(epoch: u64, keypair: &Keypair) -> PacemakerMessage {
        let epoch = EpochNumber::new(epoch);
        let header = LedgerHeader::genesis(epoch, CryptoHash::zero(), 0);
        let genesis_qc = QuorumCertificate::genesis(&Vertex::genesis(epoch, header), header);
        let vote_data = VoteData::new(
            BftHeader::new(ViewNumber::new(1), CryptoHash::new([1; 32]), header),
            genesis_qc.proposed().clone(),
            None,
        );
        PacemakerMessage::Vote(Vote {
            author: keypair.public_bytes(),
            high_qc: HighQC::from_qc(genesis_qc),
            signature: keypair.sign(&vote_data.signing_bytes(0)),
            vote_data,
            timestamp: 0,
            timeout_signature: None,
        })
    }

    fn keypair() -> Keypair {
        Keypair::new(SigningKey::generate(&mut OsRng {}))
    }

    #[test]
    fn only_next_epoch_is_held() {
        let sender = keypair();
        let mut buffer = FutureEpochBuffer::new(EpochNumber::new(2), 16);

        assert!(buffer.hold(sender.public(), vote_of_epoch(3, &sender)));
        assert!(!buffer.hold(sender.public(), vote_of_epoch(4, &sender)));
        assert!(!buffer.hold(sender.public(), vote_of_epoch(1_000_000, &sender)));
        assert_eq!(buffer.len(), 1);

        let released = buffer.enter_epoch(EpochNumber::new(3));
        assert_eq!(released.len(), 1);
        assert_eq!(buffer.len(), 0);

        // Now epoch 4 is next.
        assert!(buffer.hold(sender.public(), vote_of_epoch(4, &sender)));
    }

    #[test]
    fn single_sender_cannot_fill_buffer() {
        let noisy = keypair();
        let honest = keypair();
        let mut buffer = FutureEpochBuffer::new(EpochNumber::new(0), MAX_MESSAGES_PER_PEER * 2);

        for _ in 0..MAX_MESSAGES_PER_PEER {
            assert!(buffer.hold(noisy.public(), vote_of_epoch(1, &noisy)));
        }
        assert!(!buffer.hold(noisy.public(), vote_of_epoch(1, &noisy)));
        assert!(buffer.hold(honest.public(), vote_of_epoch(1, &honest)));
    }

    #[test]
    fn skipped_epoch_releases_nothing() {
        let sender = keypair();
        let mut buffer = FutureEpochBuffer::new(EpochNumber::new(0), 16);
        assert!(buffer.hold(sender.public(), vote_of_epoch(1, &sender)));

        // The ledger synced straight to epoch 2.
        assert!(buffer.enter_epoch(EpochNumber::new(2)).is_empty());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn epoch_requests_are_throttled() {
        let mut buffer = FutureEpochBuffer::new(EpochNumber::new(0), 16);
        let start = Instant::now();
        assert!(buffer.should_request_epoch(start));
        assert!(!buffer.should_request_epoch(start + Duration::from_millis(100)));
        assert!(buffer.should_request_epoch(start + EPOCH_REQUEST_INTERVAL));
    }
}
