/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Token buckets that limit how often sync requests are exchanged with each peer.

use std::{collections::HashMap, time::Instant};

use crate::types::data_types::VerifyingKeyBytes;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// One token bucket per peer. At most `max_peers` buckets are kept: the bucket used least recently
/// makes room for a new peer.
pub(crate) struct RateLimiter {
    // Tokens added per second.
    rate: f64,
    capacity: f64,
    max_peers: usize,
    buckets: HashMap<VerifyingKeyBytes, Bucket>,
}

impl RateLimiter {
    /// Create buckets that start full, refill at `rate` tokens per second, and hold at most
    /// `max(rate, 1)` tokens.
    pub(crate) fn new(rate: f64, max_peers: usize) -> Self {
        let rate = rate.max(0.0);
        Self {
            rate,
            capacity: rate.max(1.0),
            max_peers: max_peers.max(1),
            buckets: HashMap::new(),
        }
    }

    /// Take a token from `peer`'s bucket if one is available.
    pub(crate) fn try_acquire(&mut self, peer: &VerifyingKeyBytes) -> bool {
        self.try_acquire_at(peer, Instant::now())
    }

    fn try_acquire_at(&mut self, peer: &VerifyingKeyBytes, now: Instant) -> bool {
        if !self.buckets.contains_key(peer) && self.buckets.len() >= self.max_peers {
            let least_recent = self
                .buckets
                .iter()
                .min_by_key(|(_, bucket)| bucket.last_refill)
                .map(|(peer, _)| *peer);
            if let Some(least_recent) = least_recent {
                self.buckets.remove(&least_recent);
            }
        }

        let (rate, capacity) = (self.rate, self.capacity);
        let bucket = self.buckets.entry(*peer).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
