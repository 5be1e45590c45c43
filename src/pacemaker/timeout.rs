/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exponentially increasing view timeouts.

use std::time::Duration;

use crate::types::data_types::ViewNumber;

/// Number of views between the highest committed QC and the current view that are expected in normal
/// operation (a 3-chain), and therefore do not increase the timeout.
const EXPECTED_UNCOMMITTED_VIEWS: u64 = 3;

/// Computes `base * rate^min(n, max_exponent)`, where `n` is the number of uncommitted views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialTimeout {
    base: Duration,
    rate: f64,
    max_exponent: u32,
}

impl ExponentialTimeout {
    /// Create a new `ExponentialTimeout`. `rate` must be at least 1.0.
    pub fn new(base: Duration, rate: f64, max_exponent: u32) -> Self {
        Self {
            base,
            rate: rate.max(1.0),
            max_exponent,
        }
    }

    /// Get the timeout of a view entered after `uncommitted_views` views without a commit.
    pub fn timeout(&self, uncommitted_views: u64) -> Duration {
        let exponent = uncommitted_views.min(self.max_exponent as u64) as i32;
        self.base.mul_f64(self.rate.powi(exponent))
    }

    /// Get the timeout of `view`, given the view of the highest committed QC.
    pub fn timeout_for(&self, view: ViewNumber, highest_committed_view: ViewNumber) -> Duration {
        self.timeout(uncommitted_views(view, highest_committed_view))
    }
}

/// `max(0, view - highest_committed_view - 3)`.
pub fn uncommitted_views(view: ViewNumber, highest_committed_view: ViewNumber) -> u64 {
    (view - highest_committed_view).saturating_sub(EXPECTED_UNCOMMITTED_VIEWS)
}
