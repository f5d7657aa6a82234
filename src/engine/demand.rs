// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Outstanding demand accounting for one subscription.

use std::sync::atomic::{AtomicU64, Ordering};

/// Result of adding demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandAdded {
    Added,
    /// The counter hit `u64::MAX` and stayed there.
    Saturated,
}

/// Requested-but-undelivered item count.
///
/// Additions saturate at `u64::MAX` instead of wrapping. Only the drain loop
/// takes units, one per delivered value, and never below zero.
#[derive(Debug, Default)]
pub struct DemandCounter {
    outstanding: AtomicU64,
    requested: AtomicU64,
    delivered: AtomicU64,
}

impl DemandCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) -> DemandAdded {
        saturating_add(&self.requested, n);
        if saturating_add(&self.outstanding, n) {
            DemandAdded::Saturated
        } else {
            DemandAdded::Added
        }
    }

    /// Consumes one unit. Returns `false` when nothing is outstanding.
    pub fn try_take_one(&self) -> bool {
        let taken = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok();
        if taken {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    #[inline]
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Total units ever requested, saturating.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Total units consumed by deliveries.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }
}

/// Returns `true` when the addition saturated.
fn saturating_add(counter: &AtomicU64, n: u64) -> bool {
    let mut saturated = false;
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        let (next, overflowed) = current.overflowing_add(n);
        saturated = overflowed;
        Some(if overflowed { u64::MAX } else { next })
    });
    saturated
}
