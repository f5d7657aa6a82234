// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared cancellation flag for one subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Atomic, idempotent cancellation flag.
///
/// Clones share the same flag. The first `cancel` wins and reports `true`;
/// later calls are no-ops. Timers await [`Signal::cancelled`] so that pending
/// delayed work is released as soon as the flag is set.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    set: AtomicBool,
    token: CancellationToken,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        if self.inner.set.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}
