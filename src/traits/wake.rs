// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Instant;

/// Handle a stage uses to ask its subscription for another drain pass.
///
/// External sources keep a weak reference to it so that a dropped
/// subscription is never kept alive by its upstream.
pub trait Wake: Send + Sync {
    /// Schedules a drain pass as soon as possible.
    fn wake(&self);

    /// Schedules a drain pass once `deadline` has passed.
    fn wake_at(&self, deadline: Instant);
}
