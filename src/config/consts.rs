// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::engine::OverflowPolicy;

/// Default bound on buffer stages (values)
pub const DEFAULT_BUFFER_CAPACITY: usize = 16;
/// Buffer overflow policy used when a config omits one
pub const DEFAULT_OVERFLOW_POLICY: OverflowPolicy = OverflowPolicy::DropOldest;
/// Default per-subscription queue bound for external sources (values)
pub const DEFAULT_EXTERNAL_QUEUE_CAPACITY: usize = 1024;
/// External sources fail the subscription rather than drop silently
pub const DEFAULT_EXTERNAL_OVERFLOW: OverflowPolicy = OverflowPolicy::FailSubscription;
/// How long shutdown waits for in-flight delivery work
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);
/// Upstream pulls one drain pass may make before yielding its worker
pub const DEFAULT_DRAIN_BUDGET: usize = 256;
/// Worker count for the concurrent scheduler when a config omits one
pub const DEFAULT_CONCURRENT_WORKERS: usize = 4;
