// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod bridge;     // handle tables + C ABI
pub mod config;     // config loading, validation, runtime builder
pub mod engine;     // publishers, operators, subscriptions
pub mod errors;     // error handling
pub mod observability;
pub mod scheduler;  // delivery strategies
pub mod traits;     // unified abstractions
