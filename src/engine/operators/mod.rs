// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stateful operator stages. Map and filter are stateless and live directly
//! in [`Stage`](crate::engine::stage::Stage).

pub mod buffer;
pub(crate) mod debounce;
pub(crate) mod merge;

pub use buffer::{BufferConfig, OverflowPolicy};
