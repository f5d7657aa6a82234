// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod subscriber;
pub mod wake;

pub use subscriber::{CallbackSubscriber, Subscriber};
pub use wake::Wake;
