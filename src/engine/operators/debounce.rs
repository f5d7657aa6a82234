// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::{Duration, Instant};

use crate::engine::publisher::Item;
use crate::engine::stage::{Stage, StageContext, Step, Terminal};
use crate::observability::messages::operator::DebounceArmed;
use crate::observability::messages::StructuredLog;

/// Emits a value only after `interval` passes with no newer value.
///
/// Upstream completion flushes the pending value before completing.
/// Upstream failure discards it and fails at once.
pub(crate) struct DebounceStage<T: Item> {
    upstream: Box<Stage<T>>,
    interval: Duration,
    pending: Option<(T, Instant)>,
    upstream_done: Option<Terminal>,
    armed: Option<Instant>,
}

impl<T: Item> DebounceStage<T> {
    pub(crate) fn new(upstream: Stage<T>, interval: Duration) -> Self {
        Self {
            upstream: Box::new(upstream),
            interval,
            pending: None,
            upstream_done: None,
            armed: None,
        }
    }

    fn absorb(&mut self, cx: &mut StageContext) {
        while self.upstream_done.is_none() {
            match self.upstream.pull(cx) {
                Step::Ready(value) => {
                    self.pending = Some((value, Instant::now() + self.interval));
                }
                Step::Pending => break,
                Step::Done(terminal) => self.upstream_done = Some(terminal),
            }
        }
    }

    fn arm(&mut self, due: Instant, cx: &StageContext) {
        if self.armed == Some(due) {
            return;
        }
        self.armed = Some(due);
        DebounceArmed {
            delay: due.saturating_duration_since(Instant::now()),
        }
        .log();
        cx.wake_at(due);
    }

    fn failure(&self) -> Option<Terminal> {
        match &self.upstream_done {
            Some(failed @ Terminal::Failed(_)) => Some(failed.clone()),
            _ => None,
        }
    }

    pub(crate) fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        self.absorb(cx);
        if let Some(failed) = self.failure() {
            self.pending = None;
            return Step::Done(failed);
        }
        match self.pending.take() {
            Some((value, due)) if self.upstream_done.is_some() || Instant::now() >= due => {
                Step::Ready(value)
            }
            Some((value, due)) => {
                self.pending = Some((value, due));
                self.arm(due, cx);
                Step::Pending
            }
            None => match &self.upstream_done {
                Some(terminal) => Step::Done(terminal.clone()),
                None => Step::Pending,
            },
        }
    }

    pub(crate) fn probe(&mut self, cx: &mut StageContext) -> Option<Terminal> {
        self.absorb(cx);
        if let Some(failed) = self.failure() {
            self.pending = None;
            return Some(failed);
        }
        match &self.pending {
            Some((_, due)) => {
                let due = *due;
                if self.upstream_done.is_none() {
                    self.arm(due, cx);
                }
                None
            }
            None => self.upstream_done.clone(),
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.pending = None;
        self.upstream.cancel();
    }
}
