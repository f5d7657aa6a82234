// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::publisher::Item;
use crate::engine::stage::{Stage, StageContext, Step, Terminal};

/// Round-robin fan-in. Completes once every source has completed; the first
/// failure fails the merge.
pub(crate) struct MergeStage<T: Item> {
    /// `None` once a source has completed.
    sources: Vec<Option<Stage<T>>>,
    cursor: usize,
}

impl<T: Item> MergeStage<T> {
    pub(crate) fn new(sources: Vec<Stage<T>>) -> Self {
        Self {
            sources: sources.into_iter().map(Some).collect(),
            cursor: 0,
        }
    }

    fn live(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    pub(crate) fn pull(&mut self, cx: &mut StageContext) -> Step<T> {
        let n = self.sources.len();
        for _ in 0..n {
            let idx = self.cursor;
            // The pointer moves on every attempt, ready or not.
            self.cursor = (self.cursor + 1) % n;
            let step = match &mut self.sources[idx] {
                Some(source) => source.pull(cx),
                None => continue,
            };
            match step {
                Step::Ready(value) => return Step::Ready(value),
                Step::Pending => {}
                Step::Done(Terminal::Completed) => self.sources[idx] = None,
                Step::Done(failed) => return Step::Done(failed),
            }
        }
        if self.live() == 0 {
            Step::Done(Terminal::Completed)
        } else {
            Step::Pending
        }
    }

    pub(crate) fn probe(&mut self, cx: &mut StageContext) -> Option<Terminal> {
        for slot in self.sources.iter_mut() {
            let Some(source) = slot else { continue };
            match source.probe(cx) {
                Some(Terminal::Completed) => *slot = None,
                Some(failed) => return Some(failed),
                None => {}
            }
        }
        (self.live() == 0).then_some(Terminal::Completed)
    }

    pub(crate) fn cancel(&mut self) {
        for source in self.sources.iter_mut().flatten() {
            source.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stage::test_context;
    use crate::errors::FlowError;

    fn seq(items: Vec<i32>) -> Stage<i32> {
        Stage::Sequence {
            items: items.into(),
            next: 0,
        }
    }

    #[test]
    fn alternates_between_ready_sources() {
        let mut merge = MergeStage::new(vec![seq(vec![1, 2, 3]), seq(vec![10, 20, 30])]);
        let mut cx = test_context(usize::MAX);
        let mut seen = Vec::new();
        while let Step::Ready(v) = merge.pull(&mut cx) {
            seen.push(v);
        }
        assert_eq!(seen, vec![1, 10, 2, 20, 3, 30]);
        assert_eq!(merge.probe(&mut cx), Some(Terminal::Completed));
    }

    #[test]
    fn skips_completed_sources() {
        let mut merge = MergeStage::new(vec![Stage::Empty, seq(vec![7, 8])]);
        let mut cx = test_context(usize::MAX);
        assert!(matches!(merge.pull(&mut cx), Step::Ready(7)));
        assert!(matches!(merge.pull(&mut cx), Step::Ready(8)));
        assert!(matches!(merge.pull(&mut cx), Step::Done(Terminal::Completed)));
    }

    #[test]
    fn first_failure_fails_the_merge() {
        let cause = FlowError::SourceFailure("boom".into());
        let mut merge = MergeStage::new(vec![seq(vec![1]), Stage::Fail(cause.clone())]);
        let mut cx = test_context(usize::MAX);
        assert!(matches!(merge.pull(&mut cx), Step::Ready(1)));
        assert!(matches!(
            merge.pull(&mut cx),
            Step::Done(Terminal::Failed(e)) if e == cause
        ));
    }

    #[test]
    fn empty_merge_completes() {
        let mut merge: MergeStage<i32> = MergeStage::new(Vec::new());
        let mut cx = test_context(usize::MAX);
        assert!(matches!(merge.pull(&mut cx), Step::Done(Terminal::Completed)));
    }
}
