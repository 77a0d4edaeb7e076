//! Batch planning.
//!
//! Partitions an ordered step list into contiguous, non-overlapping batches of
//! at most `size` steps. Only the final batch may be shorter. Partitioning is
//! pure, so it is recomputed whenever the step list or mode changes rather
//! than being patched in place.

use std::ops::Range;

use sequencer_types::StepDefinition;

use crate::errors::EngineError;

/// One batch: a half-open range of step indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub range: Range<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn steps<'a>(&self, all: &'a [StepDefinition]) -> &'a [StepDefinition] {
        &all[self.range.clone()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlanner {
    size: usize,
}

impl BatchPlanner {
    pub fn new(size: usize) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(EngineError::configuration("batch size must be >= 1"));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn partition(&self, steps: &[StepDefinition]) -> Vec<Batch> {
        self.partition_len(steps.len())
    }

    pub fn partition_len(&self, total: usize) -> Vec<Batch> {
        (0..total)
            .step_by(self.size)
            .enumerate()
            .map(|(index, start)| Batch {
                index,
                range: start..(start + self.size).min(total),
            })
            .collect()
    }

    /// Whether `cursor` sits on a batch boundary.
    pub fn is_aligned(&self, cursor: usize) -> bool {
        cursor % self.size == 0
    }
}

/// Convenience wrapper around [`BatchPlanner::partition`].
pub fn partition(steps: &[StepDefinition], size: usize) -> Result<Vec<Batch>, EngineError> {
    Ok(BatchPlanner::new(size)?.partition(steps))
}
