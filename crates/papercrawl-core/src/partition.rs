//! Split a result set into fetch tasks
//!
//! Batch mode covers `[0, total)` exactly with pages of at most `batch_size`.
//! Node mode gives every simulated node an equal share and drops the remainder.

use std::fmt;
use std::num::NonZeroUsize;

use crate::config::PipelineConfig;
use crate::strategy::StrategyKind;

/// One page of a listing: `count` items starting at `start_offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTask {
    pub source_id: String,
    pub start_offset: usize,
    pub count: usize,
}

impl FetchTask {
    /// Exclusive end of the covered range
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.count
    }
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}..{})",
            self.source_id,
            self.start_offset,
            self.end_offset()
        )
    }
}

/// Consecutive pages of `batch_size`; the last one takes the remainder.
pub fn batch_tasks(source_id: &str, total: usize, batch_size: NonZeroUsize) -> Vec<FetchTask> {
    let step = batch_size.get();
    (0..total)
        .step_by(step)
        .map(|start| FetchTask {
            source_id: source_id.to_string(),
            start_offset: start,
            count: step.min(total - start),
        })
        .collect()
}

/// `node_count` equal shares of `total / node_count`.
///
/// Items past `node_count * share` are never fetched. A zero share yields no tasks.
pub fn node_tasks(source_id: &str, total: usize, node_count: NonZeroUsize) -> Vec<FetchTask> {
    let nodes = node_count.get();
    let share = total / nodes;
    if share == 0 {
        return Vec::new();
    }
    (0..nodes)
        .map(|node| FetchTask {
            source_id: source_id.to_string(),
            start_offset: node * share,
            count: share,
        })
        .collect()
}

/// Task list for a run of `kind` over `total` items.
pub fn plan(
    source_id: &str,
    total: usize,
    kind: StrategyKind,
    config: &PipelineConfig,
) -> Vec<FetchTask> {
    match kind {
        StrategyKind::Thread | StrategyKind::Async => {
            batch_tasks(source_id, total, config.batch_size)
        }
        StrategyKind::Distributed => node_tasks(source_id, total, config.node_count),
    }
}
