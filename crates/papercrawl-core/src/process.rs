//! Per-task chain: build URL → fetch → parse → dedup → emit
//!
//! Every error is settled here into a counter; nothing escapes to sibling tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::dedup::BloomFilter;
use crate::error::{FailureKind, TaskError};
use crate::fetch::{FetchExecutor, FetchOutcome, FetchRequest, Transport};
use crate::partition::FetchTask;
use crate::retry::sleep_or_cancel;
use crate::traits::{Parser, Record, Sink};

/// Sinks shared by every task of a run
pub type SinkList<R> = Arc<[Arc<dyn Sink<R>>]>;

/// Per-run tallies. `completed` and `duplicates` count records, the rest count tasks.
#[derive(Debug, Default)]
pub struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    duplicates: AtomicUsize,
    sink_errors: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn sink_errors(&self) -> usize {
        self.sink_errors.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub(crate) fn add_skipped(&self, n: usize) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }
}

/// Where a task is in its lifecycle. Logged at trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Pending,
    Fetching,
    Parsed,
    Deduped,
    Emitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { emitted: usize, duplicates: usize },
    Failed(TaskError),
    /// Run was stopped before the task began
    Skipped,
}

/// Shared state every task of one run works against.
pub struct TaskProcessor<P: Parser, T: Transport> {
    parser: Arc<P>,
    executor: Arc<FetchExecutor<T>>,
    dedup: Arc<BloomFilter>,
    sinks: SinkList<P::Record>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    progress: ProgressBar,
}

impl<P: Parser, T: Transport> TaskProcessor<P, T> {
    pub fn new(
        parser: Arc<P>,
        executor: Arc<FetchExecutor<T>>,
        dedup: Arc<BloomFilter>,
        sinks: SinkList<P::Record>,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            parser,
            executor,
            dedup,
            sinks,
            counters,
            cancel,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn stage(&self, task: &FetchTask, stage: TaskStage) {
        log::trace!("{task}: {stage:?}");
    }

    /// Run one task to a terminal outcome.
    ///
    /// `emit_delay` is slept between parsing and emission (simulated node work).
    pub async fn process(&self, task: &FetchTask, emit_delay: Duration) -> TaskOutcome {
        self.stage(task, TaskStage::Pending);
        if self.cancel.is_cancelled() {
            self.counters.add_skipped(1);
            return TaskOutcome::Skipped;
        }

        self.stage(task, TaskStage::Fetching);
        let url = self.parser.build_query_url(task.start_offset, task.count);
        let (body, attempts_used) = match self
            .executor
            .fetch(&FetchRequest::get(url), &self.cancel)
            .await
        {
            FetchOutcome::Success {
                body,
                attempts_used,
            } => (body, attempts_used),
            FetchOutcome::Failure {
                kind,
                attempts_used,
            } => {
                return self.fail(task, TaskError::Fetch {
                    kind,
                    attempts_used,
                });
            }
        };

        let records = match self.parser.parse_many(&body) {
            Ok(records) => records,
            Err(e) => return self.fail(task, TaskError::Parse(e)),
        };
        self.stage(task, TaskStage::Parsed);
        log::debug!(
            "{task}: {} records from {} bytes (retries: {attempts_used})",
            records.len(),
            body.len()
        );

        if !sleep_or_cancel(emit_delay, &self.cancel).await {
            return self.fail(task, TaskError::Fetch {
                kind: FailureKind::Cancelled,
                attempts_used,
            });
        }

        let mut emitted = 0;
        let mut duplicates = 0;
        for record in &records {
            if !self.dedup.check_and_add(record.identifier()) {
                duplicates += 1;
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.deliver(record);
            emitted += 1;
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        self.stage(task, TaskStage::Deduped);
        self.stage(task, TaskStage::Emitted);

        if duplicates > 0 {
            log::debug!("{task}: {emitted} new, {duplicates} already seen");
        }
        self.stage(task, TaskStage::Completed);
        self.progress.inc(1);
        TaskOutcome::Completed {
            emitted,
            duplicates,
        }
    }

    fn deliver(&self, record: &P::Record) {
        for sink in self.sinks.iter() {
            if let Err(e) = sink.deliver(record) {
                self.counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}: {} failed for {}", sink.name(), e, record.identifier());
            }
        }
    }

    fn fail(&self, task: &FetchTask, err: TaskError) -> TaskOutcome {
        self.stage(task, TaskStage::Failed);
        if err.is_cancelled() {
            log::debug!("{task}: {err}");
        } else {
            log::error!("{task}: {err}");
        }
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.progress.inc(1);
        TaskOutcome::Failed(err)
    }

    /// Count a task whose chain died without settling (panic).
    pub fn record_abort(&self, task: &FetchTask) -> TaskOutcome {
        self.fail(task, TaskError::Aborted)
    }
}
