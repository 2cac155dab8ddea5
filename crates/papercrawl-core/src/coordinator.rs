//! Run lifecycle: plan tasks, execute a strategy, report counts

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::dedup::BloomFilter;
use crate::error::PipelineError;
use crate::fetch::{FetchExecutor, Transport};
use crate::partition::plan;
use crate::process::{Counters, TaskProcessor};
use crate::progress::{SharedProgress, fmt_num};
use crate::strategy::{Strategy, StrategyKind};
use crate::traits::{Parser, Sink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Cancelled,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// State one run shares between its thread, its handle and the coordinator.
#[derive(Debug)]
struct RunShared {
    counters: Arc<Counters>,
    cancel: CancellationToken,
    state: AtomicU8,
}

impl RunShared {
    fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            state: AtomicU8::new(RunState::Pending as u8),
        }
    }

    fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RunState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Final tallies of a settled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub source: String,
    pub strategy: StrategyKind,
    pub total_tasks: usize,
    /// Novel records emitted
    pub completed: usize,
    /// Tasks that ended in failure
    pub failed: usize,
    pub duplicates: usize,
    pub sink_errors: usize,
    /// Tasks never started because the run was stopped
    pub skipped: usize,
    pub state: RunState,
    pub elapsed: Duration,
}

impl RunSummary {
    fn collect(
        source: String,
        strategy: StrategyKind,
        total_tasks: usize,
        counters: &Counters,
        state: RunState,
        elapsed: Duration,
    ) -> Self {
        Self {
            source,
            strategy,
            total_tasks,
            completed: counters.completed(),
            failed: counters.failed(),
            duplicates: counters.duplicates(),
            sink_errors: counters.sink_errors(),
            skipped: counters.skipped(),
            state,
            elapsed,
        }
    }

    pub fn succeeded_tasks(&self) -> usize {
        self.total_tasks
            .saturating_sub(self.failed)
            .saturating_sub(self.skipped)
    }

    pub fn log(&self) {
        log::info!("=== {} Pipeline Summary ===", self.source);
        log::info!(
            "Tasks: {}/{} succeeded ({} failed, {} skipped) [{} strategy]",
            fmt_num(self.succeeded_tasks()),
            fmt_num(self.total_tasks),
            fmt_num(self.failed),
            fmt_num(self.skipped),
            self.strategy
        );
        log::info!(
            "Records: {} new, {} duplicates",
            fmt_num(self.completed),
            fmt_num(self.duplicates)
        );
        if self.sink_errors > 0 {
            log::warn!("Sink errors: {}", fmt_num(self.sink_errors));
        }
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.completed > 0 && !self.elapsed.is_zero() {
            let rate = self.completed as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {rate:.0} records/sec");
        }
        if self.state == RunState::Cancelled {
            log::warn!("Run was stopped before all tasks finished");
        }
    }
}

/// Handle to a started run.
pub struct RunHandle {
    shared: Arc<RunShared>,
    total_tasks: usize,
    thread: JoinHandle<Result<RunSummary, PipelineError>>,
}

impl RunHandle {
    /// Request cancellation. Sleeps and in-flight requests are interrupted,
    /// unstarted tasks are skipped. Idempotent.
    pub fn stop(&self) {
        if !self.shared.cancel.is_cancelled() {
            log::info!("Stopping run...");
            self.shared.cancel.cancel();
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    /// Token that stops this run when cancelled (e.g. from a signal handler).
    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    pub fn completed_count(&self) -> usize {
        self.shared.counters.completed()
    }

    pub fn failed_count(&self) -> usize {
        self.shared.counters.failed()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until every task has a terminal outcome.
    pub fn wait(self) -> Result<RunSummary, PipelineError> {
        self.thread.join().map_err(|_| PipelineError::Panicked)?
    }
}

/// Owns the fetch policy, dedup filter and sinks; starts runs against them.
pub struct Coordinator<P: Parser, T: Transport> {
    config: PipelineConfig,
    parser: Arc<P>,
    executor: Arc<FetchExecutor<T>>,
    dedup: Arc<BloomFilter>,
    sinks: Vec<Arc<dyn Sink<P::Record>>>,
    progress: Option<SharedProgress>,
    current: Mutex<Option<Arc<RunShared>>>,
}

impl<P: Parser, T: Transport> Coordinator<P, T> {
    pub fn new(config: PipelineConfig, parser: P, transport: T, dedup: Arc<BloomFilter>) -> Self {
        let executor = Arc::new(FetchExecutor::new(transport, config.fetch_config()));
        Self {
            config,
            parser: Arc::new(parser),
            executor,
            dedup,
            sinks: Vec::new(),
            progress: None,
            current: Mutex::new(None),
        }
    }

    /// Show a progress bar per run.
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Register a sink called once per novel record. Applies to runs started afterwards.
    pub fn on_record_processed(&mut self, sink: impl Sink<P::Record> + 'static) {
        self.sinks.push(Arc::new(sink));
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn dedup(&self) -> &Arc<BloomFilter> {
        &self.dedup
    }

    pub fn transport(&self) -> &T {
        self.executor.transport()
    }

    /// Plan `total` items and execute them under `kind` on a dedicated thread.
    pub fn start(&self, total: usize, kind: StrategyKind) -> Result<RunHandle, PipelineError> {
        self.config.validate()?;

        let source = self.parser.source_name().to_string();
        let tasks = plan(&source, total, kind, &self.config);
        let total_tasks = tasks.len();
        let strategy = Strategy::from_config(kind, &self.config);

        let shared = Arc::new(RunShared::new());
        let bar = match &self.progress {
            Some(progress) => progress.run_bar(&source, total_tasks),
            None => ProgressBar::hidden(),
        };
        let processor = Arc::new(
            TaskProcessor::new(
                Arc::clone(&self.parser),
                Arc::clone(&self.executor),
                Arc::clone(&self.dedup),
                self.sinks.clone().into(),
                Arc::clone(&shared.counters),
                shared.cancel.clone(),
            )
            .with_progress(bar.clone()),
        );

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&shared));

        log::info!(
            "Starting {source}: {} items in {} tasks ({kind} strategy)",
            fmt_num(total),
            fmt_num(total_tasks)
        );

        let run = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("papercrawl-run-{source}"))
            .spawn(move || {
                run.set_state(RunState::Running);
                let start = Instant::now();
                let result = strategy.execute(tasks, processor);
                bar.finish_and_clear();

                let state = if run.cancel.is_cancelled() {
                    RunState::Cancelled
                } else {
                    RunState::Completed
                };
                run.set_state(state);
                result?;

                let summary = RunSummary::collect(
                    source,
                    kind,
                    total_tasks,
                    &run.counters,
                    state,
                    start.elapsed(),
                );
                summary.log();
                Ok(summary)
            })
            .map_err(PipelineError::Runtime)?;

        Ok(RunHandle {
            shared,
            total_tasks,
            thread,
        })
    }

    pub fn stop(&self, handle: &RunHandle) {
        handle.stop();
    }

    fn current<R>(&self, f: impl FnOnce(&RunShared) -> R) -> Option<R> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .map(f)
    }

    /// Novel records emitted by the most recent run (0 before any run).
    pub fn completed_count(&self) -> usize {
        self.current(|run| run.counters.completed()).unwrap_or(0)
    }

    /// Failed tasks of the most recent run (0 before any run).
    pub fn failed_count(&self) -> usize {
        self.current(|run| run.counters.failed()).unwrap_or(0)
    }

    /// `start` + `wait`.
    pub fn run(&self, total: usize, kind: StrategyKind) -> Result<RunSummary, PipelineError> {
        self.start(total, kind)?.wait()
    }
}
