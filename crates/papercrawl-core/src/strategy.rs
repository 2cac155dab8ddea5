//! Concurrency strategies for a run
//!
//! All three share [`TaskProcessor::process`] and differ only in how tasks are
//! admitted and where they run:
//!
//! - `BoundedPool`: rayon pool, blocking admission once every worker is busy
//! - `AsyncPipeline`: every task spawned at once on a tokio runtime
//! - `PartitionedNodes`: one task per simulated node, then a processing delay

use std::fmt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fetch::Transport;
use crate::partition::FetchTask;
use crate::process::TaskProcessor;
use crate::retry::sleep_or_cancel;
use crate::semaphore::Semaphore;
use crate::traits::Parser;

/// Threads driving HTTP I/O for the blocking-pool strategies
const IO_THREADS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Thread,
    Async,
    Distributed,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [Self::Thread, Self::Async, Self::Distributed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Async => "async",
            Self::Distributed => "distributed",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(Self::Thread),
            "async" => Ok(Self::Async),
            "distributed" => Ok(Self::Distributed),
            other => Err(format!(
                "unknown strategy '{other}' (expected thread, async or distributed)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    BoundedPool {
        workers: NonZeroUsize,
        submit_delay: Duration,
    },
    AsyncPipeline {
        workers: NonZeroUsize,
    },
    PartitionedNodes {
        nodes: NonZeroUsize,
        workers: NonZeroUsize,
        processing_latency: Duration,
    },
}

impl Strategy {
    pub fn from_config(kind: StrategyKind, config: &PipelineConfig) -> Self {
        let workers = config.pool_size;
        match kind {
            StrategyKind::Thread => Self::BoundedPool {
                workers,
                submit_delay: config.submit_delay,
            },
            StrategyKind::Async => Self::AsyncPipeline { workers },
            StrategyKind::Distributed => Self::PartitionedNodes {
                nodes: config.node_count,
                workers,
                processing_latency: config.node_latency,
            },
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::BoundedPool { .. } => StrategyKind::Thread,
            Self::AsyncPipeline { .. } => StrategyKind::Async,
            Self::PartitionedNodes { .. } => StrategyKind::Distributed,
        }
    }

    /// Drive every task to a terminal outcome or until the run is stopped.
    ///
    /// Outcomes land in the processor's counters. Tasks never started count as skipped.
    pub fn execute<P: Parser, T: Transport>(
        &self,
        tasks: Vec<FetchTask>,
        processor: Arc<TaskProcessor<P, T>>,
    ) -> Result<(), PipelineError> {
        match *self {
            Self::BoundedPool {
                workers,
                submit_delay,
            } => run_bounded_pool(tasks, processor, workers, submit_delay),
            Self::AsyncPipeline { workers } => run_async_pipeline(tasks, processor, workers),
            Self::PartitionedNodes {
                nodes,
                workers,
                processing_latency,
            } => {
                if tasks.len() > nodes.get() {
                    log::warn!(
                        "{} partitions for {nodes} nodes, extra partitions share workers",
                        tasks.len()
                    );
                }
                run_partitioned(tasks, processor, workers, processing_latency)
            }
        }
    }
}

fn io_runtime() -> Result<tokio::runtime::Runtime, PipelineError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(IO_THREADS)
        .thread_name("papercrawl-io")
        .enable_all()
        .build()
        .map_err(PipelineError::Runtime)
}

fn worker_pool(workers: NonZeroUsize, role: &'static str) -> Result<rayon::ThreadPool, PipelineError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers.get())
        .thread_name(move |i| format!("papercrawl-{role}-{i}"))
        .build()?)
}

/// Run one task on a blocking worker, containing panics to this task.
///
/// Containment needs unwinding. Release builds set `panic = "abort"`, where a
/// panicking parser or sink ends the whole process instead; only dev and test
/// builds turn a panic into an aborted task.
fn run_blocking<P: Parser, T: Transport>(
    handle: &tokio::runtime::Handle,
    processor: &TaskProcessor<P, T>,
    task: &FetchTask,
    emit_delay: Duration,
) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        handle.block_on(processor.process(task, emit_delay))
    }));
    if result.is_err() {
        processor.record_abort(task);
    }
}

fn run_bounded_pool<P: Parser, T: Transport>(
    tasks: Vec<FetchTask>,
    processor: Arc<TaskProcessor<P, T>>,
    workers: NonZeroUsize,
    submit_delay: Duration,
) -> Result<(), PipelineError> {
    let pool = worker_pool(workers, "pool")?;
    let io = io_runtime()?;
    let handle = io.handle().clone();
    let permits = Semaphore::new(workers.get());
    let cancel = processor.cancel_token().clone();

    let total = tasks.len();
    let mut submitted = 0usize;
    pool.in_place_scope(|scope| {
        for (i, task) in tasks.into_iter().enumerate() {
            if i > 0 && !handle.block_on(sleep_or_cancel(submit_delay, &cancel)) {
                break;
            }
            // Blocks here while all workers are busy
            let Some(permit) = permits.acquire_unless(&cancel) else {
                break;
            };
            submitted += 1;
            let processor = &processor;
            let handle = &handle;
            scope.spawn(move |_| {
                let _permit = permit;
                run_blocking(handle, processor, &task, Duration::ZERO);
            });
        }
    });

    let unstarted = total - submitted;
    if unstarted > 0 {
        log::info!("Stopped with {unstarted} tasks never submitted");
        processor.counters().add_skipped(unstarted);
    }
    Ok(())
}

fn run_async_pipeline<P: Parser, T: Transport>(
    tasks: Vec<FetchTask>,
    processor: Arc<TaskProcessor<P, T>>,
    workers: NonZeroUsize,
) -> Result<(), PipelineError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers.get())
        .thread_name("papercrawl-async")
        .enable_all()
        .build()
        .map_err(PipelineError::Runtime)?;

    runtime.block_on(async {
        let chains: Vec<_> = tasks
            .iter()
            .map(|task| {
                let processor = Arc::clone(&processor);
                let task = task.clone();
                tokio::spawn(async move { processor.process(&task, Duration::ZERO).await })
            })
            .collect();

        let results = futures_util::future::join_all(chains).await;
        for (task, result) in tasks.iter().zip(results) {
            if let Err(e) = result {
                log::debug!("{task}: chain aborted: {e}");
                processor.record_abort(task);
            }
        }
    });
    Ok(())
}

fn run_partitioned<P: Parser, T: Transport>(
    tasks: Vec<FetchTask>,
    processor: Arc<TaskProcessor<P, T>>,
    workers: NonZeroUsize,
    processing_latency: Duration,
) -> Result<(), PipelineError> {
    let pool = worker_pool(workers, "node")?;
    let io = io_runtime()?;
    let handle = io.handle().clone();

    pool.in_place_scope(|scope| {
        for (node, task) in tasks.into_iter().enumerate() {
            let processor = &processor;
            let handle = &handle;
            scope.spawn(move |_| {
                log::debug!("node {node}: {task}");
                run_blocking(handle, processor, &task, processing_latency);
            });
        }
    });
    Ok(())
}
