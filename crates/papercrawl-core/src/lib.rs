//! Papercrawl Core - concurrent fetch-retry-dedup-dispatch pipeline
//!
//! Partitions a listing into fetch tasks, runs them under one of three
//! concurrency strategies with bounded retry on every request, drops records
//! already seen by a shared bloom filter and reports completion counts.

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod partition;
pub mod process;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod strategy;
pub mod traits;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use coordinator::{Coordinator, RunHandle, RunState, RunSummary};
pub use dedup::{BloomFilter, optimal_params};
pub use error::{
    DedupError, FailureKind, ParseError, PipelineError, SinkError, TaskError, TransportError,
};
pub use fetch::{
    FetchConfig, FetchExecutor, FetchOutcome, FetchRequest, HttpTransport, Method, RawResponse,
    Transport,
};
pub use logging::{IndicatifLogger, init_logging};
pub use partition::{FetchTask, batch_tasks, node_tasks};
pub use process::{Counters, TaskOutcome, TaskStage};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::backoff_duration;
pub use strategy::{Strategy, StrategyKind};
pub use traits::{Parser, Record, Sink};
