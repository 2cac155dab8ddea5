//! Read-only run configuration injected into the [`Coordinator`](crate::Coordinator)

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::error::PipelineError;
use crate::fetch::FetchConfig;
use crate::strategy::StrategyKind;

const DEFAULT_POOL_SIZE: NonZeroUsize = NonZeroUsize::new(20).unwrap();
const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(100).unwrap();
const DEFAULT_NODE_COUNT: NonZeroUsize = NonZeroUsize::new(3).unwrap();

pub const DEFAULT_USER_AGENT: &str = concat!("papercrawl/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    // Fetch policy
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub per_request_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,

    // Scheduling
    /// Worker count for every strategy (max concurrent connections)
    pub pool_size: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub total_items: usize,
    pub strategy: StrategyKind,
    /// Pause between submissions in the bounded pool
    pub submit_delay: Duration,
    pub node_count: NonZeroUsize,
    /// Simulated per-node processing time before emission
    pub node_latency: Duration,

    // Dedup sizing
    pub dedup_expected_elements: usize,
    pub dedup_false_positive_rate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        Self {
            max_attempts: fetch.max_attempts,
            base_delay: fetch.base_delay,
            max_delay: fetch.max_delay,
            per_request_delay: fetch.per_request_delay,
            timeout: fetch.timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            total_items: 1000,
            strategy: StrategyKind::Thread,
            submit_delay: Duration::from_secs(1),
            node_count: DEFAULT_NODE_COUNT,
            node_latency: Duration::from_secs(1),
            dedup_expected_elements: 100_000,
            dedup_false_positive_rate: 0.01,
        }
    }
}

impl PipelineConfig {
    /// Reject values no run can work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.timeout.is_zero() {
            return Err(PipelineError::Config("timeout must be positive".into()));
        }
        if self.dedup_expected_elements == 0 {
            return Err(PipelineError::Config(
                "dedup_expected_elements must be positive".into(),
            ));
        }
        let p = self.dedup_false_positive_rate;
        if !(p > 0.0 && p < 1.0) {
            return Err(PipelineError::Config(format!(
                "dedup_false_positive_rate must be in (0, 1), got {p}"
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(PipelineError::Config("user_agent must not be empty".into()));
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            per_request_delay: self.per_request_delay,
            timeout: self.timeout,
        }
    }
}
