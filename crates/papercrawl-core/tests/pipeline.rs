//! End-to-end runs against an in-memory transport

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use papercrawl_core::{
    BloomFilter, Coordinator, FetchRequest, ParseError, Parser, PipelineConfig, RawResponse,
    Record, RunState, SinkError, StrategyKind, Transport, TransportError,
};

#[derive(Debug, Clone)]
struct Item(String);

impl Record for Item {
    fn identifier(&self) -> &str {
        &self.0
    }
}

/// `mem://{start}/{count}`; body is one id per line
struct LineParser;

impl Parser for LineParser {
    type Record = Item;

    fn build_query_url(&self, start: usize, count: usize) -> String {
        format!("mem://{start}/{count}")
    }

    fn parse_many(&self, body: &[u8]) -> Result<Vec<Item>, ParseError> {
        let text = std::str::from_utf8(body).map_err(|e| ParseError::new(e.to_string()))?;
        Ok(text
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| Item(l.to_string()))
            .collect())
    }

    fn source_name(&self) -> &str {
        "mem"
    }
}

fn parse_url(url: &str) -> (usize, usize) {
    let rest = url.trim_start_matches("mem://");
    let (start, count) = rest.split_once('/').unwrap();
    (start.parse().unwrap(), count.parse().unwrap())
}

/// Serves ids `{start}..{start+count}`; pages whose start is in `failing` always 500.
#[derive(Default)]
struct MemTransport {
    failing: HashSet<usize>,
    status_override: Option<u16>,
    fixed_ids: Option<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: AtomicUsize,
}

impl Transport for MemTransport {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (start, count) = parse_url(&request.url);
        if let Some(status) = self.status_override {
            return Ok(RawResponse {
                status,
                body: Vec::new(),
            });
        }
        if self.failing.contains(&start) {
            return Ok(RawResponse {
                status: 500,
                body: Vec::new(),
            });
        }
        let body = match &self.fixed_ids {
            Some(ids) => ids.join("\n"),
            None => (start..start + count)
                .map(|i| format!("id-{i}"))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        Ok(RawResponse {
            status: 200,
            body: body.into_bytes(),
        })
    }
}

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn fast_config(pool: usize, batch: usize) -> PipelineConfig {
    PipelineConfig {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        per_request_delay: Duration::ZERO,
        submit_delay: Duration::ZERO,
        node_latency: Duration::from_millis(5),
        pool_size: nz(pool),
        batch_size: nz(batch),
        ..PipelineConfig::default()
    }
}

fn dedup() -> Arc<BloomFilter> {
    Arc::new(BloomFilter::with_rate(100_000, 0.001).unwrap())
}

/// Deterministic page selection from a seed (xorshift)
fn seeded_failures(seed: u64, pages: usize, batch: usize) -> HashSet<usize> {
    let mut x = seed;
    (0..pages)
        .filter(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            x % 4 == 0
        })
        .map(|page| page * batch)
        .collect()
}

/// Run `items` through `kind` with a fresh filter; returns `(completed, failed)`.
fn conserved_run(
    kind: StrategyKind,
    items: usize,
    failing: &HashSet<usize>,
    expected_tasks: usize,
    expected_requests: usize,
) -> (usize, usize) {
    let transport = MemTransport {
        failing: failing.clone(),
        ..MemTransport::default()
    };
    let coordinator = Coordinator::new(fast_config(4, 100), LineParser, transport, dedup());
    let summary = coordinator.run(items, kind).unwrap();

    assert_eq!(summary.state, RunState::Completed, "{kind}");
    assert_eq!(summary.total_tasks, expected_tasks, "{kind}");
    assert_eq!(summary.skipped, 0, "{kind}");
    assert_eq!(summary.failed, failing.len(), "{kind}");
    assert_eq!(summary.duplicates, 0, "{kind}");
    assert_eq!(coordinator.completed_count(), summary.completed);
    assert_eq!(coordinator.failed_count(), summary.failed);
    // Failing pages used all 3 attempts, others one
    assert_eq!(
        coordinator.transport().requests.load(Ordering::SeqCst),
        expected_requests,
        "{kind}"
    );
    (summary.completed, summary.failed)
}

#[test]
fn counter_conservation_all_strategies() {
    let failing = seeded_failures(0x5eed, 10, 100);
    assert!(!failing.is_empty() && failing.len() < 10);
    let expected = ((10 - failing.len()) * 100, failing.len());
    let requests = failing.len() * 3 + (10 - failing.len());

    for kind in [StrategyKind::Thread, StrategyKind::Async] {
        let first = conserved_run(kind, 1000, &failing, 10, requests);
        let second = conserved_run(kind, 1000, &failing, 10, requests);
        assert_eq!(first, expected, "{kind}");
        assert_eq!(first, second, "{kind}: same seed, same counts");
    }

    // 3 nodes over 1000 items: partitions start at 0, 333 and 666
    let node_failing: HashSet<usize> = [333].into();
    let first = conserved_run(StrategyKind::Distributed, 1000, &node_failing, 3, 3 + 2);
    let second = conserved_run(StrategyKind::Distributed, 1000, &node_failing, 3, 3 + 2);
    assert_eq!(first, (666, 1));
    assert_eq!(first, second, "distributed: same seed, same counts");
}

#[test]
fn distributed_one_fetch_per_node() {
    let coordinator = Coordinator::new(
        fast_config(3, 100),
        LineParser,
        MemTransport::default(),
        dedup(),
    );
    let summary = coordinator.run(1000, StrategyKind::Distributed).unwrap();
    assert_eq!(summary.total_tasks, 3);
    assert_eq!(summary.completed, 999);
    assert_eq!(summary.failed, 0);
    assert_eq!(coordinator.transport().requests.load(Ordering::SeqCst), 3);
}

#[test]
fn duplicate_delivered_once() {
    let transport = MemTransport {
        fixed_ids: Some(vec!["X".to_string()]),
        ..MemTransport::default()
    };
    let mut coordinator = Coordinator::new(fast_config(2, 1), LineParser, transport, dedup());
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    coordinator.on_record_processed(move |item: &Item| -> Result<(), SinkError> {
        sink.lock().unwrap().push(item.0.clone());
        Ok(())
    });

    let summary = coordinator.run(2, StrategyKind::Thread).unwrap();
    assert_eq!(summary.total_tasks, 2);
    assert_eq!(*delivered.lock().unwrap(), vec!["X"]);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.duplicates, 1);
}

#[test]
fn dedup_state_spans_runs() {
    let filter = dedup();
    let first = Coordinator::new(
        fast_config(2, 50),
        LineParser,
        MemTransport::default(),
        Arc::clone(&filter),
    );
    assert_eq!(first.run(100, StrategyKind::Async).unwrap().completed, 100);

    let second = Coordinator::new(
        fast_config(2, 50),
        LineParser,
        MemTransport::default(),
        Arc::clone(&filter),
    );
    let summary = second.run(100, StrategyKind::Thread).unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.duplicates, 100);
}

#[test]
fn pool_bounds_in_flight_requests() {
    let transport = MemTransport {
        latency: Duration::from_millis(20),
        ..MemTransport::default()
    };
    let coordinator = Coordinator::new(fast_config(2, 10), LineParser, transport, dedup());
    let summary = coordinator.run(100, StrategyKind::Thread).unwrap();
    assert_eq!(summary.total_tasks, 10);
    assert_eq!(summary.completed, 100);
    let max = coordinator.transport().max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 2, "{max} requests in flight with a pool of 2");
    assert!(max >= 1);
}

#[test]
fn total_failure_still_completes() {
    let transport = MemTransport {
        status_override: Some(404),
        ..MemTransport::default()
    };
    let coordinator = Coordinator::new(fast_config(4, 10), LineParser, transport, dedup());
    for kind in StrategyKind::ALL {
        let summary = coordinator.run(100, kind).unwrap();
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed, summary.total_tasks, "{kind}");
    }
}

#[test]
fn empty_run() {
    let coordinator = Coordinator::new(
        fast_config(2, 10),
        LineParser,
        MemTransport::default(),
        dedup(),
    );
    assert_eq!(coordinator.completed_count(), 0);
    let summary = coordinator.run(0, StrategyKind::Thread).unwrap();
    assert_eq!(summary.total_tasks, 0);
    assert_eq!(summary.state, RunState::Completed);
}

#[test]
fn stop_interrupts_run() {
    let transport = MemTransport {
        latency: Duration::from_secs(30),
        ..MemTransport::default()
    };
    let config = PipelineConfig {
        submit_delay: Duration::from_millis(10),
        ..fast_config(2, 10)
    };
    let coordinator = Coordinator::new(config, LineParser, transport, dedup());
    let handle = coordinator.start(100, StrategyKind::Thread).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.state(), RunState::Running);

    let begun = Instant::now();
    coordinator.stop(&handle);
    let summary = handle.wait().unwrap();
    assert!(begun.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.state, RunState::Cancelled);
    assert_eq!(summary.completed, 0);
    // Two in-flight tasks were interrupted, the rest never ran
    assert_eq!(summary.failed + summary.skipped, 10);
    assert!(summary.skipped >= 8);
}

#[test]
fn invalid_config_rejected_at_start() {
    let config = PipelineConfig {
        dedup_false_positive_rate: 2.0,
        ..fast_config(2, 10)
    };
    let coordinator = Coordinator::new(config, LineParser, MemTransport::default(), dedup());
    assert!(coordinator.start(10, StrategyKind::Thread).is_err());
}
