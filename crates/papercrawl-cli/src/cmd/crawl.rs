//! Crawl subcommand - run the pipeline against one or all sources

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio_util::sync::CancellationToken;

use papercrawl_core::{
    BloomFilter, Coordinator, HttpTransport, Parser, PipelineConfig, RunState, RunSummary,
    SharedProgress, Sink, SinkError, StrategyKind, fmt_num,
};
use papercrawl_sources::{ArxivParser, BiorxivParser, ChemRxivParser, JsonlSink, Paper, Source};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Source to crawl
    #[arg(value_enum)]
    pub source: SourceArg,

    /// Concurrency strategy (thread, async, distributed)
    #[arg(short, long)]
    pub strategy: Option<StrategyKind>,

    /// Number of items to request per source
    #[arg(short = 'n', long)]
    pub total: Option<usize>,

    /// Maximum concurrent connections
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// arXiv search query
    #[arg(long)]
    pub query: Option<String>,

    /// Bloom filter file loaded before and saved after the crawl
    #[arg(long)]
    pub dedup_state: Option<PathBuf>,

    /// Fetch and deduplicate without writing output files
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum SourceArg {
    Arxiv,
    Biorxiv,
    Chemrxiv,
    /// Every source, one after another
    All,
}

impl SourceArg {
    fn sources(self) -> Vec<Source> {
        match self {
            Self::Arxiv => vec![Source::Arxiv],
            Self::Biorxiv => vec![Source::Biorxiv],
            Self::Chemrxiv => vec![Source::Chemrxiv],
            Self::All => Source::ALL.to_vec(),
        }
    }
}

/// Cancels the active run on SIGINT/SIGTERM; a second signal exits at once.
struct SignalWatch {
    active: Arc<Mutex<Option<CancellationToken>>>,
    interrupted: Arc<AtomicBool>,
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalWatch {
    fn install() -> Result<Self> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
        let handle = signals.handle();
        let active: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
        let interrupted = Arc::new(AtomicBool::new(false));

        let thread = {
            let active = Arc::clone(&active);
            let interrupted = Arc::clone(&interrupted);
            std::thread::Builder::new()
                .name("papercrawl-signals".into())
                .spawn(move || {
                    for signal in signals.forever() {
                        if interrupted.swap(true, Ordering::SeqCst) {
                            std::process::exit(130);
                        }
                        log::warn!("Received signal {signal}, stopping (again to force exit)");
                        if let Some(token) = active
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .as_ref()
                        {
                            token.cancel();
                        }
                    }
                })
                .context("Failed to spawn signal thread")?
        };

        Ok(Self {
            active,
            interrupted,
            handle,
            thread: Some(thread),
        })
    }

    fn arm(&self, token: CancellationToken) {
        // A signal may have landed before the run started
        if self.interrupted() {
            token.cancel();
        }
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn disarm(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

impl Drop for SignalWatch {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Everything a single source run needs besides its parser
struct RunContext<'a> {
    args: &'a CrawlArgs,
    config: &'a Config,
    dedup: &'a Arc<BloomFilter>,
    progress: &'a SharedProgress,
    signals: &'a SignalWatch,
}

pub fn run(args: CrawlArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let state_file = args
        .dedup_state
        .clone()
        .or_else(|| config.dedup.state_file.clone());
    let dedup = Arc::new(open_filter(state_file.as_deref(), config)?);
    let signals = SignalWatch::install()?;

    let ctx = RunContext {
        args: &args,
        config,
        dedup: &dedup,
        progress,
        signals: &signals,
    };

    let mut summaries = Vec::new();
    for source in args.source.sources() {
        if signals.interrupted() {
            progress.println(format!("Skipping {source} after interrupt"));
            continue;
        }
        summaries.push(crawl_source(source, &ctx)?);
    }
    drop(signals);

    if let Some(path) = &state_file {
        let line = progress.stage_line("dedup");
        line.set_message(format!("saving {}", path.display()));
        dedup
            .save(path)
            .with_context(|| format!("Failed to save dedup state to {}", path.display()))?;
        line.finish_and_clear();
    }

    print_summary(&summaries, &dedup);
    Ok(ExitCode::from(exit_status(&summaries)))
}

fn open_filter(state_file: Option<&std::path::Path>, config: &Config) -> Result<BloomFilter> {
    match state_file {
        Some(path) if path.exists() => {
            let filter = BloomFilter::load(path)
                .with_context(|| format!("Failed to load dedup state from {}", path.display()))?;
            log::info!("Dedup state: {}", filter.status());
            Ok(filter)
        }
        _ => BloomFilter::with_rate(config.dedup.expected_elements, config.dedup.false_positive_rate)
            .context("Invalid dedup configuration"),
    }
}

fn crawl_source(source: Source, ctx: &RunContext<'_>) -> Result<RunSummary> {
    let args = ctx.args;
    let mut pipeline = ctx.config.pipeline_config(source)?;
    if let Some(workers) = args.workers {
        pipeline.pool_size = std::num::NonZeroUsize::new(workers)
            .context("--workers must be positive")?;
    }
    if let Some(strategy) = args.strategy {
        pipeline.strategy = strategy;
    }
    if let Some(total) = args.total {
        pipeline.total_items = total;
    }

    match source {
        Source::Arxiv => {
            let arxiv = &ctx.config.arxiv;
            let query = args.query.as_deref().unwrap_or(&arxiv.search_query);
            let parser = ArxivParser::new(&arxiv.base_url, query)
                .with_sort(&arxiv.sort_by, &arxiv.sort_order);
            execute(parser, source, pipeline, ctx)
        }
        Source::Biorxiv => {
            let biorxiv = &ctx.config.biorxiv;
            let parser = BiorxivParser::new(&biorxiv.base_url, biorxiv.interval);
            execute(parser, source, pipeline, ctx)
        }
        Source::Chemrxiv => {
            let chemrxiv = &ctx.config.chemrxiv;
            let parser = ChemRxivParser::new(&chemrxiv.base_url, chemrxiv.page_size);
            execute(parser, source, pipeline, ctx)
        }
    }
}

fn execute<P>(
    parser: P,
    source: Source,
    pipeline: PipelineConfig,
    ctx: &RunContext<'_>,
) -> Result<RunSummary>
where
    P: Parser<Record = Paper>,
{
    let total = pipeline.total_items;
    let kind = pipeline.strategy;
    let transport = HttpTransport::new(&pipeline.user_agent, pipeline.pool_size.get())
        .context("Failed to build HTTP client")?;

    let mut coordinator = Coordinator::new(pipeline, parser, transport, Arc::clone(ctx.dedup))
        .with_progress(ctx.progress.clone());

    let sink = if ctx.args.dry_run || !ctx.config.storage.enabled {
        log::debug!("Not writing {source} output");
        None
    } else {
        let output_dir = ctx
            .args
            .output
            .clone()
            .unwrap_or_else(|| ctx.config.storage.output_dir())
            .join(source.as_str());
        let sink = JsonlSink::create(
            &output_dir,
            source.as_str(),
            ctx.config.storage.max_records_per_file,
        )?;
        Some(Arc::new(sink))
    };
    if let Some(sink) = &sink {
        let sink = Arc::clone(sink);
        coordinator.on_record_processed(move |paper: &Paper| -> Result<(), SinkError> {
            sink.deliver(paper)
        });
    }
    log::info!("Crawling {source}");
    let handle = coordinator.start(total, kind)?;
    ctx.signals.arm(handle.cancel_token());
    let result = handle.wait();
    ctx.signals.disarm();
    let summary = result?;

    if let Some(sink) = sink {
        sink.finalize()
            .with_context(|| format!("Failed to finalize {source} output"))?;
    }
    Ok(summary)
}

/// 130 after an interrupted run, 1 when any task failed, 0 otherwise
fn exit_status(summaries: &[RunSummary]) -> u8 {
    if summaries.iter().any(|s| s.state == RunState::Cancelled) {
        130
    } else if summaries.iter().any(|s| s.failed > 0) {
        1
    } else {
        0
    }
}

/// Print a per-source summary table on stderr
fn print_summary(summaries: &[RunSummary], dedup: &BloomFilter) {
    if summaries.is_empty() {
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            [
                "Source", "Strategy", "Tasks", "Records", "Duplicates", "Failed", "Skipped",
                "Sink errors", "Time", "State",
            ]
            .map(|h| Cell::new(h).fg(Color::Cyan)),
        );
    for s in summaries {
        let state = match s.state {
            RunState::Cancelled => Cell::new("cancelled").fg(Color::Yellow),
            _ if s.failed > 0 => Cell::new("partial").fg(Color::Red),
            _ => Cell::new("ok").fg(Color::Green),
        };
        table.add_row(vec![
            Cell::new(&s.source),
            Cell::new(s.strategy),
            Cell::new(format!("{}/{}", fmt_num(s.succeeded_tasks()), fmt_num(s.total_tasks))),
            Cell::new(fmt_num(s.completed)),
            Cell::new(fmt_num(s.duplicates)),
            Cell::new(fmt_num(s.failed)),
            Cell::new(fmt_num(s.skipped)),
            Cell::new(fmt_num(s.sink_errors)),
            Cell::new(format!("{:.1}s", s.elapsed.as_secs_f64())),
            state,
        ]);
    }
    eprintln!("\n{table}");
    eprintln!("Dedup filter: {}", dedup.status());
}
