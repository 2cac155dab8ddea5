//! papercrawl - preprint metadata crawler
//!
//! Pages through arXiv, bioRxiv and ChemRxiv listings with bounded retry,
//! drops papers already seen and writes the rest as JSON lines.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "papercrawl")]
#[command(about = "Concurrent preprint metadata crawler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./papercrawl.toml or ~/.config/papercrawl/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Maximum attempts per request
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl one source or all of them
    Crawl(cmd::crawl::CrawlArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(papercrawl_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  - progress bars show activity
    //   non-TTY: info unless --quiet          - logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    papercrawl_core::init_logging(quiet, cli.debug, multi)?;

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // CLI overrides
    if let Some(attempts) = cli.max_retries {
        config.crawler.retry_attempts = attempts;
    }
    if let Some(timeout) = cli.timeout {
        config.crawler.request_timeout = timeout;
    }

    match cli.command {
        Command::Crawl(args) => cmd::crawl::run(args, &config, &progress),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let crawler = &config.crawler;
    table.add_row(vec!["Strategy", crawler.strategy.as_str()]);
    table.add_row(vec![
        "Max connections",
        &crawler.max_connections.to_string(),
    ]);
    table.add_row(vec![
        "Request timeout",
        &format!("{}s", crawler.request_timeout),
    ]);
    table.add_row(vec![
        "Retry",
        &format!(
            "{} attempts, {}ms base, {}ms cap",
            crawler.retry_attempts, crawler.base_delay_ms, crawler.max_delay_ms
        ),
    ]);
    table.add_row(vec![
        "Request delay",
        &format!("{}s", crawler.delay_between_requests),
    ]);
    table.add_row(vec!["User agent", &crawler.user_agent]);
    table.add_row(vec![
        "Nodes",
        &format!("{} ({}ms latency)", crawler.node_count, crawler.node_latency_ms),
    ]);
    table.add_row(vec![
        "Dedup",
        &format!(
            "{} expected, {} fp rate",
            config.dedup.expected_elements, config.dedup.false_positive_rate
        ),
    ]);
    table.add_row(vec![
        "Dedup state",
        &config
            .dedup
            .state_file
            .as_ref()
            .map_or_else(|| "not persisted".to_string(), |p| p.display().to_string()),
    ]);
    table.add_row(vec![
        "Output",
        &if config.storage.enabled {
            format!(
                "{} ({} records/file)",
                config.storage.output_dir, config.storage.max_records_per_file
            )
        } else {
            "disabled".to_string()
        },
    ]);
    table.add_row(vec!["arXiv URL", &config.arxiv.base_url]);
    table.add_row(vec!["arXiv query", &config.arxiv.search_query]);
    table.add_row(vec![
        "arXiv max results",
        &config.arxiv.max_results.to_string(),
    ]);
    table.add_row(vec!["bioRxiv URL", &config.biorxiv.base_url]);
    table.add_row(vec![
        "bioRxiv interval",
        &config.biorxiv.interval.to_string(),
    ]);
    table.add_row(vec!["ChemRxiv URL", &config.chemrxiv.base_url]);
    table.add_row(vec![
        "ChemRxiv page size",
        &config.chemrxiv.page_size.to_string(),
    ]);

    eprintln!("\n{table}");
}
