//! Configuration loading from TOML files

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use papercrawl_core::config::DEFAULT_USER_AGENT;
use papercrawl_core::{PipelineConfig, StrategyKind};
use papercrawl_sources::Source;

/// Global configuration for papercrawl
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub dedup: DedupConfig,
    pub storage: StorageConfig,
    pub arxiv: ArxivConfig,
    pub biorxiv: BiorxivConfig,
    pub chemrxiv: ChemrxivConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    #[serde(alias = "mode", deserialize_with = "deserialize_strategy")]
    pub strategy: StrategyKind,
    pub max_connections: usize,
    /// Seconds
    pub request_timeout: u64,
    pub retry_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Seconds between consecutive requests of one worker
    pub delay_between_requests: f64,
    #[serde(deserialize_with = "deserialize_env_string")]
    pub user_agent: String,
    pub submit_delay_ms: u64,
    pub node_count: usize,
    pub node_latency_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Thread,
            max_connections: 20,
            request_timeout: 30,
            retry_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            delay_between_requests: 1.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            submit_delay_ms: 1000,
            node_count: 3,
            node_latency_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub expected_elements: usize,
    pub false_positive_rate: f64,
    /// Filter persisted across invocations when set
    #[serde(deserialize_with = "deserialize_env_path")]
    pub state_file: Option<PathBuf>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            expected_elements: 100_000,
            false_positive_rate: 0.01,
            state_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_env_string")]
    pub output_dir: String,
    #[serde(alias = "batch_size")]
    pub max_records_per_file: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: "./data".to_string(),
            max_records_per_file: papercrawl_sources::storage::DEFAULT_MAX_RECORDS_PER_FILE,
        }
    }
}

impl StorageConfig {
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    #[serde(deserialize_with = "deserialize_env_string")]
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_string")]
    pub search_query: String,
    pub max_results: usize,
    /// Entries per request
    pub page_size: usize,
    pub sort_by: String,
    pub sort_order: String,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: papercrawl_sources::arxiv::DEFAULT_BASE_URL.to_string(),
            search_query: "cat:cond-mat+OR+cat:quant-ph+OR+cat:physics.chem-ph+OR+cat:q-bio"
                .to_string(),
            max_results: 1000,
            page_size: 100,
            sort_by: "submittedDate".to_string(),
            sort_order: "descending".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BiorxivConfig {
    #[serde(deserialize_with = "deserialize_env_string")]
    pub base_url: String,
    pub interval: usize,
    pub max_results: usize,
}

impl Default for BiorxivConfig {
    fn default() -> Self {
        Self {
            base_url: papercrawl_sources::biorxiv::DEFAULT_BASE_URL.to_string(),
            interval: papercrawl_sources::biorxiv::DEFAULT_INTERVAL,
            max_results: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChemrxivConfig {
    #[serde(deserialize_with = "deserialize_env_string")]
    pub base_url: String,
    pub page_size: usize,
    pub max_results: usize,
}

impl Default for ChemrxivConfig {
    fn default() -> Self {
        Self {
            base_url: papercrawl_sources::chemrxiv::DEFAULT_BASE_URL.to_string(),
            page_size: papercrawl_sources::chemrxiv::DEFAULT_PAGE_SIZE,
            max_results: 1000,
        }
    }
}

fn deserialize_strategy<'de, D>(deserializer: D) -> Result<StrategyKind, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Deserialize a string that may contain environment variable references like ${VAR}
fn deserialize_env_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    expand_env_vars(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("unset environment variable in '{s}'")))
}

/// Unset variables yield `None` rather than an error
fn deserialize_env_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_vars(&s)).map(PathBuf::from))
}

/// Expand every ${VAR} in `s`; `None` if any referenced variable is unset
fn expand_env_vars(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        let Some(len) = rest[open + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 2..open + 2 + len];
        out.push_str(&std::env::var(name).ok()?);
        rest = &rest[open + 3 + len..];
    }
    out.push_str(rest);
    Some(out)
}

fn non_zero(name: &str, n: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(n).with_context(|| format!("{name} must be positive"))
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./papercrawl.toml (current directory)
    /// 2. ~/.config/papercrawl/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("papercrawl.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "papercrawl") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Items requested for `source` when the command line gives no count
    pub fn max_results(&self, source: Source) -> usize {
        match source {
            Source::Arxiv => self.arxiv.max_results,
            Source::Biorxiv => self.biorxiv.max_results,
            Source::Chemrxiv => self.chemrxiv.max_results,
        }
    }

    /// Pipeline settings for one source.
    ///
    /// bioRxiv and ChemRxiv page with a fixed window, so their task size is
    /// pinned to that window to keep task offsets aligned with API pages.
    pub fn pipeline_config(&self, source: Source) -> Result<PipelineConfig> {
        let crawler = &self.crawler;
        let page = match source {
            Source::Arxiv => self.arxiv.page_size,
            Source::Biorxiv => self.biorxiv.interval,
            Source::Chemrxiv => self.chemrxiv.page_size,
        };
        if !(crawler.delay_between_requests.is_finite() && crawler.delay_between_requests >= 0.0)
        {
            anyhow::bail!(
                "delay_between_requests must be a non-negative number of seconds, got {}",
                crawler.delay_between_requests
            );
        }

        Ok(PipelineConfig {
            max_attempts: crawler.retry_attempts,
            base_delay: Duration::from_millis(crawler.base_delay_ms),
            max_delay: Duration::from_millis(crawler.max_delay_ms),
            per_request_delay: Duration::from_secs_f64(crawler.delay_between_requests),
            timeout: Duration::from_secs(crawler.request_timeout),
            user_agent: crawler.user_agent.clone(),
            pool_size: non_zero("crawler.max_connections", crawler.max_connections)?,
            batch_size: non_zero(&format!("{source} page size"), page)?,
            total_items: self.max_results(source),
            strategy: crawler.strategy,
            submit_delay: Duration::from_millis(crawler.submit_delay_ms),
            node_count: non_zero("crawler.node_count", crawler.node_count)?,
            node_latency: Duration::from_millis(crawler.node_latency_ms),
            dedup_expected_elements: self.dedup.expected_elements,
            dedup_false_positive_rate: self.dedup.false_positive_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage.output_dir(), PathBuf::from("./data"));
        assert_eq!(config.storage.max_records_per_file, 50);
        assert_eq!(config.crawler.strategy, StrategyKind::Thread);
        assert_eq!(config.biorxiv.interval, 100);
        assert!(config.dedup.state_file.is_none());
    }

    #[test]
    fn expand_env_vars_whole_and_embedded() {
        std::env::set_var("PAPERCRAWL_TEST_CONTACT", "me@example.org");
        assert_eq!(
            expand_env_vars("${PAPERCRAWL_TEST_CONTACT}"),
            Some("me@example.org".to_string())
        );
        assert_eq!(
            expand_env_vars("bot (${PAPERCRAWL_TEST_CONTACT})"),
            Some("bot (me@example.org)".to_string())
        );
        std::env::remove_var("PAPERCRAWL_TEST_CONTACT");
    }

    #[test]
    fn expand_env_vars_literal() {
        assert_eq!(expand_env_vars("literal"), Some("literal".to_string()));
        assert_eq!(expand_env_vars("open ${ only"), Some("open ${ only".to_string()));
    }

    #[test]
    fn expand_env_vars_missing() {
        assert_eq!(expand_env_vars("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[crawler]
mode = "async"
max_connections = 8
delay_between_requests = 0.5

[storage]
output_dir = "/tmp/papers"
batch_size = 200

[biorxiv]
interval = 30
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.crawler.strategy, StrategyKind::Async);
        assert_eq!(config.crawler.max_connections, 8);
        assert_eq!(config.crawler.retry_attempts, 3);
        assert_eq!(config.storage.output_dir(), PathBuf::from("/tmp/papers"));
        assert_eq!(config.storage.max_records_per_file, 200);
        assert_eq!(config.biorxiv.interval, 30);
        assert_eq!(config.chemrxiv.page_size, 100);
    }

    #[test]
    fn unknown_strategy_rejected() {
        let err = toml::from_str::<Config>("[crawler]\nstrategy = \"fibers\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown strategy"));
    }

    #[test]
    fn unset_variable_in_string_rejected() {
        let toml = "[crawler]\nuser_agent = \"${NONEXISTENT_VAR_67890}\"\n";
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn unset_variable_in_state_file_is_none() {
        let toml = "[dedup]\nstate_file = \"${NONEXISTENT_VAR_67890}/bloom.bin\"\n";
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.dedup.state_file.is_none());
    }

    #[test]
    fn pipeline_config_per_source() {
        let mut config = Config::default();
        config.crawler.max_connections = 4;
        config.crawler.delay_between_requests = 0.25;
        config.biorxiv.interval = 30;
        config.chemrxiv.max_results = 77;

        let arxiv = config.pipeline_config(Source::Arxiv).unwrap();
        assert_eq!(arxiv.pool_size.get(), 4);
        assert_eq!(arxiv.batch_size.get(), 100);
        assert_eq!(arxiv.per_request_delay, Duration::from_millis(250));
        assert!(arxiv.validate().is_ok());

        let biorxiv = config.pipeline_config(Source::Biorxiv).unwrap();
        assert_eq!(biorxiv.batch_size.get(), 30);

        let chemrxiv = config.pipeline_config(Source::Chemrxiv).unwrap();
        assert_eq!(chemrxiv.total_items, 77);
    }

    #[test]
    fn pipeline_config_rejects_zero_sizes() {
        let mut config = Config::default();
        config.crawler.max_connections = 0;
        assert!(config.pipeline_config(Source::Arxiv).is_err());

        let mut config = Config::default();
        config.crawler.delay_between_requests = -1.0;
        assert!(config.pipeline_config(Source::Arxiv).is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("papercrawl.toml");
        std::fs::write(&path, "[arxiv]\nsearch_query = \"cat:cs.AI\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.arxiv.search_query, "cat:cs.AI");
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
