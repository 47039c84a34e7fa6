use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use anyhow::{ensure, Context, Result};
use shared::protocol::{DEFAULT_CANARY_LABEL, DEFAULT_USER_AGENT, PLAYLIST_SIGNATURE};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub precheck: PrecheckConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub m3u: M3uConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Token the body prefix must contain
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_accepted_status")]
    pub accepted_status: Vec<u16>,
    /// Upper bound on body bytes read per probe
    #[serde(default = "default_read_limit")]
    pub read_limit_bytes: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrecheckConfig {
    #[serde(default = "default_precheck_workers")]
    pub workers: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryPolicy {
    /// Stop a sweep at the first live sibling and move the whole group there
    #[default]
    FirstHit,
    /// Sweep the whole block; every live sibling becomes its own record
    FullSweep,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_workers")]
    pub workers: usize,
    /// Groups swept at the same time, each with its own pool of `workers`
    #[serde(default = "default_group_parallelism")]
    pub group_parallelism: usize,
    #[serde(default)]
    pub policy: RecoveryPolicy,
    #[serde(default = "default_canary_label")]
    pub canary_label: String,
    #[serde(default = "default_recovery_retry")]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupKey {
    /// One record per address:port
    #[default]
    HostPort,
    /// One record per address, whatever the port
    Host,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub dedup_key: DedupKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// Append the measured latency to each group header
    #[serde(default = "default_annotate_latency")]
    pub annotate_latency: bool,
    /// Where to write the JSON run summary, if anywhere
    #[serde(default)]
    pub summary_path: Option<PathBuf>,
    /// Leave the output file alone when its endpoint set has not changed
    #[serde(default = "default_skip_unchanged")]
    pub skip_unchanged: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct M3uConfig {
    #[serde(default = "default_epg_url")]
    pub epg_url: String,
    #[serde(default = "default_logo_base_url")]
    pub logo_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Retention {
    #[default]
    Earliest,
    Latest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub retention: Retention,
    /// Extensions read by `aggregate`
    #[serde(default = "default_history_extensions")]
    pub extensions: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_signature() -> String {
    PLAYLIST_SIGNATURE.to_string()
}

fn default_accepted_status() -> Vec<u16> {
    vec![200, 206]
}

fn default_read_limit() -> usize {
    512
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    4000
}

fn default_precheck_workers() -> usize {
    50
}

fn default_recovery_workers() -> usize {
    50
}

fn default_group_parallelism() -> usize {
    2
}

fn default_canary_label() -> String {
    DEFAULT_CANARY_LABEL.to_string()
}

/// Sweeps probe hundreds of mostly-dead hosts; one attempt each
fn default_recovery_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("revived_hotel.txt")
}

fn default_annotate_latency() -> bool {
    true
}

fn default_skip_unchanged() -> bool {
    true
}

fn default_epg_url() -> String {
    "https://live.fanmingming.com/e.xml".to_string()
}

fn default_logo_base_url() -> String {
    "https://live.fanmingming.com/tv/".to_string()
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_history_extensions() -> Vec<String> {
    vec!["m3u".to_string(), "txt".to_string(), "list".to_string()]
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            signature: default_signature(),
            accepted_status: default_accepted_status(),
            read_limit_bytes: default_read_limit(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for PrecheckConfig {
    fn default() -> Self {
        Self {
            workers: default_precheck_workers(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            workers: default_recovery_workers(),
            group_parallelism: default_group_parallelism(),
            policy: RecoveryPolicy::default(),
            canary_label: default_canary_label(),
            retry: default_recovery_retry(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            annotate_latency: default_annotate_latency(),
            summary_path: None,
            skip_unchanged: default_skip_unchanged(),
        }
    }
}

impl Default for M3uConfig {
    fn default() -> Self {
        Self {
            epg_url: default_epg_url(),
            logo_base_url: default_logo_base_url(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
            retention: Retention::default(),
            extensions: default_history_extensions(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.probe.timeout_ms > 0, "probe.timeout_ms must be positive");
        ensure!(!self.probe.signature.is_empty(), "probe.signature must not be empty");
        ensure!(!self.probe.accepted_status.is_empty(), "probe.accepted_status must not be empty");
        ensure!(self.probe.read_limit_bytes > 0, "probe.read_limit_bytes must be positive");
        ensure!(self.precheck.workers > 0, "precheck.workers must be positive");
        ensure!(self.recovery.workers > 0, "recovery.workers must be positive");
        ensure!(self.recovery.group_parallelism > 0, "recovery.group_parallelism must be positive");
        ensure!(self.precheck.retry.max_attempts > 0, "precheck.retry.max_attempts must be positive");
        ensure!(self.recovery.retry.max_attempts > 0, "recovery.retry.max_attempts must be positive");
        Ok(())
    }
}
