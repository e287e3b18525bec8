//! Configuration management for sheetqa.
//!
//! Supports configuration via CLI arguments, environment variables,
//! and a JSON configuration file with sensible defaults.

use crate::error::{Result, SheetQaError};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI arguments for the sheetqa tool.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sheetqa",
    version,
    about = "Answer every question in a spreadsheet with an LLM",
    long_about = "sheetqa reads a spreadsheet whose first column holds questions, asks a chat-completions\n\
                  model each one in small concurrent batches with retries, and writes the table back\n\
                  with 'Answers' and 'Processing Time (seconds)' columns appended.",
    after_help = "EXAMPLES:\n    \
        sheetqa --input questions.xlsx\n    \
        sheetqa -i questions.csv -o answers.csv --batch-size 10\n    \
        sheetqa --config sheetqa.json --input questions.xlsx --dry-run"
)]
pub struct Args {
    /// Spreadsheet with one question per row in the first column
    #[arg(short, long, env = "SHEETQA_INPUT")]
    pub input: PathBuf,

    /// Where to write the answered table
    #[arg(short, long, default_value = "processed_results.xlsx", env = "SHEETQA_OUTPUT")]
    pub output: PathBuf,

    /// API key for the completion endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier
    #[arg(short, long, env = "SHEETQA_MODEL")]
    pub model: Option<String>,

    /// Base URL of the chat-completions API
    #[arg(long, env = "SHEETQA_BASE_URL")]
    pub base_url: Option<String>,

    /// Maximum tokens per answer
    #[arg(long, env = "SHEETQA_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Questions sent concurrently per batch
    #[arg(short, long, env = "SHEETQA_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Maximum attempts per question
    #[arg(short = 'a', long, env = "SHEETQA_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Request timeout in seconds
    #[arg(short, long, env = "SHEETQA_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Path to a JSON configuration file
    #[arg(short, long, env = "SHEETQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of answered rows to print after the run
    #[arg(long, default_value = "5", env = "SHEETQA_PREVIEW")]
    pub preview: usize,

    /// Enable verbose logging
    #[arg(short, long, env = "SHEETQA_VERBOSE")]
    pub verbose: bool,

    /// Output logs as JSON
    #[arg(long, env = "SHEETQA_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable progress bar
    #[arg(long, env = "SHEETQA_NO_PROGRESS")]
    pub no_progress: bool,

    /// Dry run - validate config and input without calling the API
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Batching settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Completion API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Secret credential. Never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum output tokens per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-attempt request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Questions in flight at once.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Upper bound on any single delay.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomize each delay by ±25%.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Retry settings with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SheetQaError::InputFileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| SheetQaError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Create configuration from CLI arguments, layered over the config file if given.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(key) = &args.api_key {
            config.api.api_key = Some(key.clone());
        }
        if let Some(model) = &args.model {
            config.api.model = model.clone();
        }
        if let Some(base_url) = &args.base_url {
            config.api.base_url = base_url.clone();
        }
        if let Some(max_tokens) = args.max_tokens {
            config.api.max_tokens = max_tokens;
        }
        if let Some(timeout) = args.timeout {
            config.api.timeout = Duration::from_secs(timeout);
        }
        if let Some(batch_size) = args.batch_size {
            config.batch.batch_size = batch_size;
        }
        if let Some(max_attempts) = args.max_attempts {
            config.retry.max_attempts = max_attempts;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(SheetQaError::InvalidConfig(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SheetQaError::InvalidConfig(
                "max attempts must be greater than 0".to_string(),
            ));
        }
        if self.api.model.trim().is_empty() {
            return Err(SheetQaError::InvalidConfig(
                "model cannot be empty".to_string(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(SheetQaError::InvalidConfig(
                "base URL cannot be empty".to_string(),
            ));
        }
        if self.api.timeout.is_zero() {
            return Err(SheetQaError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier > 0.0) {
            return Err(SheetQaError::InvalidConfig(
                "backoff multiplier must be a positive number".to_string(),
            ));
        }
        if self.api.max_tokens == 0 {
            return Err(SheetQaError::InvalidConfig(
                "max tokens must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Custom serde module for humantime Duration parsing.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // "ms" must be checked before "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
