//! Run configuration
//!
//! Everything comes from CLI flags with environment fallbacks; a `.env` file
//! is loaded first by the binary. The API key has no default anywhere and its
//! absence is a fatal configuration error.

use crate::client::{
    SchoolQuery, DEFAULT_BASE_URL, DEFAULT_FILTER_FIELD, DEFAULT_TIMEOUT_SECS,
};
use crate::engine::{EngineOptions, DEFAULT_FLUSH_EVERY};
use crate::normalizer::Normalizer;
use crate::paginator::{
    PaginatorConfig, DEFAULT_MAX_PAGES, DEFAULT_PAGE_DELAY_MS, DEFAULT_PAGE_SIZE,
};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::store::{DEFAULT_CHECKPOINT_PATH, DEFAULT_SNAPSHOT_PATH};
use clap::Parser;
use scorecard_common::{Result, SyncError};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "COLLEGE_SCORECARD_API_KEY";

/// Largest page size the Scorecard API accepts
pub const MAX_PAGE_SIZE: u32 = 100;

/// Scorecard Sync - incremental College Scorecard snapshot
#[derive(Parser, Debug, Clone)]
#[command(name = "scorecard-sync")]
#[command(author, version)]
#[command(about = "Incrementally sync College Scorecard schools into a local JSON snapshot")]
pub struct Cli {
    /// API key for api.data.gov
    #[arg(long, env = "COLLEGE_SCORECARD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Narrow the fetch to records matching this value
    #[arg(long, env = "SCORECARD_FILTER")]
    pub filter: Option<String>,

    /// Query parameter the filter is sent as
    #[arg(long, default_value = DEFAULT_FILTER_FIELD)]
    pub filter_field: String,

    /// Schools endpoint
    #[arg(long, env = "SCORECARD_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Snapshot file
    #[arg(short, long, default_value = DEFAULT_SNAPSHOT_PATH)]
    pub output: PathBuf,

    /// Checkpoint file
    #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
    pub checkpoint: PathBuf,

    /// Records per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Hard ceiling on pages fetched per run
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    /// Pages accumulated between snapshot writes
    #[arg(long, default_value_t = DEFAULT_FLUSH_EVERY)]
    pub flush_every: u32,

    /// Pause between page requests, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PAGE_DELAY_MS)]
    pub page_delay_ms: u64,

    /// Attempts per page before the run fails
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Send 1-based page numbers instead of the API's 0-based ones
    #[arg(long)]
    pub one_based_pages: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated settings for one run
#[derive(Clone)]
pub struct SyncConfig {
    pub api_key: String,
    pub base_url: String,
    pub filter: Option<String>,
    pub filter_field: String,
    pub output: PathBuf,
    pub checkpoint: PathBuf,
    pub page_size: u32,
    pub max_pages: u32,
    pub flush_every: u32,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub zero_based_pages: bool,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("filter", &self.filter)
            .field("filter_field", &self.filter_field)
            .field("output", &self.output)
            .field("checkpoint", &self.checkpoint)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("flush_every", &self.flush_every)
            .field("page_delay", &self.page_delay)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("zero_based_pages", &self.zero_based_pages)
            .finish()
    }
}

impl SyncConfig {
    /// Build and validate from parsed CLI arguments
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let api_key = cli
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                SyncError::config(format!(
                    "{API_KEY_ENV} is not set. Pass --api-key or export the variable."
                ))
            })?
            .to_string();

        let filter = cli
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);

        let config = Self {
            api_key,
            base_url: cli.base_url.trim_end_matches('/').to_string(),
            filter,
            filter_field: cli.filter_field.clone(),
            output: cli.output.clone(),
            checkpoint: cli.checkpoint.clone(),
            page_size: cli.page_size,
            max_pages: cli.max_pages,
            flush_every: cli.flush_every,
            page_delay: Duration::from_millis(cli.page_delay_ms),
            retry: RetryPolicy::default().with_max_attempts(cli.max_attempts),
            timeout: Duration::from_secs(cli.timeout_secs),
            zero_based_pages: !cli.one_based_pages,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::config(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.max_pages == 0 {
            return Err(SyncError::config("max pages must be at least 1"));
        }
        if self.flush_every == 0 {
            return Err(SyncError::config("flush interval must be at least 1 page"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::config("max attempts must be at least 1"));
        }
        if self.filter.is_some() && self.filter_field.trim().is_empty() {
            return Err(SyncError::config("a filter needs a non-empty filter field"));
        }
        if self.output == self.checkpoint {
            return Err(SyncError::config("snapshot and checkpoint must be different files"));
        }
        Ok(())
    }

    /// Fixed query for every page request
    pub fn school_query(&self, normalizer: &Normalizer) -> SchoolQuery {
        SchoolQuery {
            api_key: self.api_key.clone(),
            fields: normalizer.remote_fields(),
            filter: self
                .filter
                .clone()
                .map(|value| (self.filter_field.clone(), value)),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            paginator: PaginatorConfig {
                page_size: self.page_size,
                max_pages: self.max_pages,
                page_delay: self.page_delay,
            },
            flush_every: self.flush_every,
            filter: self.filter.clone(),
        }
    }
}
