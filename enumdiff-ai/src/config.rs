//! Configuration resolution for enumdiff-ai
//!
//! Every setting resolves with CLI → ENV → TOML → compiled default priority.
//! Most CLI flags carry their environment variable through clap; the API key
//! is resolved explicitly so that a key present in several places is
//! reported.

use crate::models::{PolicyParameters, ProviderMode, SchedulerParameters, SimilarityMetric};
use crate::services::analysis_client::{
    ClientSettings, TierSettings, DEFAULT_CHAT_MODEL, DEFAULT_ENDPOINT, DEFAULT_REASONER_MODEL,
};
use crate::services::RetryPolicy;
use crate::workflow::PipelineConfig;
use clap::Parser;
use enumdiff_common::config::TomlConfig;
use enumdiff_common::{Error, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "enumdiff_out";

/// Cache file name inside the output directory
pub const DEFAULT_CACHE_FILE: &str = "cache.sqlite";

/// Default client-side request rate
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

/// Command line
#[derive(Debug, Clone, Parser)]
#[command(
    name = "enumdiff-ai",
    version,
    about = "Detect vocabulary values missing from a known catalog and propose reviewable additions"
)]
pub struct Cli {
    /// Paragraphs to analyze (JSON Lines of {doc_id, locator, text})
    #[arg(long, value_name = "FILE", required_unless_present = "check")]
    pub paragraphs: Option<PathBuf>,

    /// Known-vocabulary catalog (JSON)
    #[arg(long, value_name = "FILE", required_unless_present = "check")]
    pub catalog: Option<PathBuf>,

    /// Output directory for proposals, review records and summary
    #[arg(long, short = 'o', value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Which model tiers to use
    #[arg(long, value_enum)]
    pub provider_mode: Option<ProviderMode>,

    /// Parallel analysis workers
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Pending-paragraph queue bound
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Minimum distinct documents for ADD_NEW
    #[arg(long)]
    pub min_doc_count: Option<usize>,

    /// Minimum cluster confidence for ADD_NEW
    #[arg(long)]
    pub confidence_floor: Option<f64>,

    /// Chat confidence below which auto mode escalates
    #[arg(long)]
    pub escalation_threshold: Option<f64>,

    /// Minimum similarity for merging near-duplicates
    #[arg(long)]
    pub similarity_threshold: Option<f64>,

    #[arg(long, value_enum)]
    pub similarity_metric: Option<SimilarityMetric>,

    /// Retries per service call after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Ignore cached answers (new answers are still cached)
    #[arg(long)]
    pub force: bool,

    /// Chat-completions endpoint URL
    #[arg(long, env = "DEEPSEEK_ENDPOINT")]
    pub endpoint: Option<String>,

    /// API key (prefer the DEEPSEEK_API_KEY environment variable)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Fast-tier model
    #[arg(long, env = "DEEPSEEK_MODEL_CHAT")]
    pub chat_model: Option<String>,

    /// Escalation-tier model
    #[arg(long, env = "DEEPSEEK_MODEL_REASONER")]
    pub reasoner_model: Option<String>,

    /// Model used for any tier without its own setting
    #[arg(long, env = "DEEPSEEK_MODEL", hide = true)]
    pub fallback_model: Option<String>,

    /// Client-side request rate limit (0 disables)
    #[arg(long)]
    pub requests_per_second: Option<u32>,

    /// Response cache database (default: <out>/cache.sqlite)
    #[arg(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Prompt template overriding the built-in one
    #[arg(long, value_name = "FILE")]
    pub prompt_template: Option<PathBuf>,

    /// Only check connectivity to the analysis service, then exit
    #[arg(long)]
    pub check: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Config file (default: <config dir>/enumdiff/config.toml)
    #[arg(long, env = "ENUMDIFF_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paragraphs: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub cache_path: PathBuf,
    pub prompt_template: Option<PathBuf>,
    pub client: ClientSettings,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Merge command line (with environment) over the TOML file and defaults
    pub fn resolve(cli: &Cli, toml_config: &TomlConfig) -> Result<Self> {
        let service = &toml_config.service;
        let policy_toml = &toml_config.policy;
        let run = &toml_config.run;

        let endpoint = cli
            .endpoint
            .clone()
            .or_else(|| service.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&endpoint)?;

        let api_key = resolve_api_key(cli.api_key.as_deref(), toml_config)?;

        let chat_model = resolve_model(
            cli.chat_model.as_deref(),
            cli.fallback_model.as_deref(),
            service.chat_model.as_deref(),
            DEFAULT_CHAT_MODEL,
        );
        let reasoner_model = resolve_model(
            cli.reasoner_model.as_deref(),
            cli.fallback_model.as_deref(),
            service.reasoner_model.as_deref(),
            DEFAULT_REASONER_MODEL,
        );

        let requests_per_second = cli
            .requests_per_second
            .or(service.requests_per_second)
            .unwrap_or(DEFAULT_REQUESTS_PER_SECOND);

        let mode = match (cli.provider_mode, run.provider_mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(s)) => s.parse()?,
            (None, None) => ProviderMode::default(),
        };

        let similarity_metric = match (cli.similarity_metric, policy_toml.similarity_metric.as_deref()) {
            (Some(metric), _) => metric,
            (None, Some(s)) => s.parse()?,
            (None, None) => SimilarityMetric::default(),
        };

        let defaults = PolicyParameters::default();
        let policy = PolicyParameters {
            min_doc_count: cli
                .min_doc_count
                .or(policy_toml.min_doc_count)
                .unwrap_or(defaults.min_doc_count),
            confidence_floor: cli
                .confidence_floor
                .or(policy_toml.confidence_floor)
                .unwrap_or(defaults.confidence_floor),
            escalation_threshold: cli
                .escalation_threshold
                .or(policy_toml.escalation_threshold)
                .unwrap_or(defaults.escalation_threshold),
            similarity_threshold: cli
                .similarity_threshold
                .or(policy_toml.similarity_threshold)
                .unwrap_or(defaults.similarity_threshold),
            similarity_metric,
        };
        policy.validate()?;

        let scheduler = SchedulerParameters {
            concurrency: cli
                .concurrency
                .or(run.concurrency)
                .unwrap_or(SchedulerParameters::default().concurrency),
            queue_capacity: cli.queue_capacity.or(run.queue_capacity),
        };
        scheduler.validate()?;

        let retry_defaults = RetryPolicy::default();
        let retry = retry_defaults.clone().with_max_retries(
            cli.max_retries
                .or(run.max_retries)
                .unwrap_or(retry_defaults.max_retries),
        );

        let output_dir = cli
            .out
            .clone()
            .or_else(|| run.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let cache_path = cli
            .cache
            .clone()
            .or_else(|| run.cache_path.clone())
            .unwrap_or_else(|| output_dir.join(DEFAULT_CACHE_FILE));

        Ok(Self {
            paragraphs: cli.paragraphs.clone(),
            catalog: cli.catalog.clone(),
            output_dir,
            cache_path,
            prompt_template: cli
                .prompt_template
                .clone()
                .or_else(|| service.prompt_template.clone()),
            client: ClientSettings {
                endpoint,
                api_key,
                chat: TierSettings::chat(chat_model),
                reasoner: TierSettings::reasoner(reasoner_model),
                requests_per_second: Some(requests_per_second).filter(|rps| *rps > 0),
            },
            pipeline: PipelineConfig {
                mode,
                policy,
                scheduler,
                retry,
                force: cli.force,
            },
        })
    }
}

/// Resolve the API key: `--api-key` → DEEPSEEK_API_KEY → TOML
pub fn resolve_api_key(cli_key: Option<&str>, toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(API_KEY_ENV).ok();
    let toml_key = toml_config.service.api_key.as_deref();

    let candidates = [
        ("command line", cli_key),
        ("environment", env_key.as_deref()),
        ("TOML", toml_key),
    ];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(_, key)| key.map(is_valid_key).unwrap_or(false))
        .map(|(source, _)| *source)
        .collect();

    if sources.len() > 1 {
        warn!(
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (source, key) in candidates {
        if let Some(key) = key.filter(|k| is_valid_key(k)) {
            if !key.trim().starts_with("sk-") {
                warn!("API key from {} does not start with 'sk-', this may be incorrect", source);
            }
            info!("API key loaded from {}", source);
            return Ok(key.trim().to_string());
        }
    }

    Err(Error::Config(format!(
        "Analysis service API key not configured. Provide one of:\n\
         1. Environment: {}=sk-...\n\
         2. Command line: --api-key sk-...\n\
         3. TOML config: [service] api_key = \"sk-...\"",
        API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Endpoint must be an http(s) URL
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Endpoint must be an http(s) URL, got: {}",
            endpoint
        )))
    }
}

/// Tier-specific setting → shared DEEPSEEK_MODEL → TOML → default
fn resolve_model(specific: Option<&str>, fallback: Option<&str>, toml: Option<&str>, default: &str) -> String {
    [specific, fallback, toml]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|m| !m.is_empty())
        .unwrap_or(default)
        .to_string()
}
