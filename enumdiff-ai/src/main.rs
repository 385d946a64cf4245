//! enumdiff-ai: vocabulary gap analysis
//!
//! Reads rule-bearing paragraphs and a known-vocabulary catalog, runs the
//! candidate-analysis pipeline against the analysis service and writes
//! proposals, review records and a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use enumdiff_ai::cache::SqliteStore;
use enumdiff_ai::config::{AppConfig, Cli};
use enumdiff_ai::models::{read_paragraphs, VocabularyCatalog};
use enumdiff_ai::output::{write_report, write_summary, RunSettings, RunSummary, SUMMARY_FILE};
use enumdiff_ai::services::analysis_client::describe_probe_failure;
use enumdiff_ai::services::{DeepSeekClient, PromptTemplate};
use enumdiff_ai::{Pipeline, RunStatus};
use enumdiff_common::config::{discover_config, TomlConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config file first: it supplies the default log level
    let discovered = discover_config(cli.config.as_deref())?;
    let toml_config = discovered
        .as_ref()
        .map(|(_, c)| c.clone())
        .unwrap_or_else(TomlConfig::default);

    let default_level = if cli.verbose {
        "debug".to_string()
    } else {
        toml_config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting enumdiff-ai {} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some((path, _)) = &discovered {
        info!("Config file: {}", path.display());
    }

    let config = AppConfig::resolve(&cli, &toml_config)?;
    let client = Arc::new(
        DeepSeekClient::new(config.client.clone()).context("Failed to initialize analysis client")?,
    );
    info!(
        endpoint = client.endpoint(),
        chat_model = %config.client.chat.model,
        reasoner_model = %config.client.reasoner.model,
        "Analysis client initialized"
    );

    if cli.check {
        return match client.check_connectivity().await {
            Ok(model) => {
                info!(model = %model, "Analysis service reachable, credentials accepted");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(describe_probe_failure(&e))),
        };
    }

    let (Some(paragraphs_path), Some(catalog_path)) = (&config.paragraphs, &config.catalog) else {
        anyhow::bail!("--paragraphs and --catalog are required");
    };

    let catalog = Arc::new(
        VocabularyCatalog::load(catalog_path)
            .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?,
    );
    info!(
        version = catalog.version(),
        types = catalog.types().count(),
        "Catalog loaded"
    );

    let paragraphs = read_paragraphs(paragraphs_path)
        .with_context(|| format!("Failed to read paragraphs {}", paragraphs_path.display()))?;
    info!(count = paragraphs.len(), "Paragraphs loaded");

    let prompt = match &config.prompt_template {
        Some(path) => PromptTemplate::from_file(path)?,
        None => PromptTemplate::builtin(),
    };

    info!(path = %config.cache_path.display(), "Opening response cache");
    let pool = enumdiff_ai::db::init_cache_pool(&config.cache_path)
        .await
        .context("Failed to open response cache")?;
    let store = Arc::new(SqliteStore::new(pool));

    let settings = RunSettings::new(&config.pipeline, catalog.version(), prompt.version());
    let pipeline = Pipeline::new(client, store, catalog, prompt, config.pipeline.clone());

    // Ctrl-C halts dispatch; in-flight paragraphs finish and are cached
    let stop = CancellationToken::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight paragraphs");
            ctrl_c_stop.cancel();
        }
    });

    match pipeline.run(futures::stream::iter(paragraphs), stop).await {
        Ok(report) => {
            let summary = RunSummary::from_report(&report, settings);
            let written = write_report(&config.output_dir, &report, &summary)?;
            info!(
                status = ?report.status,
                review_records = report.review_records.len(),
                summary = %written.summary.display(),
                "Done"
            );
            if report.status == RunStatus::Stopped {
                warn!("Run was stopped; review records were not produced");
            }
            Ok(())
        }
        Err(failure) => {
            let summary = RunSummary::from_failure(&failure, settings);
            let path = config.output_dir.join(SUMMARY_FILE);
            if let Err(e) = write_summary(&path, &summary) {
                error!(error = %e, "Failed to write failure summary");
            }
            Err(failure.into())
        }
    }
}
