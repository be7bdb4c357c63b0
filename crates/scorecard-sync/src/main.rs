//! Scorecard Sync - one incremental sync run per invocation

use anyhow::{Context, Result};
use clap::Parser;
use scorecard_common::logging::{init_logging, LogConfig, LogLevel};
use scorecard_sync::client::ScorecardClient;
use scorecard_sync::engine::SyncEngine;
use scorecard_sync::normalizer::Normalizer;
use scorecard_sync::store::{CheckpointStore, SnapshotStore};
use scorecard_sync::{Cli, SyncConfig, SyncReport};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("scorecard-sync")
        .filter_directives("hyper=warn,reqwest=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match run(&cli).await {
        Ok(report) => {
            info!(status = ?report.status, "Sync complete");
            Ok(())
        },
        Err(err) => {
            error!(error = %format!("{err:#}"), "Sync failed");
            Err(err)
        },
    }
}

async fn run(cli: &Cli) -> Result<SyncReport> {
    let config = SyncConfig::from_cli(cli)?;
    info!(
        output = %config.output.display(),
        checkpoint = %config.checkpoint.display(),
        filter = ?config.filter,
        "Configuration loaded"
    );

    let normalizer = Normalizer::scorecard();
    let client = ScorecardClient::new(
        config.base_url.clone(),
        config.school_query(&normalizer),
        config.timeout,
    )
    .context("Failed to build HTTP client")?
    .zero_based_pages(config.zero_based_pages);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current page");
                cancel.cancel();
            }
        }
    });

    let engine = SyncEngine::new(
        client,
        SnapshotStore::new(&config.output),
        CheckpointStore::new(&config.checkpoint),
        config.engine_options(),
    )
    .with_normalizer(normalizer)
    .with_retry_policy(config.retry.clone())
    .with_cancellation(cancel);

    let report = engine.run().await?;
    Ok(report)
}
