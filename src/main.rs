// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use dedupe_lib::config::MatchingConfig;
use dedupe_lib::events::LogEventPublisher;
use dedupe_lib::livebook::StaticLiveBook;
use dedupe_lib::models::core::RawCustomerRecord;
use dedupe_lib::orchestrator::DedupOrchestrator;
use dedupe_lib::storage::postgres::PostgresRepository;
use dedupe_lib::utils::db_connect::{connect, get_pool_status};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress::ProgressConfig;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct DedupArgs {
    /// Batch identifier assigned by the upstream extractor
    #[arg(long)]
    batch_id: String,

    /// Path to a JSON array of raw customer records
    #[arg(long)]
    input: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging and environment
    env_logger::init();
    load_env();

    let args = DedupArgs::parse();
    if args.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    info!("Starting customer dedup run for batch {}", args.batch_id);
    let start_time = Instant::now();

    let raw_json = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input file {}", args.input.display()))?;
    let raw_records: Vec<RawCustomerRecord> = serde_json::from_str(&raw_json)
        .with_context(|| format!("Failed to parse input file {}", args.input.display()))?;
    info!("Loaded {} raw records from {}", raw_records.len(), args.input.display());

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    let pool = connect().await.context("Failed to connect to database")?;
    info!("Successfully connected to the database");

    let repo = PostgresRepository::new(pool.clone());
    repo.ensure_schema()
        .await
        .context("Failed to verify database schema")?;

    let config = MatchingConfig::from_env();
    let orchestrator = DedupOrchestrator::new(
        Arc::new(repo),
        Arc::new(StaticLiveBook::new()),
        Arc::new(LogEventPublisher),
        config,
    )
    .with_progress(progress_config);

    let summary = orchestrator
        .run_dedup(&args.batch_id, raw_records)
        .await
        .context("Dedup run failed")?;

    info!(
        "Batch {} finished in {:.2?}: {} unique, {} merged, {} flagged for review, {} rejected",
        summary.batch_id,
        start_time.elapsed(),
        summary.unique_count,
        summary.merged_count,
        summary.needs_review_count,
        summary.rejected_count
    );

    // Final log of connection pool status
    let (pool_size, available_connections, in_use_connections) = get_pool_status(&pool);
    info!(
        "Final DB Connection Pool Status: Total: {}, Available: {}, In Use: {}",
        pool_size, available_connections, in_use_connections
    );

    info!("Dedup run completed successfully!");
    Ok(())
}
