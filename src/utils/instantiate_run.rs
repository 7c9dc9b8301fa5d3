// src/utils/instantiate_run.rs

use chrono::{DateTime, Utc};
use log::info;

use crate::error::DedupResult;
use crate::models::stats_models::{IngestionRun, PhaseTimes, RunStatus};
use crate::storage::CustomerRepository;

/// Creates the initial ingestion_run row for a batch before any phase work
/// starts. Counters begin at zero and are filled in when the run finishes.
pub async fn create_initial_ingestion_run(
    repo: &dyn CustomerRepository,
    run_id: &str,
    batch_id: &str,
    input_fingerprint: &str,
    started_at: DateTime<Utc>,
    total_records: u64,
) -> DedupResult<IngestionRun> {
    let run = IngestionRun {
        run_id: run_id.to_string(),
        batch_id: batch_id.to_string(),
        input_fingerprint: input_fingerprint.to_string(),
        status: RunStatus::Running,
        started_at,
        finished_at: None,
        total_records,
        unique_count: 0,
        merged_count: 0,
        needs_review_count: 0,
        rejected_count: 0,
        phase_times: PhaseTimes::default(),
    };

    repo.create_run(&run).await?;
    info!("Created initial ingestion_run record with ID: {}", run_id);

    Ok(run)
}
