// src/models/stats_models.rs
//
// Run bookkeeping: the persisted ingestion-run row, its append-only error
// descriptors and the summary handed back to callers (and replayed verbatim
// when an identical batch is submitted again).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::matching::MergeGroup;
use crate::models::core::{OfferId, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Wall-clock seconds spent in each pipeline phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimes {
    pub normalize_time: f64,
    pub match_time: f64,
    pub reconcile_time: f64,
    pub merge_time: f64,
    pub total_time: f64,
}

/// One error descriptor on a run. Per-record errors carry the upstream row
/// reference; batch-level ones do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub record_ref: Option<String>,
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// One batch execution, persisted in `dedup_metadata.ingestion_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub run_id: String,
    pub batch_id: String,
    /// sha256 hex over the canonically-serialized batch input. Two runs with
    /// the same batch id and fingerprint are the same submission.
    pub input_fingerprint: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_records: u64,
    pub unique_count: u64,
    pub merged_count: u64,
    pub needs_review_count: u64,
    pub rejected_count: u64,
    pub phase_times: PhaseTimes,
}

/// What `run_dedup` returns, and what an idempotent re-submission replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRunSummary {
    pub run_id: String,
    pub batch_id: String,
    pub status: RunStatus,
    pub total_records: u64,
    pub unique_count: u64,
    pub merged_count: u64,
    pub needs_review_count: u64,
    pub rejected_count: u64,
    pub merge_groups: Vec<MergeGroup>,
    pub invalidated_offer_ids: Vec<OfferId>,
    pub needs_review_ids: Vec<RecordId>,
    pub errors: Vec<RunError>,
    pub phase_times: PhaseTimes,
}

impl IngestionRunSummary {
    /// Records folded away across all merge groups.
    pub fn merged_away_count(&self) -> usize {
        self.merge_groups.iter().map(|g| g.merged_ids.len()).sum()
    }
}
