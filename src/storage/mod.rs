// src/storage/mod.rs
//
// The narrow persistence contract the pipeline runs against. Everything the
// orchestrator touches goes through `CustomerRepository`, so the Postgres
// backend and the in-memory test backend are interchangeable.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DedupResult;
use crate::models::core::{
    CustomerRecord, DedupStatus, IdentifierKind, MatchPartition, Offer, RecordId,
};
use crate::models::matching::{MatchAuditEntry, MergeGroup, OfferInvalidation};
use crate::models::stats_models::{IngestionRun, IngestionRunSummary, RunError};

/// Probe for the fuzzy candidate pass. Backends block on coarse keys
/// (shared name token, same date of birth, same postal code); precise
/// ranking happens in the candidate finder.
#[derive(Debug, Clone, Default)]
pub struct SimilarityProbe {
    pub name_tokens: Vec<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub postal_code: Option<String>,
    /// Ids never to return: the probing record itself plus exact-pass hits.
    pub exclude: Vec<RecordId>,
}

/// What a merge-group commit did, reported back for the run summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeCommitOutcome {
    pub records_merged: usize,
    pub offers_repointed: usize,
    pub offers_collapsed: Vec<OfferInvalidation>,
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Live records (anything not Merged) in the partition carrying exactly
    /// this identifier value.
    async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
        partition: MatchPartition,
    ) -> DedupResult<Vec<CustomerRecord>>;

    /// Up to `limit` live records in the partition sharing a coarse
    /// blocking key with the probe.
    async fn find_similar(
        &self,
        probe: &SimilarityProbe,
        partition: MatchPartition,
        limit: usize,
    ) -> DedupResult<Vec<CustomerRecord>>;

    async fn insert_record_with_offer(
        &self,
        record: &CustomerRecord,
        offer: &Offer,
    ) -> DedupResult<()>;

    async fn get_record(&self, id: &RecordId) -> DedupResult<Option<CustomerRecord>>;

    async fn offers_for_customer(&self, id: &RecordId) -> DedupResult<Vec<Offer>>;

    async fn update_dedup_statuses(
        &self,
        updates: &[(RecordId, DedupStatus)],
    ) -> DedupResult<()>;

    async fn invalidate_offers(&self, invalidations: &[OfferInvalidation]) -> DedupResult<()>;

    /// Atomically commit one merge group: lock every member id in ascending
    /// order, mark non-survivors Merged with their survivor back-reference,
    /// re-point and consolidate offers, all in one transaction. A failure
    /// leaves no partial state behind.
    async fn commit_merge_group(&self, group: &MergeGroup) -> DedupResult<MergeCommitOutcome>;

    async fn create_run(&self, run: &IngestionRun) -> DedupResult<()>;

    /// Stored summary of a Completed run with this batch id and input
    /// fingerprint, for idempotent replay.
    async fn find_completed_run(
        &self,
        batch_id: &str,
        input_fingerprint: &str,
    ) -> DedupResult<Option<IngestionRunSummary>>;

    async fn finish_run(
        &self,
        run: &IngestionRun,
        summary: &IngestionRunSummary,
    ) -> DedupResult<()>;

    async fn append_run_errors(&self, run_id: &str, errors: &[RunError]) -> DedupResult<()>;

    async fn record_match_audit(&self, entries: &[MatchAuditEntry]) -> DedupResult<()>;
}
