// src/storage/memory.rs
//
// In-memory repository: the test backend, also handy for dry runs over a
// file batch. Reads and writes serialize on one state mutex; merge commits
// additionally take per-record locks in ascending id order, the same
// discipline the Postgres backend uses with FOR UPDATE.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{DedupError, DedupResult};
use crate::merge::plan_offer_consolidation;
use crate::models::core::{
    CustomerRecord, DedupStatus, IdentifierKind, MatchPartition, Offer, OfferId, OfferStatus,
    RecordId,
};
use crate::models::matching::{MatchAuditEntry, MergeGroup, OfferInvalidation};
use crate::models::stats_models::{IngestionRun, IngestionRunSummary, RunError, RunStatus};
use crate::storage::{CustomerRepository, MergeCommitOutcome, SimilarityProbe};

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<RecordId, CustomerRecord>,
    offers: BTreeMap<OfferId, Offer>,
    runs: HashMap<String, IngestionRun>,
    summaries: HashMap<String, IngestionRunSummary>,
    run_errors: HashMap<String, Vec<RunError>>,
    audit: Vec<MatchAuditEntry>,
}

#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    record_locks: Mutex<HashMap<RecordId, Arc<Mutex<()>>>>,
    failing_commit_ids: Mutex<HashSet<RecordId>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection: any merge-group commit touching this record id
    /// fails with a storage error (and must leave no partial state).
    pub async fn fail_commits_touching(&self, id: RecordId) {
        self.failing_commit_ids.lock().await.insert(id);
    }

    pub async fn record_count(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn all_records(&self) -> Vec<CustomerRecord> {
        self.state.lock().await.records.values().cloned().collect()
    }

    pub async fn all_offers(&self) -> Vec<Offer> {
        self.state.lock().await.offers.values().cloned().collect()
    }

    pub async fn audit_entries(&self) -> Vec<MatchAuditEntry> {
        self.state.lock().await.audit.clone()
    }

    pub async fn errors_for_run(&self, run_id: &str) -> Vec<RunError> {
        self.state
            .lock()
            .await
            .run_errors
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed a record (with optional offer) directly, for tests that need a
    /// pre-existing book.
    pub async fn seed_record(&self, record: CustomerRecord, offer: Option<Offer>) {
        let mut state = self.state.lock().await;
        state.records.insert(record.id.clone(), record);
        if let Some(offer) = offer {
            state.offers.insert(offer.id.clone(), offer);
        }
    }

    /// Per-record locks in ascending id order; `ids` must already be
    /// sorted. Consistent ordering keeps overlapping group commits from
    /// deadlocking each other.
    async fn lock_records(&self, ids: &[RecordId]) -> Vec<OwnedMutexGuard<()>> {
        let handles: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.record_locks.lock().await;
            ids.iter()
                .map(|id| {
                    locks
                        .entry(id.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(())))
                        .clone()
                })
                .collect()
        };
        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }
}

fn shares_blocking_key(probe: &SimilarityProbe, record: &CustomerRecord) -> u32 {
    let mut keys = 0;
    if !probe.name_tokens.is_empty() {
        let tokens = record.name_tokens();
        if probe
            .name_tokens
            .iter()
            .any(|t| tokens.contains(&t.as_str()))
        {
            keys += 1;
        }
    }
    if let (Some(probe_dob), Some(record_dob)) = (probe.date_of_birth, record.date_of_birth) {
        if probe_dob == record_dob {
            keys += 1;
        }
    }
    if let (Some(probe_pc), Some(record_pc)) =
        (probe.postal_code.as_deref(), record.postal_code.as_deref())
    {
        if probe_pc == record_pc {
            keys += 1;
        }
    }
    keys
}

#[async_trait]
impl CustomerRepository for MemoryRepository {
    async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
        partition: MatchPartition,
    ) -> DedupResult<Vec<CustomerRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| {
                r.partition() == partition
                    && r.dedup_status != DedupStatus::Merged
                    && r.identifier(kind) == Some(value)
            })
            .cloned()
            .collect())
    }

    async fn find_similar(
        &self,
        probe: &SimilarityProbe,
        partition: MatchPartition,
        limit: usize,
    ) -> DedupResult<Vec<CustomerRecord>> {
        let state = self.state.lock().await;
        let mut blocked: Vec<(u32, &CustomerRecord)> = state
            .records
            .values()
            .filter(|r| {
                r.partition() == partition
                    && r.dedup_status != DedupStatus::Merged
                    && !probe.exclude.contains(&r.id)
            })
            .filter_map(|r| {
                let keys = shares_blocking_key(probe, r);
                if keys > 0 {
                    Some((keys, r))
                } else {
                    None
                }
            })
            .collect();
        blocked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(blocked
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn insert_record_with_offer(
        &self,
        record: &CustomerRecord,
        offer: &Offer,
    ) -> DedupResult<()> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&record.id) {
            return Err(DedupError::Other(anyhow!(
                "duplicate record id {}",
                record.id
            )));
        }
        state.records.insert(record.id.clone(), record.clone());
        state.offers.insert(offer.id.clone(), offer.clone());
        Ok(())
    }

    async fn get_record(&self, id: &RecordId) -> DedupResult<Option<CustomerRecord>> {
        Ok(self.state.lock().await.records.get(id).cloned())
    }

    async fn offers_for_customer(&self, id: &RecordId) -> DedupResult<Vec<Offer>> {
        let state = self.state.lock().await;
        Ok(state
            .offers
            .values()
            .filter(|o| o.customer_id == *id)
            .cloned()
            .collect())
    }

    async fn update_dedup_statuses(
        &self,
        updates: &[(RecordId, DedupStatus)],
    ) -> DedupResult<()> {
        let mut state = self.state.lock().await;
        for (id, status) in updates {
            let record = state
                .records
                .get_mut(id)
                .ok_or_else(|| DedupError::Other(anyhow!("status update for unknown {}", id)))?;
            record.dedup_status = *status;
        }
        Ok(())
    }

    async fn invalidate_offers(&self, invalidations: &[OfferInvalidation]) -> DedupResult<()> {
        let mut state = self.state.lock().await;
        for invalidation in invalidations {
            let offer = state.offers.get_mut(&invalidation.offer_id).ok_or_else(|| {
                DedupError::Other(anyhow!("invalidation of unknown offer {}", invalidation.offer_id))
            })?;
            offer.status = OfferStatus::Invalid;
            offer.status_reason = Some(invalidation.reason_code.clone());
        }
        Ok(())
    }

    async fn commit_merge_group(&self, group: &MergeGroup) -> DedupResult<MergeCommitOutcome> {
        let ids = group.all_ids();
        let _guards = self.lock_records(&ids).await;

        {
            let failing = self.failing_commit_ids.lock().await;
            if ids.iter().any(|id| failing.contains(id)) {
                return Err(DedupError::StorageUnavailable(anyhow!(
                    "injected commit failure for group surviving as {}",
                    group.survivor_id
                )));
            }
        }

        let mut state = self.state.lock().await;
        for id in &ids {
            if !state.records.contains_key(id) {
                return Err(DedupError::Other(anyhow!(
                    "merge group member {} does not exist",
                    id
                )));
            }
        }

        let group_offers: Vec<Offer> = state
            .offers
            .values()
            .filter(|o| ids.contains(&o.customer_id))
            .cloned()
            .collect();
        let plan = plan_offer_consolidation(group, &group_offers);

        // All checks passed; apply everything under the state lock.
        for id in &group.merged_ids {
            if let Some(record) = state.records.get_mut(id) {
                record.dedup_status = DedupStatus::Merged;
                record.survivor_of = Some(group.survivor_id.clone());
            }
        }
        for offer_id in &plan.repoint {
            if let Some(offer) = state.offers.get_mut(offer_id) {
                offer.customer_id = group.survivor_id.clone();
            }
        }
        for invalidation in &plan.invalidate {
            if let Some(offer) = state.offers.get_mut(&invalidation.offer_id) {
                offer.status = OfferStatus::Invalid;
                offer.status_reason = Some(invalidation.reason_code.clone());
            }
        }

        Ok(MergeCommitOutcome {
            records_merged: group.merged_ids.len(),
            offers_repointed: plan.repoint.len(),
            offers_collapsed: plan.invalidate,
        })
    }

    async fn create_run(&self, run: &IngestionRun) -> DedupResult<()> {
        let mut state = self.state.lock().await;
        state.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn find_completed_run(
        &self,
        batch_id: &str,
        input_fingerprint: &str,
    ) -> DedupResult<Option<IngestionRunSummary>> {
        let state = self.state.lock().await;
        let completed = state.runs.values().find(|r| {
            r.batch_id == batch_id
                && r.input_fingerprint == input_fingerprint
                && r.status == RunStatus::Completed
        });
        Ok(completed.and_then(|r| state.summaries.get(&r.run_id).cloned()))
    }

    async fn finish_run(
        &self,
        run: &IngestionRun,
        summary: &IngestionRunSummary,
    ) -> DedupResult<()> {
        let mut state = self.state.lock().await;
        state.runs.insert(run.run_id.clone(), run.clone());
        state.summaries.insert(run.run_id.clone(), summary.clone());
        Ok(())
    }

    async fn append_run_errors(&self, run_id: &str, errors: &[RunError]) -> DedupResult<()> {
        if errors.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state
            .run_errors
            .entry(run_id.to_string())
            .or_default()
            .extend_from_slice(errors);
        Ok(())
    }

    async fn record_match_audit(&self, entries: &[MatchAuditEntry]) -> DedupResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.audit.extend_from_slice(entries);
        Ok(())
    }
}
