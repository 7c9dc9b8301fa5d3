// src/orchestrator.rs
//
// Drives one batch through the full pipeline: normalize, match, classify,
// merge, reconcile against the live book, finalize. The orchestrator is the
// only component with cross-phase visibility and owns all failure
// bookkeeping: per-record errors accumulate on the run, batch-fatal errors
// abort it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::error::{DedupError, DedupResult};
use crate::events::{DedupEvent, EventPublisher};
use crate::livebook::{reconcile_record, LiveBook};
use crate::matching::candidates::find_candidates;
use crate::matching::classifier::{classify, RuleContext};
use crate::matching::scoring::score_pair;
use crate::merge::resolve_merge_groups;
use crate::models::core::{
    CustomerRecord, DedupStatus, MatchPartition, NormalizedRecord, Offer, OfferId, OfferStatus,
    RawCustomerRecord, RecordId,
};
use crate::models::matching::{
    Classification, ClassifierVerdict, MatchAuditEntry, MatchCandidate, MergeGroup, ReviewReason,
};
use crate::models::stats_models::{
    IngestionRun, IngestionRunSummary, PhaseTimes, RunError, RunStatus,
};
use crate::normalize::normalize_record;
use crate::storage::CustomerRepository;
use crate::utils::instantiate_run::create_initial_ingestion_run;
use crate::utils::progress::ProgressConfig;

/// sha256 hex over the canonically-serialized batch payload. Two submissions
/// with the same batch id and fingerprint are the same batch.
pub fn batch_fingerprint(raw_records: &[RawCustomerRecord]) -> DedupResult<String> {
    let payload = serde_json::to_vec(raw_records)
        .context("Failed to serialize batch input for fingerprinting")?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Worker bucket for a record: its partition plus a stable hash of its
/// primary identifier, so records sharing one land on the same worker.
fn bucket_for(record: &CustomerRecord, workers: usize) -> u64 {
    let seed = match record.primary_identifier() {
        Some((kind, value)) => format!("{}:{}", kind.as_str(), value),
        None => record.id.to_string(),
    };
    let digest = Sha256::digest(seed.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % workers.max(1) as u64
}

fn materialize(normalized: &NormalizedRecord) -> (CustomerRecord, Offer) {
    let record_id = RecordId(Uuid::new_v4().to_string());
    let offer = Offer {
        id: OfferId(Uuid::new_v4().to_string()),
        customer_id: record_id.clone(),
        offer_kind: normalized.offer_kind,
        valid_from: normalized.offer_valid_from,
        valid_to: normalized.offer_valid_to,
        status: OfferStatus::Active,
        status_reason: None,
        created_at: normalized.created_at,
    };
    let record = CustomerRecord {
        id: record_id,
        product_origin: normalized.product_origin,
        mobile: normalized.mobile.clone(),
        national_id: normalized.national_id.clone(),
        biometric_id: normalized.biometric_id.clone(),
        email: normalized.email.clone(),
        unique_customer_id: normalized.unique_customer_id.clone(),
        loan_application_no: normalized.loan_application_no.clone(),
        full_name: normalized.full_name.clone(),
        date_of_birth: normalized.date_of_birth,
        address: normalized.address.clone(),
        postal_code: normalized.postal_code.clone(),
        dedup_status: DedupStatus::Pending,
        survivor_of: None,
        created_at: normalized.created_at,
    };
    (record, offer)
}

/// Everything one matching worker produced for one record.
struct RecordOutcome {
    record: CustomerRecord,
    verdict: ClassifierVerdict,
    pairs: Vec<MatchCandidate>,
    /// Copies of the compared candidates, kept so merge-group resolution can
    /// pick survivors without another round of storage reads.
    candidates: Vec<CustomerRecord>,
}

fn audit_entry(run_id: &str, outcome: &RecordOutcome, at: DateTime<Utc>) -> MatchAuditEntry {
    let record_id = outcome.record.id.clone();
    let rule = outcome.verdict.rule.to_string();
    match &outcome.verdict.classification {
        Classification::MergeAccepted { target, score } => {
            let matched_fields = outcome
                .pairs
                .iter()
                .find(|pair| &pair.candidate_id == target)
                .map(|pair| pair.matched_fields.iter().copied().collect())
                .unwrap_or_default();
            MatchAuditEntry {
                run_id: run_id.to_string(),
                record_id,
                candidate_id: Some(target.clone()),
                rule,
                outcome: "merge_accepted".to_string(),
                score: Some(*score),
                matched_fields,
                detail: None,
                created_at: at,
            }
        }
        Classification::NeedsReview { review, candidates } => {
            let (score, detail) = match review {
                ReviewReason::ScoreInReviewBand { score } => (Some(*score), None),
                ReviewReason::IdentifierConflict { details } => (None, Some(details.clone())),
                ReviewReason::LiveBookUnavailable => (None, None),
            };
            MatchAuditEntry {
                run_id: run_id.to_string(),
                record_id,
                candidate_id: candidates.first().cloned(),
                rule,
                outcome: "needs_review".to_string(),
                score,
                matched_fields: Vec::new(),
                detail,
                created_at: at,
            }
        }
        Classification::Unique => MatchAuditEntry {
            run_id: run_id.to_string(),
            record_id,
            candidate_id: None,
            rule,
            outcome: "unique".to_string(),
            score: outcome
                .pairs
                .iter()
                .map(|pair| pair.score)
                .max_by(|a, b| a.total_cmp(b)),
            matched_fields: Vec::new(),
            detail: None,
            created_at: at,
        },
    }
}

fn failed_summary(run: &IngestionRun, failure: RunError) -> IngestionRunSummary {
    IngestionRunSummary {
        run_id: run.run_id.clone(),
        batch_id: run.batch_id.clone(),
        status: RunStatus::Failed,
        total_records: run.total_records,
        unique_count: run.unique_count,
        merged_count: run.merged_count,
        needs_review_count: run.needs_review_count,
        rejected_count: run.rejected_count,
        merge_groups: Vec::new(),
        invalidated_offer_ids: Vec::new(),
        needs_review_ids: Vec::new(),
        errors: vec![failure],
        phase_times: run.phase_times.clone(),
    }
}

pub struct DedupOrchestrator {
    repo: Arc<dyn CustomerRepository>,
    livebook: Arc<dyn LiveBook>,
    publisher: Arc<dyn EventPublisher>,
    config: MatchingConfig,
    progress: ProgressConfig,
    /// Serializes whole runs: a new batch starts only after the previous
    /// summary is durably recorded.
    run_gate: Mutex<()>,
}

impl DedupOrchestrator {
    pub fn new(
        repo: Arc<dyn CustomerRepository>,
        livebook: Arc<dyn LiveBook>,
        publisher: Arc<dyn EventPublisher>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            repo,
            livebook,
            publisher,
            config,
            progress: ProgressConfig::default(),
            run_gate: Mutex::new(()),
        }
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    /// Runs the full pipeline over one batch. Idempotent per batch id: a
    /// completed run with the same id and input fingerprint short-circuits
    /// and replays its stored summary.
    pub async fn run_dedup(
        &self,
        batch_id: &str,
        raw_records: Vec<RawCustomerRecord>,
    ) -> DedupResult<IngestionRunSummary> {
        let _run_gate = self.run_gate.lock().await;

        self.config.validate()?;

        let fingerprint = batch_fingerprint(&raw_records)?;
        if let Some(previous) = self.repo.find_completed_run(batch_id, &fingerprint).await? {
            info!(
                "Batch {} already completed as run {} with identical input; replaying stored summary",
                batch_id, previous.run_id
            );
            return Ok(previous);
        }

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut run = create_initial_ingestion_run(
            self.repo.as_ref(),
            &run_id,
            batch_id,
            &fingerprint,
            started_at,
            raw_records.len() as u64,
        )
        .await?;

        info!(
            "🔍 Run {} started for batch {} ({} records)",
            run_id,
            batch_id,
            raw_records.len()
        );
        self.config.log_config();

        let total_start = Instant::now();
        match self.execute(&mut run, raw_records).await {
            Ok(mut summary) => {
                run.status = RunStatus::Completed;
                run.finished_at = Some(Utc::now());
                run.phase_times.total_time = total_start.elapsed().as_secs_f64();
                summary.phase_times = run.phase_times.clone();
                self.repo.finish_run(&run, &summary).await?;

                let event = DedupEvent::RunCompleted {
                    run_id: run.run_id.clone(),
                    batch_id: run.batch_id.clone(),
                    merged_groups: summary.merge_groups.clone(),
                    invalidated_offer_ids: summary.invalidated_offer_ids.clone(),
                    needs_review_ids: summary.needs_review_ids.clone(),
                };
                if let Err(e) = self.publisher.publish(&event).await {
                    warn!(
                        "Failed to publish run-completed event for {}: {:#}",
                        run.run_id, e
                    );
                }

                self.log_summary(&summary);
                Ok(summary)
            }
            Err(err) => {
                error!("Run {} failed: {}", run.run_id, err);
                run.status = RunStatus::Failed;
                run.finished_at = Some(Utc::now());
                run.phase_times.total_time = total_start.elapsed().as_secs_f64();
                let failure = err.to_run_error();
                if let Err(persist_err) = self
                    .repo
                    .append_run_errors(&run.run_id, std::slice::from_ref(&failure))
                    .await
                {
                    warn!(
                        "Failed to record failure for run {}: {}",
                        run.run_id, persist_err
                    );
                }
                let summary = failed_summary(&run, failure);
                if let Err(persist_err) = self.repo.finish_run(&run, &summary).await {
                    warn!(
                        "Failed to persist failed-run summary for {}: {}",
                        run.run_id, persist_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut IngestionRun,
        raw_records: Vec<RawCustomerRecord>,
    ) -> DedupResult<IngestionRunSummary> {
        let multi = self.progress.create_multi_progress();
        let main_pb = multi.as_ref().map(|m| {
            let pb = m.add(ProgressBar::new(4));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "  {spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                    )
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            pb.enable_steady_tick(Duration::from_millis(self.progress.refresh_rate_ms));
            pb.set_message("Normalizing records");
            pb
        });

        let mut errors: Vec<RunError> = Vec::new();
        let mut rejected_count = 0u64;

        // Phase 1: normalize and persist everything usable as Pending, so
        // batch-mates see each other during candidate retrieval.
        let normalize_start = Instant::now();
        let ingested_at = Utc::now();
        let mut batch: Vec<CustomerRecord> = Vec::new();
        for raw in &raw_records {
            match normalize_record(raw, ingested_at) {
                Ok(normalized) => {
                    let (record, offer) = materialize(&normalized);
                    self.repo.insert_record_with_offer(&record, &offer).await?;
                    batch.push(record);
                }
                Err(err) if !err.is_batch_fatal() => {
                    warn!("Record {} rejected: {}", raw.source_ref, err);
                    errors.push(err.to_run_error());
                    rejected_count += 1;
                }
                Err(err) => return Err(err),
            }
        }
        run.phase_times.normalize_time = normalize_start.elapsed().as_secs_f64();
        info!(
            "Phase 1 complete: {} records normalized, {} rejected ({:.2}s)",
            batch.len(),
            rejected_count,
            run.phase_times.normalize_time
        );
        if let Some(pb) = &main_pb {
            pb.inc(1);
            pb.set_message("Matching records");
        }

        // Phase 2: candidate retrieval, scoring and classification, fanned
        // out over partition/hash-bucket workers.
        let match_start = Instant::now();
        let batch_len = batch.len();
        let match_pb = if self.progress.should_show_detailed() {
            multi.as_ref().map(|m| {
                let pb = m.add(ProgressBar::new(batch_len as u64));
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "  🔍 [{elapsed_precise}] {bar:30.green/blue} {pos}/{len} Scoring candidates...",
                        )
                        .unwrap()
                        .progress_chars("█▉▊▋▌▍▎▏  "),
                );
                pb
            })
        } else {
            None
        };

        let mut buckets: BTreeMap<(MatchPartition, u64), Vec<CustomerRecord>> = BTreeMap::new();
        for record in batch {
            let key = (
                record.partition(),
                bucket_for(&record, self.config.partition_workers),
            );
            buckets.entry(key).or_insert_with(Vec::new).push(record);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.partition_workers));
        let mut tasks: Vec<JoinHandle<DedupResult<Vec<RecordOutcome>>>> = Vec::new();
        for ((partition, bucket), bucket_records) in buckets {
            let repo = Arc::clone(&self.repo);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            let pb = match_pb.clone();
            tasks.push(tokio::spawn(async move {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| DedupError::Other(anyhow!("worker semaphore closed: {e}")))?;
                let _permit_guard = permit;
                debug!(
                    "Worker started: partition {} bucket {} ({} records)",
                    partition.as_str(),
                    bucket,
                    bucket_records.len()
                );
                let mut outcomes = Vec::with_capacity(bucket_records.len());
                for record in bucket_records {
                    let candidates = find_candidates(repo.as_ref(), &record, &config).await?;
                    let pairs: Vec<MatchCandidate> = candidates
                        .iter()
                        .map(|candidate| score_pair(&record, &candidate.record, &config))
                        .collect();
                    let verdict = classify(&RuleContext {
                        record_id: &record.id,
                        pairs: &pairs,
                        config: &config,
                    });
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                    outcomes.push(RecordOutcome {
                        record,
                        verdict,
                        pairs,
                        candidates: candidates.into_iter().map(|c| c.record).collect(),
                    });
                }
                Ok(outcomes)
            }));
        }

        let mut outcomes: Vec<RecordOutcome> = Vec::new();
        for join_result in join_all(tasks).await {
            match join_result {
                Ok(Ok(bucket_outcomes)) => outcomes.extend(bucket_outcomes),
                Ok(Err(err)) => return Err(err),
                Err(join_err) => {
                    return Err(DedupError::Other(anyhow!(
                        "matching worker panicked or was cancelled: {join_err}"
                    )))
                }
            }
        }
        if let Some(pb) = match_pb {
            pb.finish_and_clear();
        }
        outcomes.sort_by(|a, b| a.record.id.cmp(&b.record.id));

        let decided_at = Utc::now();
        let audit_entries: Vec<MatchAuditEntry> = outcomes
            .iter()
            .map(|outcome| audit_entry(&run.run_id, outcome, decided_at))
            .collect();
        if !audit_entries.is_empty() {
            self.repo.record_match_audit(&audit_entries).await?;
        }

        run.phase_times.match_time = match_start.elapsed().as_secs_f64();
        info!(
            "Phase 2 complete: {} records classified ({:.2}s)",
            outcomes.len(),
            run.phase_times.match_time
        );
        if let Some(pb) = &main_pb {
            pb.inc(1);
            pb.set_message("Committing merge groups");
        }

        // Phase 3: resolve accepted pairs into groups and commit each one
        // atomically. A failed group is a run error; the rest proceed.
        let merge_start = Instant::now();
        let mut known_records: HashMap<RecordId, CustomerRecord> = HashMap::new();
        for outcome in &outcomes {
            known_records.insert(outcome.record.id.clone(), outcome.record.clone());
            for candidate in &outcome.candidates {
                known_records.insert(candidate.id.clone(), candidate.clone());
            }
        }

        let accepted_pairs: Vec<(RecordId, RecordId)> = outcomes
            .iter()
            .filter_map(|outcome| match &outcome.verdict.classification {
                Classification::MergeAccepted { target, .. } => {
                    Some((outcome.record.id.clone(), target.clone()))
                }
                _ => None,
            })
            .collect();

        let groups = resolve_merge_groups(&accepted_pairs, &known_records)?;

        let mut committed_groups: Vec<MergeGroup> = Vec::new();
        let mut invalidated_offers: BTreeSet<OfferId> = BTreeSet::new();
        let mut failed_group_members: BTreeSet<RecordId> = BTreeSet::new();
        for group in groups {
            match self.repo.commit_merge_group(&group).await {
                Ok(commit) => {
                    info!(
                        "✓ Merge group committed: survivor {}, {} folded, {} offers repointed",
                        group.survivor_id,
                        group.merged_ids.len(),
                        commit.offers_repointed
                    );
                    invalidated_offers
                        .extend(commit.offers_collapsed.into_iter().map(|i| i.offer_id));
                    committed_groups.push(group);
                }
                Err(err) => {
                    error!(
                        "Merge group with survivor {} failed to commit: {}",
                        group.survivor_id, err
                    );
                    let mut run_error = err.to_run_error();
                    run_error.record_ref = Some(group.survivor_id.to_string());
                    errors.push(run_error);
                    failed_group_members.extend(group.all_ids());
                }
            }
        }

        let merged_away: BTreeSet<RecordId> = committed_groups
            .iter()
            .flat_map(|g| g.merged_ids.iter().cloned())
            .collect();
        let survivors: BTreeSet<RecordId> = committed_groups
            .iter()
            .map(|g| g.survivor_id.clone())
            .collect();

        // Survivors go Unique whether they came from this batch or storage;
        // a stored survivor may have been parked NeedsReview before.
        let mut status_updates: Vec<(RecordId, DedupStatus)> = survivors
            .iter()
            .map(|id| (id.clone(), DedupStatus::Unique))
            .collect();
        let mut needs_review_ids: BTreeSet<RecordId> = BTreeSet::new();
        let mut unique_count = 0u64;
        let mut merged_count = 0u64;
        let mut needs_review_count = 0u64;

        for outcome in &outcomes {
            let id = &outcome.record.id;
            if merged_away.contains(id) {
                merged_count += 1;
                continue;
            }
            if survivors.contains(id) {
                unique_count += 1;
                continue;
            }
            if failed_group_members.contains(id) {
                needs_review_count += 1;
                needs_review_ids.insert(id.clone());
                status_updates.push((id.clone(), DedupStatus::NeedsReview));
                continue;
            }
            match &outcome.verdict.classification {
                Classification::Unique => {
                    unique_count += 1;
                    status_updates.push((id.clone(), DedupStatus::Unique));
                }
                Classification::NeedsReview { .. } => {
                    needs_review_count += 1;
                    needs_review_ids.insert(id.clone());
                    status_updates.push((id.clone(), DedupStatus::NeedsReview));
                }
                Classification::MergeAccepted { target, .. } => {
                    // Every accepted pair lands in some group, and that group
                    // either committed or failed above. Park the record if the
                    // bookkeeping ever disagrees.
                    warn!(
                        "Record {} accepted a merge to {} but belongs to no group; queueing for review",
                        id, target
                    );
                    needs_review_count += 1;
                    needs_review_ids.insert(id.clone());
                    status_updates.push((id.clone(), DedupStatus::NeedsReview));
                }
            }
        }

        if !status_updates.is_empty() {
            self.repo.update_dedup_statuses(&status_updates).await?;
        }
        run.phase_times.merge_time = merge_start.elapsed().as_secs_f64();
        info!(
            "Phase 3 complete: {} groups committed, {} records folded ({:.2}s)",
            committed_groups.len(),
            merged_away.len(),
            run.phase_times.merge_time
        );
        if let Some(pb) = &main_pb {
            pb.inc(1);
            pb.set_message("Reconciling against live book");
        }

        // Phase 4: live-book reconciliation for every record that ended up
        // live. Lookup failures degrade that record to NeedsReview and the
        // run carries on.
        let reconcile_start = Instant::now();
        let timeout = Duration::from_secs(self.config.livebook_timeout_secs);
        let batch_ids: BTreeSet<RecordId> =
            outcomes.iter().map(|o| o.record.id.clone()).collect();

        let mut to_reconcile: Vec<RecordId> = survivors.iter().cloned().collect();
        for outcome in &outcomes {
            let id = &outcome.record.id;
            if survivors.contains(id)
                || merged_away.contains(id)
                || failed_group_members.contains(id)
            {
                continue;
            }
            if matches!(outcome.verdict.classification, Classification::Unique) {
                to_reconcile.push(id.clone());
            }
        }
        to_reconcile.sort();
        to_reconcile.dedup();

        let mut reconcile_review_updates: Vec<(RecordId, DedupStatus)> = Vec::new();
        let mut livebook_audits: Vec<MatchAuditEntry> = Vec::new();
        for record_id in &to_reconcile {
            let record = match known_records.get(record_id) {
                Some(record) => record.clone(),
                None => self.repo.get_record(record_id).await?.ok_or_else(|| {
                    DedupError::Other(anyhow!("record {record_id} vanished before reconciliation"))
                })?,
            };
            let offers = self.repo.offers_for_customer(record_id).await?;
            match reconcile_record(self.livebook.as_ref(), &record, &offers, timeout).await {
                Ok(invalidations) => {
                    if !invalidations.is_empty() {
                        info!(
                            "Live book: {} offer(s) on record {} invalidated",
                            invalidations.len(),
                            record_id
                        );
                        self.repo.invalidate_offers(&invalidations).await?;
                        invalidated_offers.extend(invalidations.into_iter().map(|i| i.offer_id));
                    }
                }
                Err(err) if !err.is_batch_fatal() => {
                    warn!("Live book unavailable for record {}: {}", record_id, err);
                    let mut run_error = err.to_run_error();
                    if run_error.record_ref.is_none() {
                        run_error.record_ref = Some(record_id.to_string());
                    }
                    errors.push(run_error);
                    reconcile_review_updates.push((record_id.clone(), DedupStatus::NeedsReview));
                    needs_review_ids.insert(record_id.clone());
                    if batch_ids.contains(record_id) {
                        unique_count -= 1;
                        needs_review_count += 1;
                    }
                    livebook_audits.push(MatchAuditEntry {
                        run_id: run.run_id.clone(),
                        record_id: record_id.clone(),
                        candidate_id: None,
                        rule: "livebook_degraded".to_string(),
                        outcome: "needs_review".to_string(),
                        score: None,
                        matched_fields: Vec::new(),
                        detail: None,
                        created_at: Utc::now(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        if !reconcile_review_updates.is_empty() {
            self.repo
                .update_dedup_statuses(&reconcile_review_updates)
                .await?;
        }
        if !livebook_audits.is_empty() {
            self.repo.record_match_audit(&livebook_audits).await?;
        }
        run.phase_times.reconcile_time = reconcile_start.elapsed().as_secs_f64();
        info!(
            "Phase 4 complete: {} records reconciled ({:.2}s)",
            to_reconcile.len(),
            run.phase_times.reconcile_time
        );
        if let Some(pb) = &main_pb {
            pb.inc(1);
        }

        run.unique_count = unique_count;
        run.merged_count = merged_count;
        run.needs_review_count = needs_review_count;
        run.rejected_count = rejected_count;

        if !errors.is_empty() {
            self.repo.append_run_errors(&run.run_id, &errors).await?;
        }

        if let Some(pb) = &main_pb {
            pb.finish_with_message("Run complete");
        }

        Ok(IngestionRunSummary {
            run_id: run.run_id.clone(),
            batch_id: run.batch_id.clone(),
            status: RunStatus::Completed,
            total_records: run.total_records,
            unique_count,
            merged_count,
            needs_review_count,
            rejected_count,
            merge_groups: committed_groups,
            invalidated_offer_ids: invalidated_offers.into_iter().collect(),
            needs_review_ids: needs_review_ids.into_iter().collect(),
            errors,
            phase_times: run.phase_times.clone(),
        })
    }

    fn log_summary(&self, summary: &IngestionRunSummary) {
        let PhaseTimes {
            normalize_time,
            match_time,
            reconcile_time,
            merge_time,
            total_time,
        } = summary.phase_times;
        info!("===== Run Summary =====");
        info!("Run ID: {}", summary.run_id);
        info!(
            "Batch: {} ({} records)",
            summary.batch_id, summary.total_records
        );
        info!(
            "Outcomes: {} unique, {} merged away, {} needs review, {} rejected",
            summary.unique_count,
            summary.merged_count,
            summary.needs_review_count,
            summary.rejected_count
        );
        info!(
            "Merge groups: {} ({} records folded), offers invalidated: {}",
            summary.merge_groups.len(),
            summary.merged_away_count(),
            summary.invalidated_offer_ids.len()
        );
        if !summary.errors.is_empty() {
            info!("Errors recorded: {}", summary.errors.len());
        }
        info!(
            "Phase times: normalize {:.2}s, match {:.2}s, merge {:.2}s, reconcile {:.2}s, total {:.2}s",
            normalize_time, match_time, merge_time, reconcile_time, total_time
        );
    }
}
