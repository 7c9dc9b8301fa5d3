// src/storage/postgres.rs
//
// Postgres-backed repository. Customer records and offers live in `public`;
// run bookkeeping and the audit trail live in `dedup_metadata`. Merge-group
// commits run in one transaction with `FOR UPDATE` locks taken in ascending
// id order.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::{debug, info};
use tokio_postgres::Row as PgRow;
use uuid::Uuid;

use crate::error::{DedupError, DedupResult};
use crate::merge::plan_offer_consolidation;
use crate::models::core::{
    CustomerRecord, DedupStatus, IdentifierKind, MatchPartition, Offer, OfferId, OfferKind,
    OfferStatus, ProductOrigin, RecordId,
};
use crate::models::matching::{MatchAuditEntry, MergeGroup, OfferInvalidation};
use crate::models::stats_models::{IngestionRun, IngestionRunSummary, RunError};
use crate::storage::{CustomerRepository, MergeCommitOutcome, SimilarityProbe};
use crate::utils::db_connect::PgPool;

const RECORD_COLUMNS: &str = "id, product_origin, mobile, national_id, biometric_id, email, \
     unique_customer_id, loan_application_no, full_name, date_of_birth, address, postal_code, \
     dedup_status, survivor_of, created_at";

const OFFER_COLUMNS: &str =
    "id, customer_id, offer_kind, valid_from, valid_to, status, status_reason, created_at";

const SCHEMA_SQL: &str = "
    CREATE SCHEMA IF NOT EXISTS dedup_metadata;

    CREATE TABLE IF NOT EXISTS public.customer_record (
        id TEXT PRIMARY KEY,
        product_origin TEXT NOT NULL,
        mobile TEXT,
        national_id TEXT,
        biometric_id TEXT,
        email TEXT,
        unique_customer_id TEXT,
        loan_application_no TEXT,
        full_name TEXT,
        date_of_birth DATE,
        address TEXT,
        postal_code TEXT,
        dedup_status TEXT NOT NULL,
        survivor_of TEXT,
        created_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_customer_record_mobile ON public.customer_record (mobile);
    CREATE INDEX IF NOT EXISTS idx_customer_record_national_id ON public.customer_record (national_id);
    CREATE INDEX IF NOT EXISTS idx_customer_record_ucid ON public.customer_record (unique_customer_id);
    CREATE INDEX IF NOT EXISTS idx_customer_record_dob ON public.customer_record (date_of_birth);
    CREATE INDEX IF NOT EXISTS idx_customer_record_postal ON public.customer_record (postal_code);

    CREATE TABLE IF NOT EXISTS public.offer (
        id TEXT PRIMARY KEY,
        customer_id TEXT NOT NULL REFERENCES public.customer_record (id),
        offer_kind TEXT NOT NULL,
        valid_from DATE NOT NULL,
        valid_to DATE NOT NULL,
        status TEXT NOT NULL,
        status_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_offer_customer ON public.offer (customer_id);

    CREATE TABLE IF NOT EXISTS dedup_metadata.ingestion_run (
        run_id TEXT PRIMARY KEY,
        batch_id TEXT NOT NULL,
        input_fingerprint TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ,
        total_records BIGINT NOT NULL,
        unique_count BIGINT NOT NULL,
        merged_count BIGINT NOT NULL,
        needs_review_count BIGINT NOT NULL,
        rejected_count BIGINT NOT NULL,
        normalize_time DOUBLE PRECISION NOT NULL,
        match_time DOUBLE PRECISION NOT NULL,
        reconcile_time DOUBLE PRECISION NOT NULL,
        merge_time DOUBLE PRECISION NOT NULL,
        total_time DOUBLE PRECISION NOT NULL,
        summary JSONB
    );
    CREATE INDEX IF NOT EXISTS idx_ingestion_run_batch
        ON dedup_metadata.ingestion_run (batch_id, input_fingerprint);

    CREATE TABLE IF NOT EXISTS dedup_metadata.ingestion_run_error (
        id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL,
        record_ref TEXT,
        kind TEXT NOT NULL,
        message TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_ingestion_run_error_run
        ON dedup_metadata.ingestion_run_error (run_id);

    CREATE TABLE IF NOT EXISTS dedup_metadata.match_audit (
        id TEXT PRIMARY KEY,
        run_id TEXT NOT NULL,
        record_id TEXT NOT NULL,
        candidate_id TEXT,
        rule TEXT NOT NULL,
        outcome TEXT NOT NULL,
        score DOUBLE PRECISION,
        matched_fields JSONB NOT NULL,
        detail TEXT,
        created_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_match_audit_run ON dedup_metadata.match_audit (run_id);
";

fn storage_err(err: anyhow::Error) -> DedupError {
    DedupError::StorageUnavailable(err)
}

fn record_from_row(row: &PgRow) -> DedupResult<CustomerRecord> {
    let origin_str: String = row.get("product_origin");
    let product_origin = ProductOrigin::from_str(&origin_str).ok_or_else(|| {
        DedupError::Other(anyhow!("unknown product_origin '{}' in storage", origin_str))
    })?;
    let status_str: String = row.get("dedup_status");
    let dedup_status = DedupStatus::from_str(&status_str).ok_or_else(|| {
        DedupError::Other(anyhow!("unknown dedup_status '{}' in storage", status_str))
    })?;
    Ok(CustomerRecord {
        id: RecordId(row.get("id")),
        product_origin,
        mobile: row.get("mobile"),
        national_id: row.get("national_id"),
        biometric_id: row.get("biometric_id"),
        email: row.get("email"),
        unique_customer_id: row.get("unique_customer_id"),
        loan_application_no: row.get("loan_application_no"),
        full_name: row.get("full_name"),
        date_of_birth: row.get("date_of_birth"),
        address: row.get("address"),
        postal_code: row.get("postal_code"),
        dedup_status,
        survivor_of: row.get::<_, Option<String>>("survivor_of").map(RecordId),
        created_at: row.get("created_at"),
    })
}

fn offer_from_row(row: &PgRow) -> DedupResult<Offer> {
    let kind_str: String = row.get("offer_kind");
    let offer_kind = OfferKind::from_str(&kind_str)
        .ok_or_else(|| DedupError::Other(anyhow!("unknown offer_kind '{}' in storage", kind_str)))?;
    let status_str: String = row.get("status");
    let status = OfferStatus::from_str(&status_str).ok_or_else(|| {
        DedupError::Other(anyhow!("unknown offer status '{}' in storage", status_str))
    })?;
    Ok(Offer {
        id: OfferId(row.get("id")),
        customer_id: RecordId(row.get("customer_id")),
        offer_kind,
        valid_from: row.get("valid_from"),
        valid_to: row.get("valid_to"),
        status,
        status_reason: row.get("status_reason"),
        created_at: row.get("created_at"),
    })
}

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the schemas, tables and indexes if they are missing. Safe to
    /// call on every startup.
    pub async fn ensure_schema(&self) -> DedupResult<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for schema setup")
            .map_err(storage_err)?;
        conn.batch_execute(SCHEMA_SQL)
            .await
            .context("Failed to create dedup schema")
            .map_err(storage_err)?;
        info!("Database schema verified");
        Ok(())
    }
}

#[async_trait]
impl CustomerRepository for PostgresRepository {
    async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
        partition: MatchPartition,
    ) -> DedupResult<Vec<CustomerRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for find_by_identifier")
            .map_err(storage_err)?;
        // Identifier kinds map one-to-one onto column names.
        let query = format!(
            "SELECT {} FROM public.customer_record
             WHERE {} = $1
               AND dedup_status <> 'merged'
               AND (product_origin = 'topup') = $2",
            RECORD_COLUMNS,
            kind.as_str()
        );
        let is_topup = partition == MatchPartition::Topup;
        let rows = conn
            .query(&query, &[&value, &is_topup])
            .await
            .context("Failed to query customer_record by identifier")
            .map_err(storage_err)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn find_similar(
        &self,
        probe: &SimilarityProbe,
        partition: MatchPartition,
        limit: usize,
    ) -> DedupResult<Vec<CustomerRecord>> {
        if probe.name_tokens.is_empty()
            && probe.date_of_birth.is_none()
            && probe.postal_code.is_none()
        {
            return Ok(Vec::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for find_similar")
            .map_err(storage_err)?;
        let query = format!(
            "SELECT {} FROM (
                 SELECT r.*,
                        (CASE WHEN cardinality($1::text[]) > 0
                                   AND string_to_array(COALESCE(r.full_name, ''), ' ') && $1::text[]
                              THEN 1 ELSE 0 END
                       + CASE WHEN $2::date IS NOT NULL AND r.date_of_birth = $2::date
                              THEN 1 ELSE 0 END
                       + CASE WHEN $3::text IS NOT NULL AND r.postal_code = $3::text
                              THEN 1 ELSE 0 END) AS blocking_keys
                 FROM public.customer_record r
                 WHERE (r.product_origin = 'topup') = $4
                   AND r.dedup_status <> 'merged'
                   AND NOT (r.id = ANY($5::text[]))
             ) blocked
             WHERE blocking_keys > 0
             ORDER BY blocking_keys DESC, id ASC
             LIMIT $6",
            RECORD_COLUMNS
        );
        let is_topup = partition == MatchPartition::Topup;
        let exclude: Vec<String> = probe.exclude.iter().map(|id| id.0.clone()).collect();
        let rows = conn
            .query(
                &query,
                &[
                    &probe.name_tokens,
                    &probe.date_of_birth,
                    &probe.postal_code,
                    &is_topup,
                    &exclude,
                    &(limit as i64),
                ],
            )
            .await
            .context("Failed to query similar customer_record rows")
            .map_err(storage_err)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn insert_record_with_offer(
        &self,
        record: &CustomerRecord,
        offer: &Offer,
    ) -> DedupResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for insert_record_with_offer")
            .map_err(storage_err)?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start insert transaction")
            .map_err(storage_err)?;

        const INSERT_RECORD_SQL: &str = "
            INSERT INTO public.customer_record (
                id, product_origin, mobile, national_id, biometric_id, email,
                unique_customer_id, loan_application_no, full_name, date_of_birth,
                address, postal_code, dedup_status, survivor_of, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)";
        tx.execute(
            INSERT_RECORD_SQL,
            &[
                &record.id.0,
                &record.product_origin.as_str(),
                &record.mobile,
                &record.national_id,
                &record.biometric_id,
                &record.email,
                &record.unique_customer_id,
                &record.loan_application_no,
                &record.full_name,
                &record.date_of_birth,
                &record.address,
                &record.postal_code,
                &record.dedup_status.as_str(),
                &record.survivor_of.as_ref().map(|id| id.0.clone()),
                &record.created_at,
            ],
        )
        .await
        .context("Failed to insert customer_record")
        .map_err(storage_err)?;

        const INSERT_OFFER_SQL: &str = "
            INSERT INTO public.offer (
                id, customer_id, offer_kind, valid_from, valid_to, status,
                status_reason, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";
        tx.execute(
            INSERT_OFFER_SQL,
            &[
                &offer.id.0,
                &offer.customer_id.0,
                &offer.offer_kind.as_str(),
                &offer.valid_from,
                &offer.valid_to,
                &offer.status.as_str(),
                &offer.status_reason,
                &offer.created_at,
            ],
        )
        .await
        .context("Failed to insert offer")
        .map_err(storage_err)?;

        tx.commit()
            .await
            .context("Failed to commit record/offer insert")
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_record(&self, id: &RecordId) -> DedupResult<Option<CustomerRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for get_record")
            .map_err(storage_err)?;
        let query = format!(
            "SELECT {} FROM public.customer_record WHERE id = $1",
            RECORD_COLUMNS
        );
        let row = conn
            .query_opt(&query, &[&id.0])
            .await
            .context("Failed to query customer_record by id")
            .map_err(storage_err)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn offers_for_customer(&self, id: &RecordId) -> DedupResult<Vec<Offer>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for offers_for_customer")
            .map_err(storage_err)?;
        let query = format!(
            "SELECT {} FROM public.offer WHERE customer_id = $1 ORDER BY id",
            OFFER_COLUMNS
        );
        let rows = conn
            .query(&query, &[&id.0])
            .await
            .context("Failed to query offers by customer")
            .map_err(storage_err)?;
        rows.iter().map(offer_from_row).collect()
    }

    async fn update_dedup_statuses(
        &self,
        updates: &[(RecordId, DedupStatus)],
    ) -> DedupResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for update_dedup_statuses")
            .map_err(storage_err)?;
        let mut id_vec = Vec::with_capacity(updates.len());
        let mut status_vec = Vec::with_capacity(updates.len());
        for (id, status) in updates {
            id_vec.push(id.0.clone());
            status_vec.push(status.as_str().to_string());
        }
        const UPDATE_SQL: &str = "
            UPDATE public.customer_record r
            SET dedup_status = u.status
            FROM UNNEST($1::text[], $2::text[]) AS u(id, status)
            WHERE r.id = u.id";
        let updated = conn
            .execute(UPDATE_SQL, &[&id_vec, &status_vec])
            .await
            .context("Failed to update dedup statuses")
            .map_err(storage_err)?;
        debug!("Updated dedup status on {} records", updated);
        Ok(())
    }

    async fn invalidate_offers(&self, invalidations: &[OfferInvalidation]) -> DedupResult<()> {
        if invalidations.is_empty() {
            return Ok(());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for invalidate_offers")
            .map_err(storage_err)?;
        let mut id_vec = Vec::with_capacity(invalidations.len());
        let mut reason_vec = Vec::with_capacity(invalidations.len());
        for invalidation in invalidations {
            id_vec.push(invalidation.offer_id.0.clone());
            reason_vec.push(invalidation.reason_code.clone());
        }
        const INVALIDATE_SQL: &str = "
            UPDATE public.offer o
            SET status = 'invalid', status_reason = u.reason
            FROM UNNEST($1::text[], $2::text[]) AS u(id, reason)
            WHERE o.id = u.id";
        conn.execute(INVALIDATE_SQL, &[&id_vec, &reason_vec])
            .await
            .context("Failed to invalidate offers")
            .map_err(storage_err)?;
        Ok(())
    }

    async fn commit_merge_group(&self, group: &MergeGroup) -> DedupResult<MergeCommitOutcome> {
        let ids: Vec<String> = group.all_ids().iter().map(|id| id.0.clone()).collect();
        let merged_ids: Vec<String> = group.merged_ids.iter().map(|id| id.0.clone()).collect();

        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for commit_merge_group")
            .map_err(storage_err)?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start merge-group transaction")
            .map_err(storage_err)?;

        // Lock every member row in ascending id order; overlapping groups
        // then cannot deadlock each other.
        let locked = tx
            .query(
                "SELECT id FROM public.customer_record WHERE id = ANY($1::text[]) ORDER BY id FOR UPDATE",
                &[&ids],
            )
            .await
            .context("Failed to lock merge-group rows")
            .map_err(storage_err)?;
        if locked.len() != ids.len() {
            return Err(DedupError::Other(anyhow!(
                "merge group surviving as {} has {} members but only {} rows exist",
                group.survivor_id,
                ids.len(),
                locked.len()
            )));
        }

        let offer_query = format!(
            "SELECT {} FROM public.offer WHERE customer_id = ANY($1::text[])",
            OFFER_COLUMNS
        );
        let offer_rows = tx
            .query(&offer_query, &[&ids])
            .await
            .context("Failed to load merge-group offers")
            .map_err(storage_err)?;
        let group_offers: Vec<Offer> = offer_rows
            .iter()
            .map(offer_from_row)
            .collect::<DedupResult<_>>()?;
        let plan = plan_offer_consolidation(group, &group_offers);

        tx.execute(
            "UPDATE public.customer_record
             SET dedup_status = 'merged', survivor_of = $2
             WHERE id = ANY($1::text[])",
            &[&merged_ids, &group.survivor_id.0],
        )
        .await
        .context("Failed to mark merged records")
        .map_err(storage_err)?;

        if !plan.repoint.is_empty() {
            let repoint_ids: Vec<String> = plan.repoint.iter().map(|id| id.0.clone()).collect();
            tx.execute(
                "UPDATE public.offer SET customer_id = $2 WHERE id = ANY($1::text[])",
                &[&repoint_ids, &group.survivor_id.0],
            )
            .await
            .context("Failed to repoint offers at survivor")
            .map_err(storage_err)?;
        }

        if !plan.invalidate.is_empty() {
            let mut id_vec = Vec::with_capacity(plan.invalidate.len());
            let mut reason_vec = Vec::with_capacity(plan.invalidate.len());
            for invalidation in &plan.invalidate {
                id_vec.push(invalidation.offer_id.0.clone());
                reason_vec.push(invalidation.reason_code.clone());
            }
            tx.execute(
                "UPDATE public.offer o
                 SET status = 'invalid', status_reason = u.reason
                 FROM UNNEST($1::text[], $2::text[]) AS u(id, reason)
                 WHERE o.id = u.id",
                &[&id_vec, &reason_vec],
            )
            .await
            .context("Failed to collapse duplicate offers")
            .map_err(storage_err)?;
        }

        tx.commit()
            .await
            .context("Failed to commit merge group")
            .map_err(storage_err)?;

        Ok(MergeCommitOutcome {
            records_merged: group.merged_ids.len(),
            offers_repointed: plan.repoint.len(),
            offers_collapsed: plan.invalidate,
        })
    }

    async fn create_run(&self, run: &IngestionRun) -> DedupResult<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for create_run")
            .map_err(storage_err)?;
        const INSERT_SQL: &str = "
            INSERT INTO dedup_metadata.ingestion_run (
                run_id, batch_id, input_fingerprint, status, started_at, finished_at,
                total_records, unique_count, merged_count, needs_review_count, rejected_count,
                normalize_time, match_time, reconcile_time, merge_time, total_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)";
        conn.execute(
            INSERT_SQL,
            &[
                &run.run_id,
                &run.batch_id,
                &run.input_fingerprint,
                &run.status.as_str(),
                &run.started_at,
                &run.finished_at,
                &(run.total_records as i64),
                &(run.unique_count as i64),
                &(run.merged_count as i64),
                &(run.needs_review_count as i64),
                &(run.rejected_count as i64),
                &run.phase_times.normalize_time,
                &run.phase_times.match_time,
                &run.phase_times.reconcile_time,
                &run.phase_times.merge_time,
                &run.phase_times.total_time,
            ],
        )
        .await
        .context("Failed to insert ingestion_run")
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_completed_run(
        &self,
        batch_id: &str,
        input_fingerprint: &str,
    ) -> DedupResult<Option<IngestionRunSummary>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for find_completed_run")
            .map_err(storage_err)?;
        const FIND_SQL: &str = "
            SELECT summary FROM dedup_metadata.ingestion_run
            WHERE batch_id = $1
              AND input_fingerprint = $2
              AND status = 'completed'
              AND summary IS NOT NULL
            ORDER BY started_at DESC
            LIMIT 1";
        let row = conn
            .query_opt(FIND_SQL, &[&batch_id, &input_fingerprint])
            .await
            .context("Failed to query completed runs")
            .map_err(storage_err)?;
        match row {
            Some(row) => {
                let summary_json: serde_json::Value = row.get("summary");
                let summary = serde_json::from_value(summary_json)
                    .context("Failed to deserialize stored run summary")
                    .map_err(DedupError::Other)?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    async fn finish_run(
        &self,
        run: &IngestionRun,
        summary: &IngestionRunSummary,
    ) -> DedupResult<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for finish_run")
            .map_err(storage_err)?;
        let summary_json = serde_json::to_value(summary)
            .context("Failed to serialize run summary")
            .map_err(DedupError::Other)?;
        const FINISH_SQL: &str = "
            UPDATE dedup_metadata.ingestion_run
            SET status = $2, finished_at = $3,
                unique_count = $4, merged_count = $5, needs_review_count = $6,
                rejected_count = $7,
                normalize_time = $8, match_time = $9, reconcile_time = $10,
                merge_time = $11, total_time = $12,
                summary = $13
            WHERE run_id = $1";
        conn.execute(
            FINISH_SQL,
            &[
                &run.run_id,
                &run.status.as_str(),
                &run.finished_at,
                &(run.unique_count as i64),
                &(run.merged_count as i64),
                &(run.needs_review_count as i64),
                &(run.rejected_count as i64),
                &run.phase_times.normalize_time,
                &run.phase_times.match_time,
                &run.phase_times.reconcile_time,
                &run.phase_times.merge_time,
                &run.phase_times.total_time,
                &summary_json,
            ],
        )
        .await
        .context("Failed to finalize ingestion_run")
        .map_err(storage_err)?;
        Ok(())
    }

    async fn append_run_errors(&self, run_id: &str, errors: &[RunError]) -> DedupResult<()> {
        if errors.is_empty() {
            return Ok(());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for append_run_errors")
            .map_err(storage_err)?;
        let mut id_vec = Vec::with_capacity(errors.len());
        let mut record_ref_vec = Vec::with_capacity(errors.len());
        let mut kind_vec = Vec::with_capacity(errors.len());
        let mut message_vec = Vec::with_capacity(errors.len());
        let mut occurred_vec = Vec::with_capacity(errors.len());
        for error in errors {
            id_vec.push(Uuid::new_v4().to_string());
            record_ref_vec.push(error.record_ref.clone());
            kind_vec.push(error.kind.clone());
            message_vec.push(error.message.clone());
            occurred_vec.push(error.occurred_at);
        }
        const INSERT_SQL: &str = "
            INSERT INTO dedup_metadata.ingestion_run_error
                (id, run_id, record_ref, kind, message, occurred_at)
            SELECT u.id, $2, u.record_ref, u.kind, u.message, u.occurred_at
            FROM UNNEST($1::text[], $3::text[], $4::text[], $5::text[], $6::timestamptz[])
                 AS u(id, record_ref, kind, message, occurred_at)";
        conn.execute(
            INSERT_SQL,
            &[
                &id_vec,
                &run_id,
                &record_ref_vec,
                &kind_vec,
                &message_vec,
                &occurred_vec,
            ],
        )
        .await
        .context("Failed to append run errors")
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_match_audit(&self, entries: &[MatchAuditEntry]) -> DedupResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for record_match_audit")
            .map_err(storage_err)?;
        let mut id_vec = Vec::with_capacity(entries.len());
        let mut run_id_vec = Vec::with_capacity(entries.len());
        let mut record_id_vec = Vec::with_capacity(entries.len());
        let mut candidate_id_vec = Vec::with_capacity(entries.len());
        let mut rule_vec = Vec::with_capacity(entries.len());
        let mut outcome_vec = Vec::with_capacity(entries.len());
        let mut score_vec = Vec::with_capacity(entries.len());
        let mut fields_vec = Vec::with_capacity(entries.len());
        let mut detail_vec = Vec::with_capacity(entries.len());
        let mut created_vec = Vec::with_capacity(entries.len());
        for entry in entries {
            id_vec.push(Uuid::new_v4().to_string());
            run_id_vec.push(entry.run_id.clone());
            record_id_vec.push(entry.record_id.0.clone());
            candidate_id_vec.push(entry.candidate_id.as_ref().map(|id| id.0.clone()));
            rule_vec.push(entry.rule.clone());
            outcome_vec.push(entry.outcome.clone());
            score_vec.push(entry.score);
            fields_vec.push(
                serde_json::to_value(&entry.matched_fields)
                    .context("Failed to serialize matched fields")
                    .map_err(DedupError::Other)?,
            );
            detail_vec.push(entry.detail.clone());
            created_vec.push(entry.created_at);
        }
        const INSERT_SQL: &str = "
            INSERT INTO dedup_metadata.match_audit
                (id, run_id, record_id, candidate_id, rule, outcome, score,
                 matched_fields, detail, created_at)
            SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[],
                                 $6::text[], $7::float8[], $8::jsonb[], $9::text[],
                                 $10::timestamptz[])";
        conn.execute(
            INSERT_SQL,
            &[
                &id_vec,
                &run_id_vec,
                &record_id_vec,
                &candidate_id_vec,
                &rule_vec,
                &outcome_vec,
                &score_vec,
                &fields_vec,
                &detail_vec,
                &created_vec,
            ],
        )
        .await
        .context("Failed to record match audit entries")
        .map_err(storage_err)?;
        Ok(())
    }
}
