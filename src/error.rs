// src/error.rs
//
// Error taxonomy for the dedup pipeline. The split that matters is
// per-record vs batch-fatal: per-record errors are appended to the run's
// error list and processing continues; batch-fatal errors abort the run.

use chrono::Utc;
use thiserror::Error;

use crate::models::stats_models::RunError;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Malformed record {record_ref}: field '{field}': {reason}")]
    MalformedRecord {
        record_ref: String,
        field: &'static str,
        reason: String,
    },

    #[error("Conflicting identifiers on record {record_ref}: {details}")]
    ConflictingIdentifier { record_ref: String, details: String },

    #[error("Live book unavailable for record {record_ref}: {source}")]
    LiveBookUnavailable {
        record_ref: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] anyhow::Error),

    #[error("Rule table invalid: {reason}")]
    RuleTableLoad { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DedupResult<T> = Result<T, DedupError>;

impl DedupError {
    /// Whether this error aborts the whole run rather than a single record.
    /// Unclassified errors abort: a partial outcome must never look like a
    /// complete one.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            DedupError::StorageUnavailable(_)
                | DedupError::RuleTableLoad { .. }
                | DedupError::Other(_)
        )
    }

    /// Stable kind tag written to run error descriptors.
    pub fn kind(&self) -> &'static str {
        match self {
            DedupError::MalformedRecord { .. } => "malformed_record",
            DedupError::ConflictingIdentifier { .. } => "conflicting_identifier",
            DedupError::LiveBookUnavailable { .. } => "live_book_unavailable",
            DedupError::StorageUnavailable(_) => "storage_unavailable",
            DedupError::RuleTableLoad { .. } => "rule_table_load",
            DedupError::Other(_) => "other",
        }
    }

    /// Upstream row reference, when the error is scoped to one record.
    pub fn record_ref(&self) -> Option<&str> {
        match self {
            DedupError::MalformedRecord { record_ref, .. }
            | DedupError::ConflictingIdentifier { record_ref, .. }
            | DedupError::LiveBookUnavailable { record_ref, .. } => Some(record_ref),
            _ => None,
        }
    }

    /// Descriptor appended to `dedup_metadata.ingestion_run_error`.
    pub fn to_run_error(&self) -> RunError {
        RunError {
            record_ref: self.record_ref().map(|s| s.to_string()),
            kind: self.kind().to_string(),
            message: self.to_string(),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_fatal_split() {
        let malformed = DedupError::MalformedRecord {
            record_ref: "row-7".into(),
            field: "mobile",
            reason: "expected 10 digits".into(),
        };
        assert!(!malformed.is_batch_fatal());

        let conflict = DedupError::ConflictingIdentifier {
            record_ref: "row-9".into(),
            details: "national_id and mobile point at different records".into(),
        };
        assert!(!conflict.is_batch_fatal());

        let storage = DedupError::StorageUnavailable(anyhow::anyhow!("pool exhausted"));
        assert!(storage.is_batch_fatal());

        let rules = DedupError::RuleTableLoad {
            reason: "review threshold above accept threshold".into(),
        };
        assert!(rules.is_batch_fatal());
    }

    #[test]
    fn test_run_error_descriptor_carries_record_ref() {
        let err = DedupError::MalformedRecord {
            record_ref: "row-3".into(),
            field: "date_of_birth",
            reason: "unparseable".into(),
        };
        let descriptor = err.to_run_error();
        assert_eq!(descriptor.record_ref.as_deref(), Some("row-3"));
        assert_eq!(descriptor.kind, "malformed_record");
        assert!(descriptor.message.contains("date_of_birth"));
    }
}
