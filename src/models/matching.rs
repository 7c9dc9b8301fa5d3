// src/models/matching.rs
//
// Transient matching artifacts: scored pairs, classifier verdicts, merge
// groups and the audit rows they leave behind. None of these outlive a run
// except as audit entries.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::core::{CustomerRecord, IdentifierKind, OfferId, RecordId};

/// A field that contributed evidence to a pair score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    UniqueCustomerId,
    NationalId,
    BiometricId,
    LoanApplicationNo,
    Mobile,
    Email,
    Name,
    DateOfBirth,
    Address,
}

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchField::UniqueCustomerId => "unique_customer_id",
            MatchField::NationalId => "national_id",
            MatchField::BiometricId => "biometric_id",
            MatchField::LoanApplicationNo => "loan_application_no",
            MatchField::Mobile => "mobile",
            MatchField::Email => "email",
            MatchField::Name => "name",
            MatchField::DateOfBirth => "date_of_birth",
            MatchField::Address => "address",
        }
    }

    /// True for fields that identify directly rather than fuzzily.
    pub fn is_identifier(&self) -> bool {
        !matches!(
            self,
            MatchField::Name | MatchField::DateOfBirth | MatchField::Address
        )
    }
}

impl From<IdentifierKind> for MatchField {
    fn from(kind: IdentifierKind) -> Self {
        match kind {
            IdentifierKind::UniqueCustomerId => MatchField::UniqueCustomerId,
            IdentifierKind::NationalId => MatchField::NationalId,
            IdentifierKind::BiometricId => MatchField::BiometricId,
            IdentifierKind::LoanApplicationNo => MatchField::LoanApplicationNo,
            IdentifierKind::Mobile => MatchField::Mobile,
            IdentifierKind::Email => MatchField::Email,
        }
    }
}

/// A stored record pulled into comparison, with the exact identifiers that
/// pulled it in (empty when only the fuzzy pass surfaced it).
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub record: CustomerRecord,
    pub exact_matches: BTreeSet<IdentifierKind>,
}

/// One scored comparison between an incoming record and a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record_id: RecordId,
    pub candidate_id: RecordId,
    pub score: f64,
    pub matched_fields: BTreeSet<MatchField>,
}

impl MatchCandidate {
    /// Exact-identifier evidence present on this pair.
    pub fn has_identifier_evidence(&self) -> bool {
        self.matched_fields.iter().any(|f| f.is_identifier())
    }
}

/// Why a record landed in the review queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReviewReason {
    IdentifierConflict { details: String },
    ScoreInReviewBand { score: f64 },
    LiveBookUnavailable,
}

/// Outcome of the ordered rule table for one incoming record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Classification {
    MergeAccepted {
        target: RecordId,
        score: f64,
    },
    NeedsReview {
        review: ReviewReason,
        candidates: Vec<RecordId>,
    },
    Unique,
}

/// A classification plus the name of the rule that produced it, for the
/// audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierVerdict {
    pub rule: &'static str,
    pub classification: Classification,
}

/// A set of records transitively connected by accepted matches, with the
/// chosen survivor. `merged_ids` excludes the survivor and is kept in
/// ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub survivor_id: RecordId,
    pub merged_ids: Vec<RecordId>,
}

impl MergeGroup {
    /// Every member id including the survivor, ascending. This is also the
    /// lock-acquisition order for the group commit.
    pub fn all_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.merged_ids.clone();
        ids.push(self.survivor_id.clone());
        ids.sort();
        ids
    }
}

/// Audit row persisted to `dedup_metadata.match_audit`, one per classifier
/// verdict (and one per live-book degradation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchAuditEntry {
    pub run_id: String,
    pub record_id: RecordId,
    pub candidate_id: Option<RecordId>,
    pub rule: String,
    pub outcome: String,
    pub score: Option<f64>,
    pub matched_fields: Vec<MatchField>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Offers invalidated during reconciliation or merge, with the reason code
/// that will be written to `status_reason`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferInvalidation {
    pub offer_id: OfferId,
    pub reason_code: String,
}
