// src/models/core.rs
//
// Core domain entities: customer records as ingested and persisted, the
// offers that ride on them, and the identifier vocabulary the matchers
// work over.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upstream loan product a record arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductOrigin {
    Loyalty,
    Preapproved,
    EAggregator,
    Topup,
}

impl ProductOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductOrigin::Loyalty => "loyalty",
            ProductOrigin::Preapproved => "preapproved",
            ProductOrigin::EAggregator => "e_aggregator",
            ProductOrigin::Topup => "topup",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "loyalty" => Some(ProductOrigin::Loyalty),
            "preapproved" | "pre_approved" | "pre-approved" => Some(ProductOrigin::Preapproved),
            "e_aggregator" | "eaggregator" | "e-aggregator" => Some(ProductOrigin::EAggregator),
            "topup" | "top_up" | "top-up" => Some(ProductOrigin::Topup),
            _ => None,
        }
    }

    /// Matching partition this origin belongs to. Top-up records match only
    /// among themselves; every other origin shares one universe.
    pub fn partition(&self) -> MatchPartition {
        match self {
            ProductOrigin::Topup => MatchPartition::Topup,
            _ => MatchPartition::General,
        }
    }
}

/// Candidate retrieval universe. Cross-partition pairs are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPartition {
    General,
    Topup,
}

impl MatchPartition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPartition::General => "general",
            MatchPartition::Topup => "topup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStatus {
    Pending,
    Unique,
    Merged,
    NeedsReview,
}

impl DedupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupStatus::Pending => "pending",
            DedupStatus::Unique => "unique",
            DedupStatus::Merged => "merged",
            DedupStatus::NeedsReview => "needs_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DedupStatus::Pending),
            "unique" => Some(DedupStatus::Unique),
            "merged" => Some(DedupStatus::Merged),
            "needs_review" => Some(DedupStatus::NeedsReview),
            _ => None,
        }
    }
}

/// The identifier columns that participate in exact matching, in precedence
/// order. The derived `Ord` follows declaration order, so "first present
/// identifier" scans can iterate `ALL` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    UniqueCustomerId,
    NationalId,
    BiometricId,
    LoanApplicationNo,
    Mobile,
    Email,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 6] = [
        IdentifierKind::UniqueCustomerId,
        IdentifierKind::NationalId,
        IdentifierKind::BiometricId,
        IdentifierKind::LoanApplicationNo,
        IdentifierKind::Mobile,
        IdentifierKind::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::UniqueCustomerId => "unique_customer_id",
            IdentifierKind::NationalId => "national_id",
            IdentifierKind::BiometricId => "biometric_id",
            IdentifierKind::LoanApplicationNo => "loan_application_no",
            IdentifierKind::Mobile => "mobile",
            IdentifierKind::Email => "email",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Loyalty,
    Preapproved,
    EAggregator,
    Topup,
}

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferKind::Loyalty => "loyalty",
            OfferKind::Preapproved => "preapproved",
            OfferKind::EAggregator => "e_aggregator",
            OfferKind::Topup => "topup",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "loyalty" => Some(OfferKind::Loyalty),
            "preapproved" | "pre_approved" | "pre-approved" => Some(OfferKind::Preapproved),
            "e_aggregator" | "eaggregator" | "e-aggregator" => Some(OfferKind::EAggregator),
            "topup" | "top_up" | "top-up" => Some(OfferKind::Topup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Active,
    Invalid,
    Expired,
    JourneyStarted,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Active => "active",
            OfferStatus::Invalid => "invalid",
            OfferStatus::Expired => "expired",
            OfferStatus::JourneyStarted => "journey_started",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(OfferStatus::Active),
            "invalid" => Some(OfferStatus::Invalid),
            "expired" => Some(OfferStatus::Expired),
            "journey_started" => Some(OfferStatus::JourneyStarted),
            _ => None,
        }
    }
}

/// One ingested row exactly as an upstream source delivers it: a customer
/// and the single offer riding on that row. Every field except the source
/// reference, origin tag and offer shape is optional; the normalizer decides
/// what is usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCustomerRecord {
    /// Upstream row reference, carried through error descriptors.
    pub source_ref: String,
    pub product_origin: String,
    pub mobile: Option<String>,
    pub national_id: Option<String>,
    pub biometric_id: Option<String>,
    pub email: Option<String>,
    pub unique_customer_id: Option<String>,
    pub loan_application_no: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub offer_type: String,
    pub offer_valid_from: String,
    pub offer_valid_to: String,
    /// Upstream event time; rows without one are stamped at ingest.
    pub created_at: Option<String>,
}

/// A raw record after canonicalization, ready to be persisted and matched.
/// All identifier fields are either canonical or absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub source_ref: String,
    pub product_origin: ProductOrigin,
    pub mobile: Option<String>,
    pub national_id: Option<String>,
    pub biometric_id: Option<String>,
    pub email: Option<String>,
    pub unique_customer_id: Option<String>,
    pub loan_application_no: Option<String>,
    /// Normalized full name (lowercase, honorifics stripped, collapsed).
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    /// Normalized address line, postal code split out when found.
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub offer_kind: OfferKind,
    pub offer_valid_from: NaiveDate,
    pub offer_valid_to: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Canonical customer record as persisted in `public.customer_record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: RecordId,
    pub product_origin: ProductOrigin,
    pub mobile: Option<String>,
    pub national_id: Option<String>,
    pub biometric_id: Option<String>,
    pub email: Option<String>,
    pub unique_customer_id: Option<String>,
    pub loan_application_no: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub dedup_status: DedupStatus,
    /// Surviving record this one was folded into, set when status is Merged.
    pub survivor_of: Option<RecordId>,
    pub created_at: DateTime<Utc>,
}

impl CustomerRecord {
    pub fn partition(&self) -> MatchPartition {
        self.product_origin.partition()
    }

    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::UniqueCustomerId => self.unique_customer_id.as_deref(),
            IdentifierKind::NationalId => self.national_id.as_deref(),
            IdentifierKind::BiometricId => self.biometric_id.as_deref(),
            IdentifierKind::LoanApplicationNo => self.loan_application_no.as_deref(),
            IdentifierKind::Mobile => self.mobile.as_deref(),
            IdentifierKind::Email => self.email.as_deref(),
        }
    }

    /// All identifiers present on this record, in precedence order.
    pub fn identifiers(&self) -> Vec<(IdentifierKind, &str)> {
        IdentifierKind::ALL
            .iter()
            .filter_map(|kind| self.identifier(*kind).map(|value| (*kind, value)))
            .collect()
    }

    /// First present identifier on the canonical ordering. Used for worker
    /// hash-bucketing; a record that reaches matching always has one.
    pub fn primary_identifier(&self) -> Option<(IdentifierKind, &str)> {
        IdentifierKind::ALL
            .iter()
            .find_map(|kind| self.identifier(*kind).map(|value| (*kind, value)))
    }

    /// Whitespace tokens of the normalized name, for blocking and overlap
    /// checks.
    pub fn name_tokens(&self) -> Vec<&str> {
        self.full_name
            .as_deref()
            .map(|name| name.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Offer riding on a customer record, persisted in `public.offer`. An offer
/// never outlives its owner: merges re-point `customer_id` at the survivor
/// in the same transaction that retires the source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub customer_id: RecordId,
    pub offer_kind: OfferKind,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub status: OfferStatus,
    /// Reason code set whenever status moves off Active (e.g.
    /// ACTIVE_LOAN_EXISTS, DUPLICATE_OF_RETAINED).
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
