// src/matching/scoring.rs
//
// Match Scorer: deterministic weighted score for one record pair. The
// identifier part is the maximum matched indicator weight; the fuzzy part
// (name / DOB / address) is scaled under a ceiling so soft evidence alone
// can never look like identifier-grade certainty.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use strsim::jaro_winkler;

use crate::config::MatchingConfig;
use crate::models::core::{CustomerRecord, IdentifierKind};
use crate::models::matching::{MatchCandidate, MatchField};

/// Name similarity at or above which the name counts as a contributing
/// field in `matched_fields`.
const NAME_CONTRIBUTION_FLOOR: f64 = 0.80;
/// Address similarity at or above which the address counts as contributing.
const ADDRESS_CONTRIBUTION_FLOOR: f64 = 0.5;

pub fn score_pair(
    record: &CustomerRecord,
    candidate: &CustomerRecord,
    config: &MatchingConfig,
) -> MatchCandidate {
    let mut matched_fields: BTreeSet<MatchField> = BTreeSet::new();
    let mut identifier_part: f64 = 0.0;

    for kind in IdentifierKind::ALL {
        if let (Some(a), Some(b)) = (record.identifier(kind), candidate.identifier(kind)) {
            if a == b {
                matched_fields.insert(MatchField::from(kind));
                identifier_part = identifier_part.max(config.identifier_weights.weight(kind));
            }
        }
    }

    let name_similarity = match (record.full_name.as_deref(), candidate.full_name.as_deref()) {
        (Some(a), Some(b)) => jaro_winkler(a, b),
        _ => 0.0,
    };
    let dob_similarity = date_of_birth_similarity(record.date_of_birth, candidate.date_of_birth);
    let address_sim = address_similarity(
        record.address.as_deref(),
        record.postal_code.as_deref(),
        candidate.address.as_deref(),
        candidate.postal_code.as_deref(),
    );

    if name_similarity >= NAME_CONTRIBUTION_FLOOR {
        matched_fields.insert(MatchField::Name);
    }
    if dob_similarity > 0.0 {
        matched_fields.insert(MatchField::DateOfBirth);
    }
    if address_sim >= ADDRESS_CONTRIBUTION_FLOOR {
        matched_fields.insert(MatchField::Address);
    }

    let raw_fuzzy = config.fuzzy_name_weight * name_similarity
        + config.fuzzy_dob_weight * dob_similarity
        + config.fuzzy_address_weight * address_sim;
    let fuzzy_part = raw_fuzzy * config.fuzzy_ceiling;

    let score = (identifier_part + fuzzy_part).min(1.0);

    MatchCandidate {
        record_id: record.id.clone(),
        candidate_id: candidate.id.clone(),
        score,
        matched_fields,
    }
}

/// 1.0 on exact equality, 0.6 when the only difference is a day/month
/// transposition (a very common keying error), 0 otherwise or when either
/// side is absent.
pub fn date_of_birth_similarity(a: Option<NaiveDate>, b: Option<NaiveDate>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some(a), Some(b)) => {
            let transposed = NaiveDate::from_ymd_opt(a.year(), a.day(), a.month());
            if transposed == Some(b) {
                0.6
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Token-overlap Jaccard on the normalized address line, weighted with
/// postal-code agreement.
pub fn address_similarity(
    a_address: Option<&str>,
    a_postal: Option<&str>,
    b_address: Option<&str>,
    b_postal: Option<&str>,
) -> f64 {
    let jaccard = match (a_address, b_address) {
        (Some(a), Some(b)) => token_jaccard(a, b),
        _ => 0.0,
    };
    let postal_match = match (a_postal, b_postal) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    };
    0.7 * jaccard + 0.3 * postal_match
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let a_tokens: BTreeSet<&str> = a.split_whitespace().collect();
    let b_tokens: BTreeSet<&str> = b.split_whitespace().collect();
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    intersection as f64 / union as f64
}
