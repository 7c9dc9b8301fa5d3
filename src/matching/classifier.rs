// src/matching/classifier.rs
//
// Dedup Classifier: a fixed, ordered table of named rules evaluated
// first-match-wins. Identifier evidence outranks scores in both
// directions: a clean single-target identifier match merges regardless of
// score, and identifiers pointing at different candidates force review
// regardless of score.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::config::MatchingConfig;
use crate::models::core::RecordId;
use crate::models::matching::{
    Classification, ClassifierVerdict, MatchCandidate, MatchField, ReviewReason,
};

pub struct RuleContext<'a> {
    pub record_id: &'a RecordId,
    /// Scored pairs for this record, any order; rules sort as needed.
    pub pairs: &'a [MatchCandidate],
    pub config: &'a MatchingConfig,
}

type Rule = fn(&RuleContext) -> Option<Classification>;

/// The decision table. Order is the contract: earlier rules outrank later
/// ones, and reordering changes outcomes.
pub const RULES: [(&str, Rule); 5] = [
    ("identifier_consensus", identifier_consensus),
    ("identifier_conflict", identifier_conflict),
    ("score_high", score_high),
    ("score_review_band", score_review_band),
    ("fallthrough_unique", fallthrough_unique),
];

pub fn classify(context: &RuleContext) -> ClassifierVerdict {
    for (name, rule) in RULES.iter() {
        if let Some(classification) = rule(context) {
            debug!("Record {} classified by rule '{}'", context.record_id, name);
            return ClassifierVerdict {
                rule: name,
                classification,
            };
        }
    }
    // fallthrough_unique never declines; this line is unreachable but keeps
    // the loop total without a panic path.
    ClassifierVerdict {
        rule: "fallthrough_unique",
        classification: Classification::Unique,
    }
}

/// Candidates that share at least one exact identifier with the record,
/// keyed by candidate id, with the identifier fields behind the evidence.
fn identifier_targets(context: &RuleContext) -> BTreeMap<RecordId, BTreeSet<MatchField>> {
    let mut targets: BTreeMap<RecordId, BTreeSet<MatchField>> = BTreeMap::new();
    for pair in context.pairs {
        let identifier_fields: BTreeSet<MatchField> = pair
            .matched_fields
            .iter()
            .filter(|f| f.is_identifier())
            .copied()
            .collect();
        if !identifier_fields.is_empty() {
            targets
                .entry(pair.candidate_id.clone())
                .or_default()
                .extend(identifier_fields);
        }
    }
    targets
}

/// Best pair: highest score, ties to the smaller candidate id so verdicts
/// are stable across runs.
fn best_pair<'a>(context: &'a RuleContext) -> Option<&'a MatchCandidate> {
    context.pairs.iter().min_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    })
}

fn identifier_consensus(context: &RuleContext) -> Option<Classification> {
    let targets = identifier_targets(context);
    if targets.len() != 1 {
        return None;
    }
    let target = targets.keys().next()?.clone();
    let score = context
        .pairs
        .iter()
        .filter(|p| p.candidate_id == target)
        .map(|p| p.score)
        .fold(0.0_f64, f64::max);
    Some(Classification::MergeAccepted { target, score })
}

fn identifier_conflict(context: &RuleContext) -> Option<Classification> {
    let targets = identifier_targets(context);
    if targets.len() < 2 {
        return None;
    }
    let details = targets
        .iter()
        .map(|(candidate, fields)| {
            let field_names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
            format!("{} -> {}", field_names.join("+"), candidate)
        })
        .collect::<Vec<_>>()
        .join("; ");
    let candidates: Vec<RecordId> = targets.into_keys().collect();
    Some(Classification::NeedsReview {
        review: ReviewReason::IdentifierConflict { details },
        candidates,
    })
}

fn score_high(context: &RuleContext) -> Option<Classification> {
    let best = best_pair(context)?;
    if best.score >= context.config.accept_threshold {
        Some(Classification::MergeAccepted {
            target: best.candidate_id.clone(),
            score: best.score,
        })
    } else {
        None
    }
}

fn score_review_band(context: &RuleContext) -> Option<Classification> {
    let best = best_pair(context)?;
    if best.score >= context.config.review_threshold {
        let mut in_band: Vec<&MatchCandidate> = context
            .pairs
            .iter()
            .filter(|p| p.score >= context.config.review_threshold)
            .collect();
        in_band.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        Some(Classification::NeedsReview {
            review: ReviewReason::ScoreInReviewBand { score: best.score },
            candidates: in_band.into_iter().map(|p| p.candidate_id.clone()).collect(),
        })
    } else {
        None
    }
}

fn fallthrough_unique(_context: &RuleContext) -> Option<Classification> {
    Some(Classification::Unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(candidate: &str, score: f64, fields: &[MatchField]) -> MatchCandidate {
        MatchCandidate {
            record_id: RecordId("incoming".into()),
            candidate_id: RecordId(candidate.into()),
            score,
            matched_fields: fields.iter().copied().collect(),
        }
    }

    fn verdict(pairs: &[MatchCandidate]) -> ClassifierVerdict {
        let config = MatchingConfig::default();
        let record_id = RecordId("incoming".into());
        classify(&RuleContext {
            record_id: &record_id,
            pairs,
            config: &config,
        })
    }

    #[test]
    fn test_no_candidates_is_unique() {
        let v = verdict(&[]);
        assert_eq!(v.rule, "fallthrough_unique");
        assert_eq!(v.classification, Classification::Unique);
    }

    #[test]
    fn test_single_identifier_target_merges_even_with_weak_score() {
        // Email alone scores 0.60, well under the accept threshold, but a
        // lone identifier target merges on consensus.
        let pairs = vec![pair("book-1", 0.60, &[MatchField::Email])];
        let v = verdict(&pairs);
        assert_eq!(v.rule, "identifier_consensus");
        assert_eq!(
            v.classification,
            Classification::MergeAccepted {
                target: RecordId("book-1".into()),
                score: 0.60,
            }
        );
    }

    #[test]
    fn test_consensus_allows_extra_fuzzy_only_candidates() {
        let pairs = vec![
            pair("book-1", 0.90, &[MatchField::NationalId, MatchField::Name]),
            pair("book-2", 0.55, &[MatchField::Name]),
        ];
        let v = verdict(&pairs);
        assert_eq!(v.rule, "identifier_consensus");
        assert!(matches!(
            v.classification,
            Classification::MergeAccepted { ref target, .. } if *target == RecordId("book-1".into())
        ));
    }

    #[test]
    fn test_conflicting_identifiers_force_review_over_high_score() {
        // book-1 would clear the accept threshold on its own, but the
        // national id points at book-2: conflict outranks score.
        let pairs = vec![
            pair("book-1", 0.95, &[MatchField::Mobile, MatchField::Name]),
            pair("book-2", 0.90, &[MatchField::NationalId]),
        ];
        let v = verdict(&pairs);
        assert_eq!(v.rule, "identifier_conflict");
        match v.classification {
            Classification::NeedsReview { review, candidates } => {
                assert_eq!(candidates.len(), 2);
                match review {
                    ReviewReason::IdentifierConflict { details } => {
                        assert!(details.contains("mobile"));
                        assert!(details.contains("national_id"));
                    }
                    other => panic!("expected IdentifierConflict, got {other:?}"),
                }
            }
            other => panic!("expected NeedsReview, got {other:?}"),
        }
    }

    #[test]
    fn test_high_fuzzy_score_merges_without_identifiers() {
        let pairs = vec![pair("book-1", 0.86, &[MatchField::Name, MatchField::DateOfBirth])];
        let v = verdict(&pairs);
        assert_eq!(v.rule, "score_high");
    }

    #[test]
    fn test_review_band_boundaries() {
        // Exactly at the review threshold: review.
        let v = verdict(&[pair("book-1", 0.50, &[MatchField::Name])]);
        assert_eq!(v.rule, "score_review_band");

        // Just under the accept threshold: still review.
        let v = verdict(&[pair("book-1", 0.8499, &[MatchField::Name])]);
        assert_eq!(v.rule, "score_review_band");

        // Exactly at the accept threshold: merge.
        let v = verdict(&[pair("book-1", 0.85, &[MatchField::Name])]);
        assert_eq!(v.rule, "score_high");

        // Under the review threshold: unique.
        let v = verdict(&[pair("book-1", 0.49, &[MatchField::Name])]);
        assert_eq!(v.rule, "fallthrough_unique");
    }

    #[test]
    fn test_review_band_lists_candidates_best_first() {
        let pairs = vec![
            pair("book-3", 0.55, &[MatchField::Name]),
            pair("book-1", 0.70, &[MatchField::Name]),
            pair("book-2", 0.40, &[MatchField::Name]),
        ];
        let v = verdict(&pairs);
        match v.classification {
            Classification::NeedsReview { candidates, .. } => {
                assert_eq!(
                    candidates,
                    vec![RecordId("book-1".into()), RecordId("book-3".into())]
                );
            }
            other => panic!("expected NeedsReview, got {other:?}"),
        }
    }

    #[test]
    fn test_equal_scores_break_ties_on_candidate_id() {
        let pairs = vec![
            pair("book-b", 0.90, &[MatchField::Name]),
            pair("book-a", 0.90, &[MatchField::Name]),
        ];
        let v = verdict(&pairs);
        assert!(matches!(
            v.classification,
            Classification::MergeAccepted { ref target, .. } if *target == RecordId("book-a".into())
        ));
    }
}
