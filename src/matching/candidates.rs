// src/matching/candidates.rs
//
// Candidate Finder: exact pass over every present identifier, then a
// bounded fuzzy pass. The partition boundary is applied by the repository
// queries themselves, so a top-up record can never even see a non-top-up
// candidate.

use std::collections::BTreeSet;
use std::collections::HashMap;

use log::debug;
use strsim::jaro_winkler;

use crate::config::MatchingConfig;
use crate::error::DedupResult;
use crate::models::core::{CustomerRecord, RecordId};
use crate::models::matching::CandidateRecord;
use crate::storage::{CustomerRepository, SimilarityProbe};

pub async fn find_candidates(
    repo: &dyn CustomerRepository,
    record: &CustomerRecord,
    config: &MatchingConfig,
) -> DedupResult<Vec<CandidateRecord>> {
    let partition = record.partition();
    let mut by_id: HashMap<RecordId, CandidateRecord> = HashMap::new();

    // Exact pass: union over every present identifier. These hits are kept
    // unconditionally, even past the candidate cap.
    for (kind, value) in record.identifiers() {
        let found = repo.find_by_identifier(kind, value, partition).await?;
        for candidate in found {
            if candidate.id == record.id {
                continue;
            }
            by_id
                .entry(candidate.id.clone())
                .or_insert_with(|| CandidateRecord {
                    record: candidate,
                    exact_matches: BTreeSet::new(),
                })
                .exact_matches
                .insert(kind);
        }
    }

    let exact_count = by_id.len();

    // Fuzzy pass fills whatever room the cap leaves.
    if exact_count < config.max_candidates {
        let limit = config.max_candidates - exact_count;
        let mut exclude: Vec<RecordId> = by_id.keys().cloned().collect();
        exclude.push(record.id.clone());

        let probe = SimilarityProbe {
            name_tokens: record.name_tokens().iter().map(|t| t.to_string()).collect(),
            date_of_birth: record.date_of_birth,
            postal_code: record.postal_code.clone(),
            exclude,
        };
        let blocked = repo.find_similar(&probe, partition, limit).await?;

        let mut ranked: Vec<(f64, CustomerRecord)> = blocked
            .into_iter()
            .filter(|c| c.id != record.id && !by_id.contains_key(&c.id))
            .map(|c| (name_similarity(record, &c), c))
            .filter(|(similarity, candidate)| {
                // When both sides carry a name, weak name similarity drops
                // the candidate; name-less pairs stay blocked-in.
                if record.full_name.is_some() && candidate.full_name.is_some() {
                    *similarity >= config.min_name_similarity
                } else {
                    true
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        ranked.truncate(limit);

        for (_, candidate) in ranked {
            by_id.insert(
                candidate.id.clone(),
                CandidateRecord {
                    record: candidate,
                    exact_matches: BTreeSet::new(),
                },
            );
        }
    }

    let mut candidates: Vec<CandidateRecord> = by_id.into_values().collect();
    candidates.sort_by(|a, b| a.record.id.cmp(&b.record.id));

    debug!(
        "Record {}: {} candidate(s) ({} exact) in partition {}",
        record.id,
        candidates.len(),
        exact_count,
        partition.as_str()
    );
    Ok(candidates)
}

fn name_similarity(record: &CustomerRecord, candidate: &CustomerRecord) -> f64 {
    match (record.full_name.as_deref(), candidate.full_name.as_deref()) {
        (Some(a), Some(b)) => jaro_winkler(a, b),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{DedupStatus, ProductOrigin};
    use crate::storage::memory::MemoryRepository;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(id: &str, origin: ProductOrigin, mobile: &str, name: &str) -> CustomerRecord {
        CustomerRecord {
            id: RecordId(id.to_string()),
            product_origin: origin,
            mobile: Some(mobile.to_string()),
            national_id: None,
            biometric_id: None,
            email: None,
            unique_customer_id: None,
            loan_application_no: None,
            full_name: Some(name.to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1988, 6, 14),
            address: None,
            postal_code: None,
            dedup_status: DedupStatus::Pending,
            survivor_of: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_exact_hits_survive_a_tiny_cap() {
        let repo = MemoryRepository::new();
        for i in 0..3 {
            repo.seed_record(
                record(
                    &format!("book-{}", i),
                    ProductOrigin::Loyalty,
                    "9876543210",
                    "ravi kumar",
                ),
                None,
            )
            .await;
        }
        let incoming = record("incoming", ProductOrigin::Preapproved, "9876543210", "ravi kumar");

        let config = MatchingConfig {
            max_candidates: 2,
            ..MatchingConfig::default()
        };
        let candidates = find_candidates(&repo, &incoming, &config).await.unwrap();
        // Three exact hits beat the cap of two.
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| !c.exact_matches.is_empty()));
    }

    #[tokio::test]
    async fn test_topup_never_sees_the_general_partition() {
        let repo = MemoryRepository::new();
        // Nearly identical person on the general book.
        repo.seed_record(
            record("general-1", ProductOrigin::Loyalty, "9876543210", "meera iyer"),
            None,
        )
        .await;

        let incoming = record("incoming", ProductOrigin::Topup, "9876543210", "meera iyer");
        let candidates = find_candidates(&repo, &incoming, &MatchingConfig::default())
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_fuzzy_pass_fills_remaining_room_ranked_by_name() {
        let repo = MemoryRepository::new();
        repo.seed_record(
            record("exact-1", ProductOrigin::Loyalty, "9876543210", "meera iyer"),
            None,
        )
        .await;
        // Same DOB blocks these in; names decide the ranking.
        repo.seed_record(
            record("close", ProductOrigin::Loyalty, "9123456780", "meera v iyer"),
            None,
        )
        .await;
        repo.seed_record(
            record("far", ProductOrigin::Loyalty, "9123456781", "arjun nair"),
            None,
        )
        .await;

        let incoming = record("incoming", ProductOrigin::Preapproved, "9876543210", "meera iyer");
        let candidates = find_candidates(&repo, &incoming, &MatchingConfig::default())
            .await
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.record.id.0.as_str()).collect();
        assert!(ids.contains(&"exact-1"));
        assert!(ids.contains(&"close"));
        // Dissimilar name falls under the similarity floor.
        assert!(!ids.contains(&"far"));

        let exact = candidates
            .iter()
            .find(|c| c.record.id.0 == "exact-1")
            .unwrap();
        assert!(exact.exact_matches.contains(&crate::models::core::IdentifierKind::Mobile));
        let fuzzy = candidates.iter().find(|c| c.record.id.0 == "close").unwrap();
        assert!(fuzzy.exact_matches.is_empty());
    }

    #[tokio::test]
    async fn test_fuzzy_pass_respects_the_cap() {
        let repo = MemoryRepository::new();
        for i in 0..10 {
            repo.seed_record(
                record(
                    &format!("near-{}", i),
                    ProductOrigin::Loyalty,
                    &format!("91234567{:02}", i),
                    "meera iyer",
                ),
                None,
            )
            .await;
        }
        let incoming = record("incoming", ProductOrigin::Preapproved, "9876543210", "meera iyer");
        let config = MatchingConfig {
            max_candidates: 4,
            ..MatchingConfig::default()
        };
        let candidates = find_candidates(&repo, &incoming, &config).await.unwrap();
        assert_eq!(candidates.len(), 4);
    }
}
