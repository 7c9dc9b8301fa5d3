// src/merge.rs
//
// Merge Resolver: turns accepted pairs into merge groups via connected
// components, picks the deterministic survivor per group, and plans the
// offer consolidation a backend applies inside its commit transaction.

use std::collections::HashMap;

use anyhow::anyhow;
use log::{debug, info, warn};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::error::DedupResult;
use crate::models::core::{CustomerRecord, Offer, OfferId, OfferStatus, RecordId};
use crate::models::matching::{MergeGroup, OfferInvalidation};

/// Reason code written to offers collapsed as duplicates of a retained one.
pub const REASON_DUPLICATE_OF_RETAINED: &str = "DUPLICATE_OF_RETAINED";

/// Build merge groups from accepted pairs. Every id appearing in a pair
/// must be present in `records`; the orchestrator loads candidate copies
/// alongside the batch, so a miss is an invariant breach, not user input.
pub fn resolve_merge_groups(
    accepted_pairs: &[(RecordId, RecordId)],
    records: &HashMap<RecordId, CustomerRecord>,
) -> DedupResult<Vec<MergeGroup>> {
    if accepted_pairs.is_empty() {
        return Ok(Vec::new());
    }

    let mut graph: UnGraph<RecordId, ()> = UnGraph::new_undirected();
    let mut node_of: HashMap<RecordId, NodeIndex> = HashMap::new();

    for (left, right) in accepted_pairs {
        if left == right {
            warn!("Accepted pair links record {} to itself, skipping", left);
            continue;
        }
        let left_idx = *node_of
            .entry(left.clone())
            .or_insert_with(|| graph.add_node(left.clone()));
        let right_idx = *node_of
            .entry(right.clone())
            .or_insert_with(|| graph.add_node(right.clone()));
        if graph.find_edge(left_idx, right_idx).is_none() {
            graph.add_edge(left_idx, right_idx, ());
        }
    }

    debug!(
        "Merge graph: {} records, {} accepted edges, {} components",
        graph.node_count(),
        graph.edge_count(),
        connected_components(&graph)
    );

    let mut visited = vec![false; graph.node_count()];
    let mut groups = Vec::new();

    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if visited[current.index()] {
                continue;
            }
            visited[current.index()] = true;
            component.push(graph[current].clone());
            for neighbor in graph.neighbors(current) {
                if !visited[neighbor.index()] {
                    stack.push(neighbor);
                }
            }
        }
        if component.len() < 2 {
            continue;
        }

        let members: Vec<&CustomerRecord> = component
            .iter()
            .map(|id| {
                records
                    .get(id)
                    .ok_or_else(|| anyhow!("record {} in an accepted pair was never loaded", id))
            })
            .collect::<Result<_, _>>()?;

        let survivor_id = choose_survivor(&members);
        let mut merged_ids: Vec<RecordId> = component
            .into_iter()
            .filter(|id| *id != survivor_id)
            .collect();
        merged_ids.sort();

        groups.push(MergeGroup {
            survivor_id,
            merged_ids,
        });
    }

    // Deterministic commit order across runs.
    groups.sort_by(|a, b| a.survivor_id.cmp(&b.survivor_id));
    info!("Resolved {} merge group(s)", groups.len());
    Ok(groups)
}

/// Earliest `created_at` wins; ties fall to the lexicographically smallest
/// unique customer id (records without one sort after any that have one),
/// then to the smallest record id so selection is total.
fn choose_survivor(members: &[&CustomerRecord]) -> RecordId {
    let mut best = members[0];
    for candidate in &members[1..] {
        let candidate_key = survivor_key(candidate);
        if candidate_key < survivor_key(best) {
            best = candidate;
        }
    }
    best.id.clone()
}

type SurvivorKey<'a> = (
    chrono::DateTime<chrono::Utc>,
    bool,
    Option<&'a str>,
    &'a RecordId,
);

fn survivor_key<'a>(record: &'a CustomerRecord) -> SurvivorKey<'a> {
    (
        record.created_at,
        record.unique_customer_id.is_none(),
        record.unique_customer_id.as_deref(),
        &record.id,
    )
}

/// What a backend must do to the group's offers inside its commit
/// transaction: re-point everything to the survivor, then collapse Active
/// duplicates of the same kind with overlapping validity windows, keeping
/// the most recently created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferConsolidation {
    pub repoint: Vec<OfferId>,
    pub invalidate: Vec<OfferInvalidation>,
}

pub fn plan_offer_consolidation(group: &MergeGroup, offers: &[Offer]) -> OfferConsolidation {
    let mut plan = OfferConsolidation::default();

    for offer in offers {
        if offer.customer_id != group.survivor_id {
            plan.repoint.push(offer.id.clone());
        }
    }

    // Newest first; the first offer of each overlapping window chain wins.
    let mut active: Vec<&Offer> = offers
        .iter()
        .filter(|o| o.status == OfferStatus::Active)
        .collect();
    active.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut kept: Vec<&Offer> = Vec::new();
    for offer in active {
        let duplicate_of_kept = kept.iter().any(|k| {
            k.offer_kind == offer.offer_kind && windows_overlap(k, offer)
        });
        if duplicate_of_kept {
            plan.invalidate.push(OfferInvalidation {
                offer_id: offer.id.clone(),
                reason_code: REASON_DUPLICATE_OF_RETAINED.to_string(),
            });
        } else {
            kept.push(offer);
        }
    }

    plan
}

fn windows_overlap(a: &Offer, b: &Offer) -> bool {
    a.valid_from <= b.valid_to && b.valid_from <= a.valid_to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{DedupStatus, OfferId, OfferKind, ProductOrigin};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(id: &str, created_day: u32, ucid: Option<&str>) -> CustomerRecord {
        CustomerRecord {
            id: RecordId(id.to_string()),
            product_origin: ProductOrigin::Preapproved,
            mobile: Some("9876543210".into()),
            national_id: None,
            biometric_id: None,
            email: None,
            unique_customer_id: ucid.map(|s| s.to_string()),
            loan_application_no: None,
            full_name: Some("ravi kumar".into()),
            date_of_birth: None,
            address: None,
            postal_code: None,
            dedup_status: DedupStatus::Pending,
            survivor_of: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, created_day, 0, 0, 0).unwrap(),
        }
    }

    fn offer(id: &str, owner: &str, kind: OfferKind, from: (i32, u32, u32), to: (i32, u32, u32), created_day: u32) -> Offer {
        Offer {
            id: OfferId(id.to_string()),
            customer_id: RecordId(owner.to_string()),
            offer_kind: kind,
            valid_from: NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            valid_to: NaiveDate::from_ymd_opt(to.0, to.1, to.2).unwrap(),
            status: OfferStatus::Active,
            status_reason: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, created_day, 0, 0, 0).unwrap(),
        }
    }

    fn records_map(records: Vec<CustomerRecord>) -> HashMap<RecordId, CustomerRecord> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    #[test]
    fn test_transitive_pairs_form_one_group() {
        let records = records_map(vec![
            record("a", 3, None),
            record("b", 1, None),
            record("c", 5, None),
        ]);
        let pairs = vec![
            (RecordId("a".into()), RecordId("b".into())),
            (RecordId("b".into()), RecordId("c".into())),
        ];
        let groups = resolve_merge_groups(&pairs, &records).unwrap();
        assert_eq!(groups.len(), 1);
        // b was created first.
        assert_eq!(groups[0].survivor_id, RecordId("b".into()));
        assert_eq!(
            groups[0].merged_ids,
            vec![RecordId("a".into()), RecordId("c".into())]
        );
    }

    #[test]
    fn test_disjoint_pairs_form_separate_groups() {
        let records = records_map(vec![
            record("a", 1, None),
            record("b", 2, None),
            record("c", 1, None),
            record("d", 2, None),
        ]);
        let pairs = vec![
            (RecordId("a".into()), RecordId("b".into())),
            (RecordId("c".into()), RecordId("d".into())),
        ];
        let groups = resolve_merge_groups(&pairs, &records).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_survivor_tie_breaks_on_ucid_then_id() {
        // Same created_at: present UCID beats absent; smaller UCID wins.
        let records = records_map(vec![
            record("x", 1, None),
            record("y", 1, Some("UC200000")),
            record("z", 1, Some("UC100000")),
        ]);
        let pairs = vec![
            (RecordId("x".into()), RecordId("y".into())),
            (RecordId("y".into()), RecordId("z".into())),
        ];
        let groups = resolve_merge_groups(&pairs, &records).unwrap();
        assert_eq!(groups[0].survivor_id, RecordId("z".into()));

        // No UCIDs anywhere: the smallest record id survives.
        let records = records_map(vec![record("m", 1, None), record("k", 1, None)]);
        let pairs = vec![(RecordId("m".into()), RecordId("k".into()))];
        let groups = resolve_merge_groups(&pairs, &records).unwrap();
        assert_eq!(groups[0].survivor_id, RecordId("k".into()));
    }

    #[test]
    fn test_duplicate_edges_and_self_links_ignored() {
        let records = records_map(vec![record("a", 1, None), record("b", 2, None)]);
        let pairs = vec![
            (RecordId("a".into()), RecordId("b".into())),
            (RecordId("b".into()), RecordId("a".into())),
            (RecordId("a".into()), RecordId("a".into())),
        ];
        let groups = resolve_merge_groups(&pairs, &records).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].merged_ids.len(), 1);
    }

    #[test]
    fn test_unloaded_member_is_an_error() {
        let records = records_map(vec![record("a", 1, None)]);
        let pairs = vec![(RecordId("a".into()), RecordId("ghost".into()))];
        assert!(resolve_merge_groups(&pairs, &records).is_err());
    }

    #[test]
    fn test_offer_consolidation_collapses_overlapping_duplicates() {
        let group = MergeGroup {
            survivor_id: RecordId("s".into()),
            merged_ids: vec![RecordId("m".into())],
        };
        let offers = vec![
            // Same kind, overlapping windows: older one collapses.
            offer("o1", "s", OfferKind::Preapproved, (2025, 1, 1), (2025, 6, 30), 1),
            offer("o2", "m", OfferKind::Preapproved, (2025, 3, 1), (2025, 9, 30), 5),
            // Same kind but disjoint window: kept.
            offer("o3", "m", OfferKind::Preapproved, (2025, 10, 1), (2025, 12, 31), 2),
            // Different kind, overlapping window: kept.
            offer("o4", "m", OfferKind::Loyalty, (2025, 1, 1), (2025, 6, 30), 3),
        ];
        let plan = plan_offer_consolidation(&group, &offers);
        assert_eq!(
            plan.repoint,
            vec![OfferId("o2".into()), OfferId("o3".into()), OfferId("o4".into())]
        );
        assert_eq!(plan.invalidate.len(), 1);
        assert_eq!(plan.invalidate[0].offer_id, OfferId("o1".into()));
        assert_eq!(plan.invalidate[0].reason_code, REASON_DUPLICATE_OF_RETAINED);
    }

    #[test]
    fn test_offer_consolidation_skips_non_active_offers() {
        let group = MergeGroup {
            survivor_id: RecordId("s".into()),
            merged_ids: vec![RecordId("m".into())],
        };
        let mut expired = offer("o1", "m", OfferKind::Loyalty, (2024, 1, 1), (2024, 6, 30), 1);
        expired.status = OfferStatus::Expired;
        let active = offer("o2", "s", OfferKind::Loyalty, (2024, 1, 1), (2024, 6, 30), 2);
        let plan = plan_offer_consolidation(&group, &[expired, active]);
        // The expired offer is re-pointed but never collapsed.
        assert_eq!(plan.repoint, vec![OfferId("o1".into())]);
        assert!(plan.invalidate.is_empty());
    }
}
