// src/livebook.rs
//
// Live-Book Reconciler: checks surviving and unique records against the
// authoritative book of active loan holdings (Customer 360) and invalidates
// offers the holdings rule out. Read-only against the book; lookups run
// under a timeout and degrade to review instead of blocking a run.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{DedupError, DedupResult};
use crate::models::core::{CustomerRecord, Offer, OfferKind, OfferStatus};
use crate::models::matching::OfferInvalidation;

pub const REASON_ACTIVE_LOAN_EXISTS: &str = "ACTIVE_LOAN_EXISTS";
pub const REASON_DELINQUENT_ON_BOOK: &str = "DELINQUENT_ON_BOOK";
pub const REASON_NO_BASE_LOAN: &str = "NO_BASE_LOAN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingStatus {
    Current,
    Delinquent,
    WrittenOff,
}

/// One active loan holding on the live book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveHolding {
    pub account_ref: String,
    pub product_code: String,
    pub status: HoldingStatus,
}

/// Read-only view of the live book. Implementations resolve a customer
/// record to its active holdings by whatever identifiers the book indexes.
#[async_trait]
pub trait LiveBook: Send + Sync {
    async fn active_holdings(&self, record: &CustomerRecord) -> anyhow::Result<Vec<ActiveHolding>>;
}

/// Holdings keyed by unique customer id or mobile; empty by default. Serves
/// as the no-connection default for the binary and the seedable book for
/// tests.
#[derive(Default)]
pub struct StaticLiveBook {
    holdings: Mutex<HashMap<String, Vec<ActiveHolding>>>,
}

impl StaticLiveBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_holdings(&self, key: &str, holdings: Vec<ActiveHolding>) {
        self.holdings.lock().await.insert(key.to_string(), holdings);
    }
}

#[async_trait]
impl LiveBook for StaticLiveBook {
    async fn active_holdings(&self, record: &CustomerRecord) -> anyhow::Result<Vec<ActiveHolding>> {
        let holdings = self.holdings.lock().await;
        let by_ucid = record
            .unique_customer_id
            .as_deref()
            .and_then(|k| holdings.get(k));
        let by_mobile = record.mobile.as_deref().and_then(|k| holdings.get(k));
        Ok(by_ucid.or(by_mobile).cloned().unwrap_or_default())
    }
}

/// Apply the ineligibility rules to one record's offers. Pure; only Active
/// offers are ever touched.
///
/// - a delinquent or written-off holding invalidates every pending offer;
/// - a current holding invalidates fresh-loan offers (Preapproved,
///   EAggregator) — Loyalty targets existing borrowers and stands;
/// - a Topup offer with no current holding to top up is invalid.
pub fn plan_holding_invalidations(
    offers: &[Offer],
    holdings: &[ActiveHolding],
) -> Vec<OfferInvalidation> {
    let delinquent = holdings
        .iter()
        .any(|h| matches!(h.status, HoldingStatus::Delinquent | HoldingStatus::WrittenOff));
    let has_current = holdings.iter().any(|h| h.status == HoldingStatus::Current);

    let mut invalidations = Vec::new();
    for offer in offers {
        if offer.status != OfferStatus::Active {
            continue;
        }
        let reason = if delinquent {
            Some(REASON_DELINQUENT_ON_BOOK)
        } else {
            match offer.offer_kind {
                OfferKind::Preapproved | OfferKind::EAggregator if has_current => {
                    Some(REASON_ACTIVE_LOAN_EXISTS)
                }
                OfferKind::Topup if !has_current => Some(REASON_NO_BASE_LOAN),
                _ => None,
            }
        };
        if let Some(reason_code) = reason {
            invalidations.push(OfferInvalidation {
                offer_id: offer.id.clone(),
                reason_code: reason_code.to_string(),
            });
        }
    }
    invalidations
}

/// Look up one record's holdings under the timeout and plan invalidations.
/// A slow or failing book yields `LiveBookUnavailable`; the caller degrades
/// the record to review and never retries within the run.
pub async fn reconcile_record(
    livebook: &dyn LiveBook,
    record: &CustomerRecord,
    offers: &[Offer],
    timeout: Duration,
) -> DedupResult<Vec<OfferInvalidation>> {
    let holdings = match tokio::time::timeout(timeout, livebook.active_holdings(record)).await {
        Ok(Ok(holdings)) => holdings,
        Ok(Err(source)) => {
            return Err(DedupError::LiveBookUnavailable {
                record_ref: record.id.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(DedupError::LiveBookUnavailable {
                record_ref: record.id.to_string(),
                source: anyhow!("lookup timed out after {:?}", timeout),
            })
        }
    };
    debug!(
        "Record {}: {} active holding(s) on the live book",
        record.id,
        holdings.len()
    );
    Ok(plan_holding_invalidations(offers, &holdings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{DedupStatus, OfferId, ProductOrigin, RecordId};
    use chrono::{NaiveDate, Utc};

    fn record(id: &str) -> CustomerRecord {
        CustomerRecord {
            id: RecordId(id.to_string()),
            product_origin: ProductOrigin::Loyalty,
            mobile: Some("9876543210".into()),
            national_id: None,
            biometric_id: None,
            email: None,
            unique_customer_id: Some("UC123456".into()),
            loan_application_no: None,
            full_name: None,
            date_of_birth: None,
            address: None,
            postal_code: None,
            dedup_status: DedupStatus::Unique,
            survivor_of: None,
            created_at: Utc::now(),
        }
    }

    fn offer(id: &str, kind: OfferKind) -> Offer {
        Offer {
            id: OfferId(id.to_string()),
            customer_id: RecordId("r".into()),
            offer_kind: kind,
            valid_from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            valid_to: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            status: OfferStatus::Active,
            status_reason: None,
            created_at: Utc::now(),
        }
    }

    fn holding(status: HoldingStatus) -> ActiveHolding {
        ActiveHolding {
            account_ref: "LN-001".into(),
            product_code: "PL01".into(),
            status,
        }
    }

    #[test]
    fn test_current_holding_blocks_fresh_loan_offers_only() {
        let offers = vec![
            offer("o-loyalty", OfferKind::Loyalty),
            offer("o-pre", OfferKind::Preapproved),
            offer("o-agg", OfferKind::EAggregator),
            offer("o-topup", OfferKind::Topup),
        ];
        let invalidations =
            plan_holding_invalidations(&offers, &[holding(HoldingStatus::Current)]);
        let invalid_ids: Vec<&str> = invalidations.iter().map(|i| i.offer_id.0.as_str()).collect();
        assert_eq!(invalid_ids, vec!["o-pre", "o-agg"]);
        assert!(invalidations
            .iter()
            .all(|i| i.reason_code == REASON_ACTIVE_LOAN_EXISTS));
    }

    #[test]
    fn test_delinquency_blocks_everything() {
        let offers = vec![
            offer("o-loyalty", OfferKind::Loyalty),
            offer("o-topup", OfferKind::Topup),
        ];
        let invalidations =
            plan_holding_invalidations(&offers, &[holding(HoldingStatus::Delinquent)]);
        assert_eq!(invalidations.len(), 2);
        assert!(invalidations
            .iter()
            .all(|i| i.reason_code == REASON_DELINQUENT_ON_BOOK));
    }

    #[test]
    fn test_topup_without_base_loan_is_invalid() {
        let offers = vec![offer("o-topup", OfferKind::Topup)];
        let invalidations = plan_holding_invalidations(&offers, &[]);
        assert_eq!(invalidations.len(), 1);
        assert_eq!(invalidations[0].reason_code, REASON_NO_BASE_LOAN);

        // With a current holding the topup stands.
        let invalidations =
            plan_holding_invalidations(&offers, &[holding(HoldingStatus::Current)]);
        assert!(invalidations.is_empty());
    }

    #[test]
    fn test_non_active_offers_untouched() {
        let mut journey = offer("o-journey", OfferKind::Preapproved);
        journey.status = OfferStatus::JourneyStarted;
        let invalidations =
            plan_holding_invalidations(&[journey], &[holding(HoldingStatus::Delinquent)]);
        assert!(invalidations.is_empty());
    }

    struct HangingLiveBook;

    #[async_trait]
    impl LiveBook for HangingLiveBook {
        async fn active_holdings(
            &self,
            _record: &CustomerRecord,
        ) -> anyhow::Result<Vec<ActiveHolding>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_slow_book_degrades_with_timeout() {
        let book = HangingLiveBook;
        let r = record("r");
        let offers = vec![offer("o", OfferKind::Loyalty)];
        let err = reconcile_record(&book, &r, &offers, Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            DedupError::LiveBookUnavailable { ref record_ref, .. } => assert_eq!(record_ref, "r"),
            other => panic!("expected LiveBookUnavailable, got {other:?}"),
        }
        assert!(!err.is_batch_fatal());
    }

    #[tokio::test]
    async fn test_static_book_resolves_by_ucid_then_mobile() {
        let book = StaticLiveBook::new();
        book.set_holdings("UC123456", vec![holding(HoldingStatus::Current)])
            .await;
        let holdings = book.active_holdings(&record("r")).await.unwrap();
        assert_eq!(holdings.len(), 1);

        let book = StaticLiveBook::new();
        book.set_holdings("9876543210", vec![holding(HoldingStatus::Delinquent)])
            .await;
        let holdings = book.active_holdings(&record("r")).await.unwrap();
        assert_eq!(holdings[0].status, HoldingStatus::Delinquent);
    }
}
