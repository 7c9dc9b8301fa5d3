// src/config.rs
//
// Tunable matching configuration: candidate cap, score thresholds,
// identifier weights, live-book timeout and worker count. Loaded once per
// process from the environment and validated once per run before any record
// is touched.

use std::env;

use log::{debug, info};

use crate::error::{DedupError, DedupResult};
use crate::models::core::IdentifierKind;
use crate::utils::constants::{
    ACCEPT_SCORE_THRESHOLD, FUZZY_ADDRESS_WEIGHT, FUZZY_DOB_WEIGHT, FUZZY_MIN_NAME_SIMILARITY,
    FUZZY_NAME_WEIGHT, FUZZY_SCORE_CEILING, LIVEBOOK_TIMEOUT_SECS, MAX_CANDIDATES_PER_RECORD,
    PARTITION_WORKER_COUNT, REVIEW_SCORE_THRESHOLD, WEIGHT_BIOMETRIC_ID, WEIGHT_EMAIL,
    WEIGHT_LOAN_APPLICATION_NO, WEIGHT_MOBILE, WEIGHT_NATIONAL_ID, WEIGHT_UNIQUE_CUSTOMER_ID,
};

/// Indicator weight per exact identifier kind.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierWeights {
    pub unique_customer_id: f64,
    pub national_id: f64,
    pub biometric_id: f64,
    pub loan_application_no: f64,
    pub mobile: f64,
    pub email: f64,
}

impl Default for IdentifierWeights {
    fn default() -> Self {
        Self {
            unique_customer_id: WEIGHT_UNIQUE_CUSTOMER_ID,
            national_id: WEIGHT_NATIONAL_ID,
            biometric_id: WEIGHT_BIOMETRIC_ID,
            loan_application_no: WEIGHT_LOAN_APPLICATION_NO,
            mobile: WEIGHT_MOBILE,
            email: WEIGHT_EMAIL,
        }
    }
}

impl IdentifierWeights {
    pub fn weight(&self, kind: IdentifierKind) -> f64 {
        match kind {
            IdentifierKind::UniqueCustomerId => self.unique_customer_id,
            IdentifierKind::NationalId => self.national_id,
            IdentifierKind::BiometricId => self.biometric_id,
            IdentifierKind::LoanApplicationNo => self.loan_application_no,
            IdentifierKind::Mobile => self.mobile,
            IdentifierKind::Email => self.email,
        }
    }

    fn all(&self) -> [(IdentifierKind, f64); 6] {
        [
            (IdentifierKind::UniqueCustomerId, self.unique_customer_id),
            (IdentifierKind::NationalId, self.national_id),
            (IdentifierKind::BiometricId, self.biometric_id),
            (IdentifierKind::LoanApplicationNo, self.loan_application_no),
            (IdentifierKind::Mobile, self.mobile),
            (IdentifierKind::Email, self.email),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Candidate cap per record (exact hits always kept).
    pub max_candidates: usize,
    /// Best score at or above this merges without review.
    pub accept_threshold: f64,
    /// Best score in [review_threshold, accept_threshold) queues for review.
    pub review_threshold: f64,
    /// Cap on the fuzzy contribution to any pair score.
    pub fuzzy_ceiling: f64,
    pub identifier_weights: IdentifierWeights,
    pub fuzzy_name_weight: f64,
    pub fuzzy_dob_weight: f64,
    pub fuzzy_address_weight: f64,
    /// Name similarity below which blocked candidates are dropped.
    pub min_name_similarity: f64,
    pub livebook_timeout_secs: u64,
    pub partition_workers: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_candidates: MAX_CANDIDATES_PER_RECORD,
            accept_threshold: ACCEPT_SCORE_THRESHOLD,
            review_threshold: REVIEW_SCORE_THRESHOLD,
            fuzzy_ceiling: FUZZY_SCORE_CEILING,
            identifier_weights: IdentifierWeights::default(),
            fuzzy_name_weight: FUZZY_NAME_WEIGHT,
            fuzzy_dob_weight: FUZZY_DOB_WEIGHT,
            fuzzy_address_weight: FUZZY_ADDRESS_WEIGHT,
            min_name_similarity: FUZZY_MIN_NAME_SIMILARITY,
            livebook_timeout_secs: LIVEBOOK_TIMEOUT_SECS,
            partition_workers: PARTITION_WORKER_COUNT,
        }
    }
}

impl MatchingConfig {
    /// Create configuration from environment variables, falling back to the
    /// compiled defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = MatchingConfig::default();

        let config = Self {
            max_candidates: env_parse("DEDUP_MAX_CANDIDATES", defaults.max_candidates),
            accept_threshold: env_parse("DEDUP_ACCEPT_THRESHOLD", defaults.accept_threshold),
            review_threshold: env_parse("DEDUP_REVIEW_THRESHOLD", defaults.review_threshold),
            fuzzy_ceiling: env_parse("DEDUP_FUZZY_CEILING", defaults.fuzzy_ceiling),
            identifier_weights: IdentifierWeights::default(),
            fuzzy_name_weight: defaults.fuzzy_name_weight,
            fuzzy_dob_weight: defaults.fuzzy_dob_weight,
            fuzzy_address_weight: defaults.fuzzy_address_weight,
            min_name_similarity: env_parse("DEDUP_MIN_NAME_SIMILARITY", defaults.min_name_similarity),
            livebook_timeout_secs: env_parse("DEDUP_LIVEBOOK_TIMEOUT_SECS", defaults.livebook_timeout_secs),
            partition_workers: env_parse("DEDUP_PARTITION_WORKERS", defaults.partition_workers),
        };

        debug!(
            "Matching config: K={}, accept={}, review={}, fuzzy_ceiling={}, workers={}",
            config.max_candidates,
            config.accept_threshold,
            config.review_threshold,
            config.fuzzy_ceiling,
            config.partition_workers
        );

        config
    }

    /// Validate the rule table once per run, before any record is touched.
    /// An inconsistent table is batch-fatal.
    pub fn validate(&self) -> DedupResult<()> {
        if self.max_candidates == 0 {
            return Err(DedupError::RuleTableLoad {
                reason: "max_candidates must be at least 1".into(),
            });
        }
        if self.partition_workers == 0 {
            return Err(DedupError::RuleTableLoad {
                reason: "partition_workers must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.accept_threshold)
            || !(0.0..=1.0).contains(&self.review_threshold)
            || !(0.0..=1.0).contains(&self.fuzzy_ceiling)
            || !(0.0..=1.0).contains(&self.min_name_similarity)
        {
            return Err(DedupError::RuleTableLoad {
                reason: "thresholds must lie in [0, 1]".into(),
            });
        }
        if self.review_threshold >= self.accept_threshold {
            return Err(DedupError::RuleTableLoad {
                reason: format!(
                    "review threshold {} must be below accept threshold {}",
                    self.review_threshold, self.accept_threshold
                ),
            });
        }
        if self.fuzzy_ceiling >= self.accept_threshold {
            return Err(DedupError::RuleTableLoad {
                reason: format!(
                    "fuzzy ceiling {} must stay below accept threshold {}, or fuzzy-only \
                     evidence could merge records",
                    self.fuzzy_ceiling, self.accept_threshold
                ),
            });
        }
        for (kind, weight) in self.identifier_weights.all() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(DedupError::RuleTableLoad {
                    reason: format!("weight for {} outside [0, 1]: {}", kind.as_str(), weight),
                });
            }
        }
        let fuzzy_sum = self.fuzzy_name_weight + self.fuzzy_dob_weight + self.fuzzy_address_weight;
        if (fuzzy_sum - 1.0).abs() > 1e-9 {
            return Err(DedupError::RuleTableLoad {
                reason: format!("fuzzy sub-weights must sum to 1.0, got {}", fuzzy_sum),
            });
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!(
            "Matching rules: K={}, accept>={}, review>={}, fuzzy ceiling {}",
            self.max_candidates, self.accept_threshold, self.review_threshold, self.fuzzy_ceiling
        );
        info!(
            "Live-book timeout: {}s, partition workers: {}",
            self.livebook_timeout_secs, self.partition_workers
        );
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults_are_valid() {
        let config = MatchingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_candidates, 50);
        assert_eq!(config.accept_threshold, 0.85);
        assert_eq!(config.review_threshold, 0.5);
    }

    #[test]
    fn test_from_env_overrides_and_falls_back() {
        env::set_var("DEDUP_MAX_CANDIDATES", "25");
        env::set_var("DEDUP_LIVEBOOK_TIMEOUT_SECS", "not-a-number");

        let config = MatchingConfig::from_env();
        assert_eq!(config.max_candidates, 25);
        assert_eq!(config.livebook_timeout_secs, LIVEBOOK_TIMEOUT_SECS);

        env::remove_var("DEDUP_MAX_CANDIDATES");
        env::remove_var("DEDUP_LIVEBOOK_TIMEOUT_SECS");
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = MatchingConfig {
            review_threshold: 0.9,
            accept_threshold: 0.85,
            ..MatchingConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DedupError::RuleTableLoad { .. }));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_fuzzy_ceiling_must_stay_below_accept() {
        let config = MatchingConfig {
            fuzzy_ceiling: 0.9,
            ..MatchingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_weight_rejected() {
        let config = MatchingConfig {
            identifier_weights: IdentifierWeights {
                mobile: 1.7,
                ..IdentifierWeights::default()
            },
            ..MatchingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fuzzy_subweights_must_sum_to_one() {
        let config = MatchingConfig {
            fuzzy_name_weight: 0.5,
            fuzzy_dob_weight: 0.5,
            fuzzy_address_weight: 0.2,
            ..MatchingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
