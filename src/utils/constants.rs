// src/utils/constants.rs

/// Maximum candidates retrieved per incoming record across the exact and
/// fuzzy passes combined. Exact-identifier hits are always kept; only the
/// fuzzy pass is truncated to stay under this cap.
pub const MAX_CANDIDATES_PER_RECORD: usize = 50;

/// Best-score threshold at or above which a pair merges without review.
pub const ACCEPT_SCORE_THRESHOLD: f64 = 0.85;

/// Lower bound of the manual-review band. Scores in
/// [REVIEW_SCORE_THRESHOLD, ACCEPT_SCORE_THRESHOLD) queue for review.
pub const REVIEW_SCORE_THRESHOLD: f64 = 0.5;

/// Cap on the fuzzy (name/DOB/address) contribution to a pair score.
/// Fuzzy-only evidence can never clear the accept threshold on its own.
pub const FUZZY_SCORE_CEILING: f64 = 0.6;

/// Exact-identifier indicator weights. The identifier part of a score is
/// the maximum matched weight, not a sum.
pub const WEIGHT_UNIQUE_CUSTOMER_ID: f64 = 0.95;
pub const WEIGHT_NATIONAL_ID: f64 = 0.90;
pub const WEIGHT_BIOMETRIC_ID: f64 = 0.90;
pub const WEIGHT_LOAN_APPLICATION_NO: f64 = 0.85;
pub const WEIGHT_MOBILE: f64 = 0.70;
pub const WEIGHT_EMAIL: f64 = 0.60;

/// Fuzzy sub-weights inside the capped fuzzy contribution.
pub const FUZZY_NAME_WEIGHT: f64 = 0.5;
pub const FUZZY_DOB_WEIGHT: f64 = 0.3;
pub const FUZZY_ADDRESS_WEIGHT: f64 = 0.2;

/// Name similarity below which the fuzzy pass drops a blocked candidate
/// outright instead of ranking it.
pub const FUZZY_MIN_NAME_SIMILARITY: f64 = 0.80;

/// Seconds to wait on a live-book lookup before degrading the record to
/// review.
pub const LIVEBOOK_TIMEOUT_SECS: u64 = 3;

/// Concurrent partition workers per run.
pub const PARTITION_WORKER_COUNT: usize = 4;
