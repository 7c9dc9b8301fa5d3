// src/normalize.rs
//
// Record Normalizer: pure canonicalization of raw ingest rows. Every
// identifier comes out either canonical or absent; a present identifier
// that fails its structural rule makes the whole record malformed, which is
// a per-record error, not a batch one.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DedupError, DedupResult};
use crate::models::core::{NormalizedRecord, OfferKind, ProductOrigin, RawCustomerRecord};

static NATIONAL_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").unwrap()
});
static UNIQUE_CUSTOMER_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9]{6,20}$").unwrap()
});
static LOAN_APPLICATION_NO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9][A-Z0-9-]{4,22}[A-Z0-9]$").unwrap()
});
static POSTAL_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[1-9][0-9]{5}\b").unwrap()
});

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

const HONORIFIC_PREFIXES: [&str; 9] = [
    "mr", "mrs", "ms", "miss", "dr", "shri", "smt", "kum", "late",
];

/// Strip everything but digits, drop a leading country code (`91` on 12
/// digits) or trunk zero (11 digits), then require exactly 10 digits
/// starting 6-9.
pub fn normalize_mobile(raw: &str) -> Result<String, String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = if digits.len() == 12 && digits.starts_with("91") {
        digits[2..].to_string()
    } else if digits.len() == 11 && digits.starts_with('0') {
        digits[1..].to_string()
    } else {
        digits
    };
    if digits.len() != 10 {
        return Err(format!(
            "expected 10 digits after prefix strip, got {}",
            digits.len()
        ));
    }
    if !matches!(digits.as_bytes()[0], b'6'..=b'9') {
        return Err("mobile numbers start with 6-9".to_string());
    }
    Ok(digits)
}

/// PAN-style national id: five letters, four digits, one letter.
pub fn normalize_national_id(raw: &str) -> Result<String, String> {
    let canonical = raw.trim().to_uppercase();
    if NATIONAL_ID_RE.is_match(&canonical) {
        Ok(canonical)
    } else {
        Err(format!("'{}' does not match AAAAA9999A", canonical))
    }
}

/// Biometric id: twelve digits after stripping spaces and dashes, first
/// digit 2-9.
pub fn normalize_biometric_id(raw: &str) -> Result<String, String> {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("expected exactly 12 digits".to_string());
    }
    if !matches!(digits.as_bytes()[0], b'2'..=b'9') {
        return Err("first digit must be 2-9".to_string());
    }
    Ok(digits)
}

/// Lowercase, drop the `+tag` alias from the local part, require a single
/// `@` and a dotted domain.
pub fn normalize_email(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().to_lowercase();
    let parts: Vec<&str> = trimmed.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err("expected exactly one '@' with non-empty sides".to_string());
    }
    let (local, domain) = (parts[0], parts[1]);
    let local = match local.split('+').next() {
        Some(base) if !base.is_empty() => base,
        _ => return Err("local part empty after alias strip".to_string()),
    };
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(format!("domain '{}' is not dotted", domain));
    }
    Ok(format!("{}@{}", local, domain))
}

pub fn normalize_unique_customer_id(raw: &str) -> Result<String, String> {
    let canonical = raw.trim().to_uppercase();
    if UNIQUE_CUSTOMER_ID_RE.is_match(&canonical) {
        Ok(canonical)
    } else {
        Err("expected 6-20 alphanumeric characters".to_string())
    }
}

pub fn normalize_loan_application_no(raw: &str) -> Result<String, String> {
    let canonical = raw.trim().to_uppercase();
    if LOAN_APPLICATION_NO_RE.is_match(&canonical) {
        Ok(canonical)
    } else {
        Err("expected 6-24 alphanumeric/dash characters".to_string())
    }
}

/// Lowercase, punctuation to spaces, leading honorifics dropped, whitespace
/// collapsed. Names are fuzzy-only evidence, so an unusable name is absent
/// rather than malformed.
pub fn normalize_person_name(raw: &str) -> Option<String> {
    let mut normalized = raw.to_lowercase();
    let char_substitutions = [
        ("&", " and "),
        (".", " "),
        ("'", ""),
        ("-", " "),
        (",", " "),
        ("/", " "),
        ("(", " "),
        (")", " "),
    ];
    for (pattern, replacement) in &char_substitutions {
        normalized = normalized.replace(pattern, replacement);
    }
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
    while let Some(first) = tokens.first() {
        if HONORIFIC_PREFIXES.contains(first) && tokens.len() > 1 {
            tokens.remove(0);
        } else {
            break;
        }
    }
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed; the postal code
/// (six-digit token) is split out when one appears.
pub fn normalize_address(raw: &str) -> (Option<String>, Option<String>) {
    let mut normalized = raw.to_lowercase();
    for pattern in ["#", ",", ".", "-", "/", "(", ")"] {
        normalized = normalized.replace(pattern, " ");
    }
    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return (None, None);
    }
    let postal_code = POSTAL_CODE_RE
        .find(&collapsed)
        .map(|m| m.as_str().to_string());
    (Some(collapsed), postal_code)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(format!("'{}' matches none of the accepted date formats", trimmed))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    // A bare date stamps the record at midnight UTC.
    parse_date(trimmed).map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn malformed(record_ref: &str, field: &'static str, reason: String) -> DedupError {
    DedupError::MalformedRecord {
        record_ref: record_ref.to_string(),
        field,
        reason,
    }
}

/// Treat empty and whitespace-only inputs as absent; upstream extracts
/// routinely deliver "" for missing columns.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Canonicalize one raw row. `now` stamps rows that arrive without an
/// upstream event time, injected so batch runs are reproducible.
pub fn normalize_record(
    raw: &RawCustomerRecord,
    now: DateTime<Utc>,
) -> DedupResult<NormalizedRecord> {
    let record_ref = raw.source_ref.as_str();

    let product_origin = ProductOrigin::from_str(&raw.product_origin).ok_or_else(|| {
        malformed(
            record_ref,
            "product_origin",
            format!("unknown origin '{}'", raw.product_origin),
        )
    })?;
    let offer_kind = OfferKind::from_str(&raw.offer_type).ok_or_else(|| {
        malformed(
            record_ref,
            "offer_type",
            format!("unknown offer type '{}'", raw.offer_type),
        )
    })?;

    let mobile = present(&raw.mobile)
        .map(normalize_mobile)
        .transpose()
        .map_err(|reason| malformed(record_ref, "mobile", reason))?;
    let national_id = present(&raw.national_id)
        .map(normalize_national_id)
        .transpose()
        .map_err(|reason| malformed(record_ref, "national_id", reason))?;
    let biometric_id = present(&raw.biometric_id)
        .map(normalize_biometric_id)
        .transpose()
        .map_err(|reason| malformed(record_ref, "biometric_id", reason))?;
    let email = present(&raw.email)
        .map(normalize_email)
        .transpose()
        .map_err(|reason| malformed(record_ref, "email", reason))?;
    let unique_customer_id = present(&raw.unique_customer_id)
        .map(normalize_unique_customer_id)
        .transpose()
        .map_err(|reason| malformed(record_ref, "unique_customer_id", reason))?;
    let loan_application_no = present(&raw.loan_application_no)
        .map(normalize_loan_application_no)
        .transpose()
        .map_err(|reason| malformed(record_ref, "loan_application_no", reason))?;

    if mobile.is_none()
        && national_id.is_none()
        && biometric_id.is_none()
        && email.is_none()
        && unique_customer_id.is_none()
        && loan_application_no.is_none()
    {
        return Err(malformed(
            record_ref,
            "identifiers",
            "record carries no identifier at all".to_string(),
        ));
    }

    let full_name = present(&raw.full_name).and_then(normalize_person_name);
    let date_of_birth = present(&raw.date_of_birth)
        .map(parse_date)
        .transpose()
        .map_err(|reason| malformed(record_ref, "date_of_birth", reason))?;
    let (address, postal_code) = match present(&raw.address) {
        Some(addr) => normalize_address(addr),
        None => (None, None),
    };

    let offer_valid_from = parse_date(&raw.offer_valid_from)
        .map_err(|reason| malformed(record_ref, "offer_valid_from", reason))?;
    let offer_valid_to = parse_date(&raw.offer_valid_to)
        .map_err(|reason| malformed(record_ref, "offer_valid_to", reason))?;
    if offer_valid_to < offer_valid_from {
        return Err(malformed(
            record_ref,
            "offer_valid_to",
            format!("window ends {} before it starts {}", offer_valid_to, offer_valid_from),
        ));
    }

    let created_at = present(&raw.created_at)
        .map(parse_timestamp)
        .transpose()
        .map_err(|reason| malformed(record_ref, "created_at", reason))?
        .unwrap_or(now);

    Ok(NormalizedRecord {
        source_ref: raw.source_ref.clone(),
        product_origin,
        mobile,
        national_id,
        biometric_id,
        email,
        unique_customer_id,
        loan_application_no,
        full_name,
        date_of_birth,
        address,
        postal_code,
        offer_kind,
        offer_valid_from,
        offer_valid_to,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row() -> RawCustomerRecord {
        RawCustomerRecord {
            source_ref: "row-1".to_string(),
            product_origin: "loyalty".to_string(),
            mobile: Some("+91 98765 43210".to_string()),
            national_id: Some("abcde1234f".to_string()),
            biometric_id: None,
            email: Some(" Ravi.Kumar+offers@Example.COM ".to_string()),
            unique_customer_id: None,
            loan_application_no: None,
            full_name: Some("Mr. Ravi KUMAR".to_string()),
            date_of_birth: Some("14/06/1988".to_string()),
            address: Some("Flat 4-B, MG Road, Pune - 411001".to_string()),
            offer_type: "loyalty".to_string(),
            offer_valid_from: "2025-01-01".to_string(),
            offer_valid_to: "2025-06-30".to_string(),
            created_at: Some("2025-01-03T10:15:00Z".to_string()),
        }
    }

    #[test]
    fn test_mobile_prefix_stripping() {
        assert_eq!(normalize_mobile("+91-98765-43210").unwrap(), "9876543210");
        assert_eq!(normalize_mobile("09876543210").unwrap(), "9876543210");
        assert_eq!(normalize_mobile("9876543210").unwrap(), "9876543210");
        assert!(normalize_mobile("12345").is_err());
        assert!(normalize_mobile("1234567890").is_err()); // starts with 1
        assert!(normalize_mobile("919876543210123").is_err());
    }

    #[test]
    fn test_national_id_shape() {
        assert_eq!(normalize_national_id(" abcde1234f ").unwrap(), "ABCDE1234F");
        assert!(normalize_national_id("AB1234567Z").is_err());
        assert!(normalize_national_id("ABCDE12345").is_err());
    }

    #[test]
    fn test_biometric_id_shape() {
        assert_eq!(normalize_biometric_id("2345 6789 0123").unwrap(), "234567890123");
        assert_eq!(normalize_biometric_id("2345-6789-0123").unwrap(), "234567890123");
        assert!(normalize_biometric_id("1345 6789 0123").is_err()); // leading 1
        assert!(normalize_biometric_id("234567890").is_err());
    }

    #[test]
    fn test_email_alias_stripping() {
        assert_eq!(
            normalize_email(" Ravi.Kumar+offers@Example.COM ").unwrap(),
            "ravi.kumar@example.com"
        );
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b@c.com").is_err());
        assert!(normalize_email("user@nodot").is_err());
    }

    #[test]
    fn test_person_name_honorifics_and_punctuation() {
        assert_eq!(
            normalize_person_name("Mr. Ravi KUMAR").as_deref(),
            Some("ravi kumar")
        );
        assert_eq!(
            normalize_person_name("Dr Anita-Rao").as_deref(),
            Some("anita rao")
        );
        // A name that is only an honorific keeps its single token.
        assert_eq!(normalize_person_name("Mr").as_deref(), Some("mr"));
        assert_eq!(normalize_person_name("  .  "), None);
    }

    #[test]
    fn test_address_postal_code_extraction() {
        let (addr, postal) = normalize_address("flat 4-b, mg road, pune - 411001");
        assert_eq!(addr.as_deref(), Some("flat 4 b mg road pune 411001"));
        assert_eq!(postal.as_deref(), Some("411001"));

        let (_, no_postal) = normalize_address("12 park street");
        assert_eq!(no_postal, None);
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(1988, 6, 14).unwrap();
        assert_eq!(parse_date("1988-06-14").unwrap(), expected);
        assert_eq!(parse_date("14/06/1988").unwrap(), expected);
        assert_eq!(parse_date("14-06-1988").unwrap(), expected);
        assert!(parse_date("06/14/1988").is_err()); // month 14
    }

    #[test]
    fn test_normalize_record_happy_path() {
        let normalized = normalize_record(&raw_row(), Utc::now()).unwrap();
        assert_eq!(normalized.mobile.as_deref(), Some("9876543210"));
        assert_eq!(normalized.national_id.as_deref(), Some("ABCDE1234F"));
        assert_eq!(normalized.email.as_deref(), Some("ravi.kumar@example.com"));
        assert_eq!(normalized.full_name.as_deref(), Some("ravi kumar"));
        assert_eq!(normalized.postal_code.as_deref(), Some("411001"));
        assert_eq!(
            normalized.date_of_birth,
            Some(NaiveDate::from_ymd_opt(1988, 6, 14).unwrap())
        );
    }

    #[test]
    fn test_present_but_invalid_identifier_is_malformed() {
        let mut raw = raw_row();
        raw.national_id = Some("NOT-A-PAN".to_string());
        let err = normalize_record(&raw, Utc::now()).unwrap_err();
        match err {
            DedupError::MalformedRecord { field, record_ref, .. } => {
                assert_eq!(field, "national_id");
                assert_eq!(record_ref, "row-1");
            }
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_record_without_any_identifier_is_malformed() {
        let mut raw = raw_row();
        raw.mobile = None;
        raw.national_id = None;
        raw.email = Some("  ".to_string()); // whitespace counts as absent
        let err = normalize_record(&raw, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DedupError::MalformedRecord { field: "identifiers", .. }
        ));
        assert!(!err.is_batch_fatal());
    }

    #[test]
    fn test_inverted_offer_window_is_malformed() {
        let mut raw = raw_row();
        raw.offer_valid_from = "2025-06-30".to_string();
        raw.offer_valid_to = "2025-01-01".to_string();
        assert!(matches!(
            normalize_record(&raw, Utc::now()),
            Err(DedupError::MalformedRecord { field: "offer_valid_to", .. })
        ));
    }
}
