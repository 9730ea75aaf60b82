//! Deterministic de-identification of sensitive fields.
//!
//! Tokenization is a salted SHA-256 digest truncated to 8 uppercase hex
//! characters behind a fixed marker. The same salt, field, and value always
//! produce the same token, so masked values stay join-stable across runs
//! while remaining one-way. Truncation to 32 bits is an accepted collision
//! tradeoff at this table's scale.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use crate::record::{Batch, MaskedBatch, MaskedRecord};
use crate::record::arrow::truncate_to_micros;

/// Marker prefixed to every token.
pub const TOKEN_MARKER: &str = "TOKEN_";

/// Hex characters kept from the digest.
pub const TOKEN_HEX_LEN: usize = 8;

/// Masking engine: a pure function over a copy of the batch.
pub struct Masker {
    salt: String,
}

impl Masker {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Tokenize a value in the context of a field name.
    ///
    /// Deterministic and one-way; empty values pass through unchanged.
    pub fn tokenize(&self, field: &str, value: &str) -> String {
        if value.is_empty() {
            return value.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(format!("{}_{}_{}", self.salt, field, value).as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}{}", TOKEN_MARKER, digest[..TOKEN_HEX_LEN].to_uppercase())
    }

    fn tokenize_opt(&self, field: &str, value: &Option<String>) -> Option<String> {
        value.as_ref().map(|v| self.tokenize(field, v))
    }

    /// Mask the local part of an email, preserving the domain verbatim.
    /// Values without an `@` pass through unchanged.
    fn mask_email(&self, email: &str) -> String {
        match email.split_once('@') {
            Some((local, domain)) => format!("{}@{}", self.tokenize("email", local), domain),
            None => email.to_string(),
        }
    }

    /// Mask a phone number, keeping only the last 4 digits in clear.
    ///
    /// With at least 10 digits the display value is a fixed pattern; the
    /// tokenized prefix is still computed for the audit trail. Shorter
    /// values are tokenized wholesale.
    fn mask_phone(&self, phone: &str) -> String {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 10 {
            let split = digits.len() - 4;
            let prefix_token = self.tokenize("phone", &digits[..split]);
            trace!(token = %prefix_token, "phone prefix tokenized");
            format!("***-***-{}", &digits[split..])
        } else {
            self.tokenize("phone", phone)
        }
    }

    /// De-identify a batch.
    ///
    /// Returns a new batch; the input is never mutated. Sensitive fields
    /// that are absent on a row are skipped silently. Every row is stamped
    /// with `masked_at` and `is_masked`.
    pub fn mask(&self, batch: &Batch) -> MaskedBatch {
        if batch.is_empty() {
            warn!(source = %batch.source, "empty batch provided for masking");
        }

        let masked_at = truncate_to_micros(Utc::now());
        let records = batch
            .records
            .iter()
            .map(|r| MaskedRecord {
                employee_id: r.employee_id.clone(),
                first_name: r.first_name.clone(),
                last_name: r.last_name.clone(),
                email: r.email.as_ref().map(|e| self.mask_email(e)),
                phone: r.phone.as_ref().map(|p| self.mask_phone(p)),
                ssn: self.tokenize_opt("ssn", &r.ssn),
                department: r.department.clone(),
                position: r.position.clone(),
                salary: r.salary.map(|s| self.tokenize("salary", &format!("{s}"))),
                hire_date: r.hire_date,
                street_address: self.tokenize_opt("address", &r.street_address),
                city: r.city.clone(),
                state: r.state.clone(),
                zip_code: r.zip_code.clone(),
                manager_id: r.manager_id.clone(),
                performance_rating: r.performance_rating.clone(),
                data_source: r.data_source.clone(),
                masked_at,
                is_masked: true,
            })
            .collect();

        debug!(source = %batch.source, rows = batch.len(), "batch masked");
        MaskedBatch { source: batch.source.clone(), records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EmployeeRecord;
    use regex::Regex;

    fn masker() -> Masker {
        Masker::new("test_salt")
    }

    fn batch_of(record: EmployeeRecord) -> Batch {
        let mut batch = Batch::with_all_columns("test");
        batch.push(record);
        batch
    }

    #[test]
    fn test_tokens_are_deterministic_across_independent_calls() {
        let a = masker().tokenize("ssn", "123-45-6789");
        let b = masker().tokenize("ssn", "123-45-6789");
        assert_eq!(a, b);
    }

    #[test]
    fn test_tokens_depend_on_salt_and_field() {
        let m = masker();
        assert_ne!(m.tokenize("ssn", "x"), m.tokenize("phone", "x"));
        assert_ne!(m.tokenize("ssn", "x"), Masker::new("other_salt").tokenize("ssn", "x"));
    }

    #[test]
    fn test_token_format() {
        let token = masker().tokenize("ssn", "123-45-6789");
        let pattern = Regex::new(r"^TOKEN_[0-9A-F]{8}$").unwrap();
        assert!(pattern.is_match(&token), "unexpected token: {token}");
    }

    #[test]
    fn test_retokenizing_a_token_changes_it() {
        let m = masker();
        let once = m.tokenize("ssn", "123-45-6789");
        let twice = m.tokenize("ssn", &once);
        assert_ne!(once, twice);
    }

    #[test]
    fn test_email_keeps_domain() {
        let m = masker();
        let record = EmployeeRecord {
            email: Some("ada.lovelace@example.com".to_string()),
            ..Default::default()
        };
        let masked = m.mask(&batch_of(record));
        let email = masked.records[0].email.as_deref().unwrap();

        let pattern = Regex::new(r"^TOKEN_[0-9A-F]{8}@example\.com$").unwrap();
        assert!(pattern.is_match(email), "unexpected masked email: {email}");
        assert_eq!(email, &format!("{}@example.com", m.tokenize("email", "ada.lovelace")));
    }

    #[test]
    fn test_email_without_at_passes_through() {
        let record = EmployeeRecord {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        let masked = masker().mask(&batch_of(record));
        assert_eq!(masked.records[0].email.as_deref(), Some("not-an-email"));
    }

    #[test]
    fn test_phone_exposes_only_last_four_digits() {
        let record = EmployeeRecord {
            phone: Some("(206) 555-0142".to_string()),
            ..Default::default()
        };
        let masked = masker().mask(&batch_of(record));
        assert_eq!(masked.records[0].phone.as_deref(), Some("***-***-0142"));
    }

    #[test]
    fn test_short_phone_is_tokenized_wholesale() {
        let m = masker();
        let record = EmployeeRecord {
            phone: Some("555-0142".to_string()),
            ..Default::default()
        };
        let masked = m.mask(&batch_of(record));
        assert_eq!(
            masked.records[0].phone.as_deref(),
            Some(m.tokenize("phone", "555-0142").as_str())
        );
    }

    #[test]
    fn test_salary_becomes_a_token_of_its_string_form() {
        let m = masker();
        let record = EmployeeRecord {
            salary: Some(85000.0),
            ..Default::default()
        };
        let masked = m.mask(&batch_of(record));
        assert_eq!(
            masked.records[0].salary.as_deref(),
            Some(m.tokenize("salary", "85000").as_str())
        );
    }

    #[test]
    fn test_absent_fields_are_skipped() {
        let masked = masker().mask(&batch_of(EmployeeRecord::default()));
        let record = &masked.records[0];
        assert_eq!(record.ssn, None);
        assert_eq!(record.email, None);
        assert_eq!(record.phone, None);
        assert_eq!(record.salary, None);
        assert!(record.is_masked);
    }

    #[test]
    fn test_mask_never_mutates_input() {
        let record = EmployeeRecord {
            ssn: Some("123-45-6789".to_string()),
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        let batch = batch_of(record.clone());
        let _ = masker().mask(&batch);
        assert_eq!(batch.records[0], record);
    }

    #[test]
    fn test_independent_masks_of_same_batch_agree_on_tokens() {
        let record = EmployeeRecord {
            ssn: Some("123-45-6789".to_string()),
            email: Some("ada@example.com".to_string()),
            phone: Some("206-555-0142".to_string()),
            salary: Some(90000.0),
            street_address: Some("100 Main St".to_string()),
            ..Default::default()
        };
        let batch = batch_of(record);
        let a = masker().mask(&batch);
        let b = masker().mask(&batch);

        assert_eq!(a.records[0].ssn, b.records[0].ssn);
        assert_eq!(a.records[0].email, b.records[0].email);
        assert_eq!(a.records[0].phone, b.records[0].phone);
        assert_eq!(a.records[0].salary, b.records[0].salary);
        assert_eq!(a.records[0].street_address, b.records[0].street_address);
    }

    #[test]
    fn test_provenance_is_stamped_on_every_row() {
        let mut batch = Batch::with_all_columns("test");
        for _ in 0..3 {
            batch.push(EmployeeRecord::default());
        }
        let masked = masker().mask(&batch);
        assert_eq!(masked.len(), 3);
        assert!(masked.records.iter().all(|r| r.is_masked));
        let stamp = masked.records[0].masked_at;
        assert!(masked.records.iter().all(|r| r.masked_at == stamp));
    }
}
