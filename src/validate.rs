//! Batch validation engine.
//!
//! Validation is driven by a static table of field specifications rather
//! than any runtime introspection, and never raises: the outcome is a
//! [`ValidationReport`] carrying every violation found. The validator also
//! keeps a best-effort log of everything it has seen so the orchestrator
//! can summarize a whole run.

use chrono::Utc;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{LazyLock, Mutex};
use tracing::{debug, warn};

use crate::record::{Batch, EmployeeRecord};

/// RFC-shaped email check, matching the shape the upstream HR systems emit.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

/// Constraint attached to a field beyond requiredness.
#[derive(Debug, Clone, Copy)]
enum Constraint {
    None,
    /// Character-count bounds, inclusive.
    Length { min: usize, max: usize },
    /// Must match [`EMAIL_PATTERN`].
    EmailShaped,
    /// Numeric value must be >= 0.
    NonNegative,
    /// Date must not be after the current day.
    NotFuture,
}

/// Value of one field of a record, viewed generically for checking.
enum FieldValue<'a> {
    Text(Option<&'a str>),
    Float(Option<f64>),
    Date(Option<chrono::NaiveDate>),
}

impl FieldValue<'_> {
    fn is_null(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.is_none(),
            FieldValue::Float(v) => v.is_none(),
            FieldValue::Date(v) => v.is_none(),
        }
    }
}

/// Declarative specification of one schema field.
#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    required: bool,
    constraint: Constraint,
}

/// The employee schema as an explicit, static field list. Order matters:
/// issues are reported in this order within each row.
static FIELD_SPECS: [FieldSpec; 17] = [
    FieldSpec { name: "employee_id", required: true, constraint: Constraint::Length { min: 6, max: 10 } },
    FieldSpec { name: "first_name", required: true, constraint: Constraint::Length { min: 2, max: 50 } },
    FieldSpec { name: "last_name", required: true, constraint: Constraint::Length { min: 1, max: 50 } },
    FieldSpec { name: "email", required: true, constraint: Constraint::EmailShaped },
    FieldSpec { name: "department", required: true, constraint: Constraint::None },
    FieldSpec { name: "position", required: true, constraint: Constraint::None },
    FieldSpec { name: "hire_date", required: true, constraint: Constraint::NotFuture },
    FieldSpec { name: "data_source", required: true, constraint: Constraint::None },
    FieldSpec { name: "phone", required: false, constraint: Constraint::None },
    FieldSpec { name: "ssn", required: false, constraint: Constraint::None },
    FieldSpec { name: "salary", required: false, constraint: Constraint::NonNegative },
    FieldSpec { name: "street_address", required: false, constraint: Constraint::None },
    FieldSpec { name: "city", required: false, constraint: Constraint::None },
    FieldSpec { name: "state", required: false, constraint: Constraint::None },
    FieldSpec { name: "zip_code", required: false, constraint: Constraint::None },
    FieldSpec { name: "manager_id", required: false, constraint: Constraint::None },
    FieldSpec { name: "performance_rating", required: false, constraint: Constraint::None },
];

fn field_value<'a>(record: &'a EmployeeRecord, name: &'static str) -> FieldValue<'a> {
    match name {
        "salary" => FieldValue::Float(record.salary),
        "hire_date" => FieldValue::Date(record.hire_date),
        _ => FieldValue::Text(record.text(name)),
    }
}

/// Outcome of validating one batch. Not an error: the orchestrator decides
/// what a failed validation means for the run.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Every violation found, in row order, each annotated with its 1-based
    /// row position where applicable.
    pub issues: Vec<String>,
}

/// Run-level view of everything the validator has logged.
#[derive(Debug, Clone, Default)]
pub struct ValidationSummary {
    pub total_errors: usize,
    pub errors_by_source: BTreeMap<String, usize>,
    /// Most frequent violation causes (row annotations stripped), most
    /// frequent first, capped at [`Validator::COMMON_ERROR_LIMIT`].
    pub common_errors: Vec<(String, usize)>,
}

#[derive(Default)]
struct ValidationLog {
    total_errors: usize,
    by_source: HashMap<String, usize>,
    cause_counts: HashMap<String, usize>,
}

/// One violation before formatting: an optional row position plus a cause.
struct Violation {
    row: Option<usize>,
    cause: String,
}

impl Violation {
    fn at(row: usize, cause: String) -> Self {
        Self { row: Some(row), cause }
    }

    fn batch_level(cause: String) -> Self {
        Self { row: None, cause }
    }

    fn format(&self) -> String {
        match self.row {
            Some(row) => format!("row {}: {}", row, self.cause),
            None => self.cause.clone(),
        }
    }
}

/// Schema and business-rule checker for employee batches.
pub struct Validator {
    log: Mutex<ValidationLog>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// How many distinct causes the summary reports.
    pub const COMMON_ERROR_LIMIT: usize = 10;

    pub fn new() -> Self {
        Self { log: Mutex::new(ValidationLog::default()) }
    }

    /// Validate a batch against the employee schema.
    ///
    /// All violations are collected; nothing fails fast except the two
    /// cheap short-circuits (empty batch, missing required columns). The
    /// report is also folded into the validator's run-level log.
    pub fn validate(&self, batch: &Batch) -> ValidationReport {
        debug!(source = %batch.source, rows = batch.len(), "validating batch");
        let violations = self.collect_violations(batch);
        self.record(batch, &violations);

        let issues: Vec<String> = violations.iter().map(Violation::format).collect();
        if issues.is_empty() {
            debug!(source = %batch.source, "batch is schema-valid");
        } else {
            warn!(
                source = %batch.source,
                issues = issues.len(),
                "batch failed validation"
            );
        }

        ValidationReport { is_valid: issues.is_empty(), issues }
    }

    fn collect_violations(&self, batch: &Batch) -> Vec<Violation> {
        if batch.is_empty() {
            return vec![Violation::batch_level("empty batch".to_string())];
        }

        let missing: Vec<&str> = FIELD_SPECS
            .iter()
            .filter(|spec| spec.required && !batch.columns.contains(spec.name))
            .map(|spec| spec.name)
            .collect();
        if !missing.is_empty() {
            return vec![Violation::batch_level(format!(
                "missing required columns: {}",
                missing.join(", ")
            ))];
        }

        let mut violations = Vec::new();
        let mut null_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let today = Utc::now().date_naive();

        for (index, record) in batch.records.iter().enumerate() {
            let row = index + 1;

            for defect in batch.defects.iter().filter(|d| d.row == index) {
                violations.push(Violation::at(
                    row,
                    format!("field '{}' has the wrong type: {}", defect.field, defect.message),
                ));
            }

            for spec in &FIELD_SPECS {
                let value = field_value(record, spec.name);
                if value.is_null() {
                    if spec.required {
                        *null_counts.entry(spec.name).or_default() += 1;
                        violations.push(Violation::at(
                            row,
                            format!("required field '{}' is null", spec.name),
                        ));
                    }
                    continue;
                }
                if let Some(cause) = check_constraint(spec, &value, today) {
                    violations.push(Violation::at(row, cause));
                }
            }
        }

        for (field, count) in null_counts {
            violations.push(Violation::batch_level(format!(
                "required field '{field}': {count} null values"
            )));
        }

        if let Some(cause) = duplicate_ids(batch) {
            violations.push(Violation::batch_level(cause));
        }

        violations
    }

    fn record(&self, batch: &Batch, violations: &[Violation]) {
        if violations.is_empty() {
            return;
        }
        // Best effort: a poisoned log never fails validation.
        let Ok(mut log) = self.log.lock() else {
            return;
        };
        log.total_errors += violations.len();
        *log.by_source.entry(batch.source.clone()).or_default() += violations.len();
        for violation in violations {
            *log.cause_counts.entry(violation.cause.clone()).or_default() += 1;
        }
    }

    /// Summarize everything logged so far: totals, per-source counts, and
    /// the most frequent causes.
    pub fn summary(&self) -> ValidationSummary {
        let Ok(log) = self.log.lock() else {
            return ValidationSummary::default();
        };

        let mut common: Vec<(String, usize)> = log
            .cause_counts
            .iter()
            .map(|(cause, count)| (cause.clone(), *count))
            .collect();
        common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common.truncate(Self::COMMON_ERROR_LIMIT);

        ValidationSummary {
            total_errors: log.total_errors,
            errors_by_source: log.by_source.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            common_errors: common,
        }
    }
}

fn check_constraint(
    spec: &FieldSpec,
    value: &FieldValue<'_>,
    today: chrono::NaiveDate,
) -> Option<String> {
    match (spec.constraint, value) {
        (Constraint::None, _) => None,
        (Constraint::Length { min, max }, FieldValue::Text(Some(text))) => {
            let len = text.chars().count();
            (len < min || len > max).then(|| {
                format!(
                    "field '{}' must be between {} and {} characters, got {}",
                    spec.name, min, max, len
                )
            })
        }
        (Constraint::EmailShaped, FieldValue::Text(Some(text))) => (!EMAIL_PATTERN.is_match(text))
            .then(|| format!("field '{}' has invalid format: '{}'", spec.name, text)),
        (Constraint::NonNegative, FieldValue::Float(Some(v))) => {
            (*v < 0.0).then(|| format!("field '{}' must be non-negative, got {}", spec.name, v))
        }
        (Constraint::NotFuture, FieldValue::Date(Some(date))) => (*date > today)
            .then(|| format!("field '{}' is in the future: {}", spec.name, date)),
        // A constraint paired with the wrong value shape would be a bug in
        // the spec table itself.
        _ => None,
    }
}

/// Aggregate duplicate check over the whole batch: reports how many rows
/// repeat an earlier `employee_id`, not which ones.
fn duplicate_ids(batch: &Batch) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in &batch.records {
        if let Some(id) = record.employee_id.as_deref() {
            *counts.entry(id).or_default() += 1;
        }
    }
    let duplicates: usize = counts.values().filter(|c| **c > 1).map(|c| *c - 1).sum();
    (duplicates > 0).then(|| format!("duplicate employee_id values: {duplicates}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use crate::record::EmployeeRecord;

    fn valid_record(i: usize) -> EmployeeRecord {
        EmployeeRecord {
            employee_id: Some(format!("EMP{:06}", i + 1)),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some(format!("ada.lovelace{i}@example.com")),
            department: Some("Engineering".to_string()),
            position: Some("Senior".to_string()),
            salary: Some(120000.0),
            hire_date: NaiveDate::from_ymd_opt(2019, 3, 15),
            data_source: Some("test".to_string()),
            ..Default::default()
        }
    }

    fn valid_batch(rows: usize) -> Batch {
        let mut batch = Batch::with_all_columns("test");
        for i in 0..rows {
            batch.push(valid_record(i));
        }
        batch
    }

    #[test]
    fn test_valid_batch_has_no_issues() {
        let validator = Validator::new();
        let report = validator.validate(&valid_batch(5));
        assert!(report.is_valid);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_empty_batch_short_circuits() {
        let validator = Validator::new();
        let report = validator.validate(&Batch::with_all_columns("test"));
        assert!(!report.is_valid);
        assert_eq!(report.issues, vec!["empty batch".to_string()]);
    }

    #[test]
    fn test_missing_required_column_short_circuits() {
        let validator = Validator::new();
        let mut batch = valid_batch(3);
        batch.columns.remove("email");
        batch.columns.remove("department");
        // Invalid rows must not be reported: per-record checks are skipped.
        batch.records[0].first_name = Some("A".to_string());

        let report = validator.validate(&batch);
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("missing required columns"));
        assert!(report.issues[0].contains("email"));
        assert!(report.issues[0].contains("department"));
    }

    #[test]
    fn test_null_required_field_cites_field_and_count() {
        let validator = Validator::new();
        let mut batch = valid_batch(3);
        batch.records[1].first_name = None;

        let report = validator.validate(&batch);
        assert!(!report.is_valid);
        assert!(report.issues.contains(&"row 2: required field 'first_name' is null".to_string()));
        assert!(report.issues.contains(&"required field 'first_name': 1 null values".to_string()));
    }

    #[test]
    fn test_duplicate_ids_reported_as_count() {
        let validator = Validator::new();
        let mut batch = valid_batch(4);
        batch.records[2].employee_id = Some("EMP000001".to_string());
        batch.records[3].employee_id = Some("EMP000001".to_string());

        let report = validator.validate(&batch);
        assert!(!report.is_valid);
        assert_eq!(report.issues, vec!["duplicate employee_id values: 2".to_string()]);
    }

    #[test]
    fn test_all_violations_are_collected_with_row_positions() {
        let validator = Validator::new();
        let mut batch = valid_batch(3);
        batch.records[0].email = Some("not-an-email".to_string());
        batch.records[2].employee_id = Some("SHORT".to_string()); // 5 chars
        batch.records[2].salary = Some(-1.0);

        let report = validator.validate(&batch);
        assert!(!report.is_valid);
        assert!(report.issues.iter().any(|i| i.starts_with("row 1:") && i.contains("email")));
        assert!(
            report
                .issues
                .iter()
                .any(|i| i.starts_with("row 3:") && i.contains("between 6 and 10 characters"))
        );
        assert!(report.issues.iter().any(|i| i.starts_with("row 3:") && i.contains("non-negative")));
    }

    #[test]
    fn test_future_hire_date_is_rejected() {
        let validator = Validator::new();
        let mut batch = valid_batch(1);
        batch.records[0].hire_date = Some(Utc::now().date_naive() + Duration::days(30));

        let report = validator.validate(&batch);
        assert!(!report.is_valid);
        assert!(report.issues[0].contains("in the future"));
    }

    #[test]
    fn test_validator_reports_on_received_value() {
        // Normalization is a separate cleaning step; the validator judges
        // the value as-is.
        let validator = Validator::new();
        let mut batch = valid_batch(1);
        batch.records[0].email = Some(" Padded@Example.com ".to_string());
        assert!(!validator.validate(&batch).is_valid);

        let cleaned = batch.normalized();
        assert!(validator.validate(&cleaned).is_valid);
    }

    #[test]
    fn test_type_defects_surface_as_issues() {
        let validator = Validator::new();
        let mut batch = valid_batch(2);
        batch.defects.push(crate::record::RowDefect {
            row: 1,
            field: "salary",
            message: "expected a number, got \"12k\"".to_string(),
        });

        let report = validator.validate(&batch);
        assert!(!report.is_valid);
        assert!(
            report
                .issues
                .iter()
                .any(|i| i.starts_with("row 2:") && i.contains("wrong type"))
        );
    }

    #[test]
    fn test_summary_groups_by_source_and_cause() {
        let validator = Validator::new();

        let mut a = valid_batch(2);
        a.source = "alpha".to_string();
        a.records[0].first_name = None;
        a.records[1].first_name = None;
        validator.validate(&a);

        let mut b = valid_batch(1);
        b.source = "beta".to_string();
        b.records[0].email = Some("bad".to_string());
        validator.validate(&b);

        let summary = validator.summary();
        // Two per-row nulls + one aggregate for alpha, one bad email for beta.
        assert_eq!(summary.total_errors, 4);
        assert_eq!(summary.errors_by_source.get("alpha"), Some(&3));
        assert_eq!(summary.errors_by_source.get("beta"), Some(&1));
        assert_eq!(summary.common_errors[0].0, "required field 'first_name' is null");
        assert_eq!(summary.common_errors[0].1, 2);
    }
}
