//! Employee record data model.
//!
//! Records are fixed structs with explicit optional fields so that field
//! coverage is checked at compile time. Open maps are only accepted at the
//! source boundary, where [`Batch::push_row`] adapts loosely-typed rows and
//! records a defect for every value it could not coerce.

pub mod arrow;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::trace;

/// Text-valued columns in canonical order.
pub const TEXT_COLUMNS: [&str; 15] = [
    "employee_id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "ssn",
    "department",
    "position",
    "street_address",
    "city",
    "state",
    "zip_code",
    "manager_id",
    "performance_rating",
    "data_source",
];

/// All columns of the fixed, versioned employee schema, in the order they
/// are persisted.
pub const COLUMN_ORDER: [&str; 17] = [
    "employee_id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "ssn",
    "department",
    "position",
    "salary",
    "hire_date",
    "street_address",
    "city",
    "state",
    "zip_code",
    "manager_id",
    "performance_rating",
    "data_source",
];

/// One employee entity as produced by a source.
///
/// Every field is optional: requiredness is enforced by the validator, not
/// by construction, so that incomplete rows can be carried to the point
/// where they are reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub employee_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub ssn: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub salary: Option<f64>,
    pub hire_date: Option<NaiveDate>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub manager_id: Option<String>,
    pub performance_rating: Option<String>,
    pub data_source: Option<String>,
}

impl EmployeeRecord {
    /// Borrow a text field by column name. Panics on a non-text column,
    /// which would be a programming error against [`TEXT_COLUMNS`].
    pub fn text(&self, column: &str) -> Option<&str> {
        let field = match column {
            "employee_id" => &self.employee_id,
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            "email" => &self.email,
            "phone" => &self.phone,
            "ssn" => &self.ssn,
            "department" => &self.department,
            "position" => &self.position,
            "street_address" => &self.street_address,
            "city" => &self.city,
            "state" => &self.state,
            "zip_code" => &self.zip_code,
            "manager_id" => &self.manager_id,
            "performance_rating" => &self.performance_rating,
            "data_source" => &self.data_source,
            other => panic!("not a text column: {other}"),
        };
        field.as_deref()
    }

    fn set_text(&mut self, column: &str, value: Option<String>) {
        let field = match column {
            "employee_id" => &mut self.employee_id,
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            "ssn" => &mut self.ssn,
            "department" => &mut self.department,
            "position" => &mut self.position,
            "street_address" => &mut self.street_address,
            "city" => &mut self.city,
            "state" => &mut self.state,
            "zip_code" => &mut self.zip_code,
            "manager_id" => &mut self.manager_id,
            "performance_rating" => &mut self.performance_rating,
            "data_source" => &mut self.data_source,
            other => panic!("not a text column: {other}"),
        };
        *field = value;
    }

    /// True when the identity fields required by the persisted-artifact
    /// contract are present and non-empty.
    pub fn has_identity(&self) -> bool {
        [&self.employee_id, &self.first_name, &self.last_name, &self.email]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
    }

    /// Adapt one open-map row into a typed record.
    ///
    /// Returns the record together with a defect message per field whose
    /// value was present but could not be coerced to the column type.
    /// Integer-shaped values for text columns (zip codes from delimited
    /// files, for instance) are coerced to their string form. Empty strings
    /// are treated as absent, matching how the extractors surface blank
    /// delimited fields.
    pub fn from_row(row: &serde_json::Map<String, Value>) -> (Self, Vec<(&'static str, String)>) {
        let mut record = EmployeeRecord::default();
        let mut defects = Vec::new();

        for column in TEXT_COLUMNS {
            match row.get(column) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        record.set_text(column, Some(s.clone()));
                    }
                }
                Some(Value::Number(n)) => {
                    trace!(column, "coercing numeric value to text");
                    record.set_text(column, Some(n.to_string()));
                }
                Some(other) => {
                    defects.push((column, format!("expected text, got {}", json_kind(other))));
                }
            }
        }

        match row.get("salary") {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => record.salary = n.as_f64(),
            Some(Value::String(s)) if s.trim().is_empty() => {}
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(v) => record.salary = Some(v),
                Err(_) => defects.push(("salary", format!("expected a number, got \"{s}\""))),
            },
            Some(other) => {
                defects.push(("salary", format!("expected a number, got {}", json_kind(other))));
            }
        }

        match row.get("hire_date") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.trim().is_empty() => {}
            Some(Value::String(s)) => match parse_date(s.trim()) {
                Some(d) => record.hire_date = Some(d),
                None => defects.push(("hire_date", format!("expected a date, got \"{s}\""))),
            },
            Some(other) => {
                defects.push(("hire_date", format!("expected a date, got {}", json_kind(other))));
            }
        }

        (record, defects)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse a date in the formats the extractors actually emit.
fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// A type-coercion problem recorded by the boundary adapter, surfaced later
/// by the validator as a type-mismatch violation.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDefect {
    /// Zero-based row index within the batch.
    pub row: usize,
    pub field: &'static str,
    pub message: String,
}

/// An ordered collection of same-schema records from one source.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Provenance tag: the name of the source that produced this batch.
    pub source: String,
    /// Columns the source actually produced, used for the missing-column
    /// check. Always a subset of [`COLUMN_ORDER`].
    pub columns: BTreeSet<String>,
    pub records: Vec<EmployeeRecord>,
    /// Type defects recorded while adapting open-map rows.
    pub defects: Vec<RowDefect>,
}

impl Batch {
    /// Create an empty batch declaring the given columns.
    pub fn new(source: impl Into<String>, columns: impl IntoIterator<Item = String>) -> Self {
        let known: BTreeSet<String> = COLUMN_ORDER.iter().map(|c| c.to_string()).collect();
        Self {
            source: source.into(),
            columns: columns.into_iter().filter(|c| known.contains(c)).collect(),
            records: Vec::new(),
            defects: Vec::new(),
        }
    }

    /// Create an empty batch declaring the full column set.
    pub fn with_all_columns(source: impl Into<String>) -> Self {
        Self::new(source, COLUMN_ORDER.iter().map(|c| c.to_string()))
    }

    /// Append a typed record.
    pub fn push(&mut self, record: EmployeeRecord) {
        self.records.push(record);
    }

    /// Adapt and append one open-map row, recording coercion defects
    /// against its position.
    pub fn push_row(&mut self, row: &serde_json::Map<String, Value>) {
        let index = self.records.len();
        let (record, defects) = EmployeeRecord::from_row(row);
        self.defects.extend(defects.into_iter().map(|(field, message)| RowDefect {
            row: index,
            field,
            message,
        }));
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The separate cleaning step: a copy with emails trimmed and
    /// lowercased. The validator never mutates values; callers that want
    /// normalized emails to pass validation run this first.
    pub fn normalized(&self) -> Batch {
        let mut out = self.clone();
        for record in &mut out.records {
            if let Some(email) = &record.email {
                record.email = Some(email.trim().to_lowercase());
            }
        }
        out
    }
}

/// One employee entity after de-identification.
///
/// Sensitive fields hold tokens rather than values; `salary` becomes a
/// text token. Provenance fields record when masking happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedRecord {
    pub employee_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub ssn: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub salary: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub manager_id: Option<String>,
    pub performance_rating: Option<String>,
    pub data_source: Option<String>,
    pub masked_at: DateTime<Utc>,
    pub is_masked: bool,
}

impl MaskedRecord {
    /// Borrow a text field by column name; `salary` is text post-masking.
    pub fn text(&self, column: &str) -> Option<&str> {
        if column == "salary" {
            return self.salary.as_deref();
        }
        let field = match column {
            "employee_id" => &self.employee_id,
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            "email" => &self.email,
            "phone" => &self.phone,
            "ssn" => &self.ssn,
            "department" => &self.department,
            "position" => &self.position,
            "street_address" => &self.street_address,
            "city" => &self.city,
            "state" => &self.state,
            "zip_code" => &self.zip_code,
            "manager_id" => &self.manager_id,
            "performance_rating" => &self.performance_rating,
            "data_source" => &self.data_source,
            other => panic!("not a text column: {other}"),
        };
        field.as_deref()
    }

    /// Identity contract for the processed artifact.
    pub fn has_identity(&self) -> bool {
        [&self.employee_id, &self.first_name, &self.last_name, &self.email]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// An ordered collection of de-identified records from one source.
#[derive(Debug, Clone, Default)]
pub struct MaskedBatch {
    pub source: String,
    pub records: Vec<MaskedRecord>,
}

impl MaskedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_from_row_coerces_and_parses() {
        let (record, defects) = EmployeeRecord::from_row(&row(json!({
            "employee_id": "EMP000001",
            "first_name": "Ada",
            "zip_code": 98101,
            "salary": "85000",
            "hire_date": "2020-06-01",
        })));

        assert!(defects.is_empty());
        assert_eq!(record.employee_id.as_deref(), Some("EMP000001"));
        assert_eq!(record.zip_code.as_deref(), Some("98101"));
        assert_eq!(record.salary, Some(85000.0));
        assert_eq!(
            record.hire_date,
            Some(NaiveDate::from_ymd_opt(2020, 6, 1).unwrap())
        );
    }

    #[test]
    fn test_from_row_records_type_defects() {
        let (record, defects) = EmployeeRecord::from_row(&row(json!({
            "employee_id": "EMP000001",
            "salary": "twelve grand",
            "hire_date": "someday",
            "first_name": true,
        })));

        assert_eq!(record.salary, None);
        assert_eq!(record.hire_date, None);
        let fields: Vec<&str> = defects.iter().map(|(f, _)| *f).collect();
        assert!(fields.contains(&"salary"));
        assert!(fields.contains(&"hire_date"));
        assert!(fields.contains(&"first_name"));
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let (record, defects) = EmployeeRecord::from_row(&row(json!({
            "email": "",
            "salary": "",
        })));
        assert!(defects.is_empty());
        assert_eq!(record.email, None);
        assert_eq!(record.salary, None);
    }

    #[test]
    fn test_push_row_tracks_defect_positions() {
        let mut batch = Batch::with_all_columns("test");
        batch.push_row(&row(json!({"employee_id": "EMP000001"})));
        batch.push_row(&row(json!({"employee_id": "EMP000002", "salary": "abc"})));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.defects.len(), 1);
        assert_eq!(batch.defects[0].row, 1);
        assert_eq!(batch.defects[0].field, "salary");
    }

    #[test]
    fn test_normalized_lowercases_email_without_touching_input() {
        let mut batch = Batch::with_all_columns("test");
        batch.push(EmployeeRecord {
            email: Some("  Ada.Lovelace@Example.COM ".to_string()),
            ..Default::default()
        });

        let cleaned = batch.normalized();
        assert_eq!(
            cleaned.records[0].email.as_deref(),
            Some("ada.lovelace@example.com")
        );
        assert_eq!(
            batch.records[0].email.as_deref(),
            Some("  Ada.Lovelace@Example.COM ")
        );
    }

    #[test]
    fn test_has_identity_requires_non_empty_fields() {
        let mut record = EmployeeRecord {
            employee_id: Some("EMP000001".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        assert!(record.has_identity());

        record.email = Some(String::new());
        assert!(!record.has_identity());
        record.email = None;
        assert!(!record.has_identity());
    }
}
