//! Arrow conversions for employee batches.
//!
//! Raw artifacts carry only the columns the source declared; processed
//! artifacts always carry the full masked schema. `hire_date` is persisted
//! as a plain date (no time component) regardless of how the source
//! represented it, and `masked_at` as a UTC microsecond timestamp.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use deltalake::arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use snafu::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{ArrowSnafu, ArtifactError, ColumnDecodeSnafu};
use crate::record::{Batch, COLUMN_ORDER, EmployeeRecord, MaskedBatch, MaskedRecord};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch is a valid date")
}

fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(Duration::days(days as i64))
}

/// Arrow data type of a raw column.
fn raw_column_type(column: &str) -> DataType {
    match column {
        "salary" => DataType::Float64,
        "hire_date" => DataType::Date32,
        _ => DataType::Utf8,
    }
}

/// Schema for a raw artifact restricted to the columns the source declared,
/// in canonical order.
pub fn raw_schema(columns: &BTreeSet<String>) -> SchemaRef {
    let fields: Vec<Field> = COLUMN_ORDER
        .iter()
        .filter(|c| columns.contains(**c))
        .map(|c| Field::new(*c, raw_column_type(c), true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Fixed, versioned schema for processed artifacts and the analytical
/// table. `salary` is text because post-masking values are tokens.
pub fn processed_schema() -> SchemaRef {
    let mut fields: Vec<Field> = COLUMN_ORDER
        .iter()
        .map(|c| {
            let data_type = match *c {
                "hire_date" => DataType::Date32,
                _ => DataType::Utf8,
            };
            Field::new(*c, data_type, true)
        })
        .collect();
    fields.push(Field::new(
        "masked_at",
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        true,
    ));
    fields.push(Field::new("is_masked", DataType::Boolean, true));
    Arc::new(Schema::new(fields))
}

/// Convert raw records to an Arrow batch over the declared columns.
pub fn raw_to_arrow(
    rows: &[&EmployeeRecord],
    columns: &BTreeSet<String>,
) -> Result<RecordBatch, ArtifactError> {
    let schema = raw_schema(columns);
    let arrays: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| match field.name().as_str() {
            "salary" => {
                let values: Float64Array = rows.iter().map(|r| r.salary).collect();
                Arc::new(values) as ArrayRef
            }
            "hire_date" => {
                let values: Date32Array =
                    rows.iter().map(|r| r.hire_date.map(date_to_days)).collect();
                Arc::new(values) as ArrayRef
            }
            name => {
                let values: StringArray = rows.iter().map(|r| r.text(name)).collect();
                Arc::new(values) as ArrayRef
            }
        })
        .collect();

    RecordBatch::try_new(schema, arrays).context(ArrowSnafu)
}

/// Convert masked records to an Arrow batch over the full processed schema.
pub fn masked_to_arrow(rows: &[&MaskedRecord]) -> Result<RecordBatch, ArtifactError> {
    let schema = processed_schema();
    let arrays: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| match field.name().as_str() {
            "hire_date" => {
                let values: Date32Array =
                    rows.iter().map(|r| r.hire_date.map(date_to_days)).collect();
                Arc::new(values) as ArrayRef
            }
            "masked_at" => {
                let values: TimestampMicrosecondArray = rows
                    .iter()
                    .map(|r| Some(r.masked_at.timestamp_micros()))
                    .collect();
                Arc::new(values.with_timezone("UTC")) as ArrayRef
            }
            "is_masked" => {
                let values: BooleanArray = rows.iter().map(|r| Some(r.is_masked)).collect();
                Arc::new(values) as ArrayRef
            }
            name => {
                let values: StringArray = rows.iter().map(|r| r.text(name)).collect();
                Arc::new(values) as ArrayRef
            }
        })
        .collect();

    RecordBatch::try_new(schema, arrays).context(ArrowSnafu)
}

/// Rebuild a raw [`Batch`] from the Arrow chunks of a persisted artifact.
///
/// The declared column set is taken from the artifact's own schema, so a
/// batch that was persisted without a column comes back without it.
pub fn raw_from_arrow(
    chunks: &[RecordBatch],
    source: &str,
    artifact: &str,
) -> Result<Batch, ArtifactError> {
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for chunk in chunks {
        let schema = chunk.schema();
        for field in schema.fields() {
            columns.insert(field.name().clone());
        }
    }
    let mut batch = Batch::new(source, columns);

    for chunk in chunks {
        let mut rows: Vec<EmployeeRecord> = vec![EmployeeRecord::default(); chunk.num_rows()];

        let schema = chunk.schema();
        for (index, field) in schema.fields().iter().enumerate() {
            let column = chunk.column(index);
            match field.name().as_str() {
                "salary" => {
                    let values = column
                        .as_any()
                        .downcast_ref::<Float64Array>()
                        .context(ColumnDecodeSnafu {
                            artifact,
                            message: "salary is not a float column".to_string(),
                        })?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.salary = values.is_valid(i).then(|| values.value(i));
                    }
                }
                "hire_date" => {
                    let values = column
                        .as_any()
                        .downcast_ref::<Date32Array>()
                        .context(ColumnDecodeSnafu {
                            artifact,
                            message: "hire_date is not a date column".to_string(),
                        })?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.hire_date = values
                            .is_valid(i)
                            .then(|| days_to_date(values.value(i)))
                            .flatten();
                    }
                }
                name if crate::record::TEXT_COLUMNS.contains(&name) => {
                    let values = column
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .context(ColumnDecodeSnafu {
                            artifact,
                            message: format!("{name} is not a text column"),
                        })?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        let value = values.is_valid(i).then(|| values.value(i).to_string());
                        row.set_text(name, value);
                    }
                }
                name => {
                    return ColumnDecodeSnafu {
                        artifact,
                        message: format!("unknown column {name}"),
                    }
                    .fail();
                }
            }
        }

        batch.records.extend(rows);
    }

    Ok(batch)
}

/// Timestamp helper used when stamping provenance on masked rows.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> EmployeeRecord {
        EmployeeRecord {
            employee_id: Some("EMP000001".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            department: Some("Engineering".to_string()),
            position: Some("Senior".to_string()),
            salary: Some(120000.0),
            hire_date: NaiveDate::from_ymd_opt(2019, 3, 15),
            data_source: Some("test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_raw_schema_respects_declared_columns() {
        let columns: BTreeSet<String> =
            ["employee_id", "email", "salary"].iter().map(|c| c.to_string()).collect();
        let schema = raw_schema(&columns);

        assert_eq!(schema.fields().len(), 3);
        // Canonical order, not declaration order.
        assert_eq!(schema.field(0).name(), "employee_id");
        assert_eq!(schema.field(1).name(), "email");
        assert_eq!(schema.field(2).name(), "salary");
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_hire_date_is_persisted_as_plain_date() {
        let schema = processed_schema();
        let field = schema.field_with_name("hire_date").unwrap();
        assert_eq!(field.data_type(), &DataType::Date32);
    }

    #[test]
    fn test_raw_round_trip_preserves_values_and_columns() {
        let mut batch = Batch::with_all_columns("test");
        batch.push(sample_record());

        let rows: Vec<&EmployeeRecord> = batch.records.iter().collect();
        let arrow = raw_to_arrow(&rows, &batch.columns).unwrap();
        let decoded = raw_from_arrow(std::slice::from_ref(&arrow), "test", "raw/x.parquet").unwrap();

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.records[0], sample_record());
        assert_eq!(decoded.columns, batch.columns);
    }
}
