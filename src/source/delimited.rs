//! Delimited (CSV) file extractor.
//!
//! Reads a headered CSV file and adapts each row through the open-map
//! boundary, so type problems in the file surface as validation issues
//! rather than extraction failures. The declared column set comes from the
//! file header, which lets the validator detect files that are missing
//! required columns entirely.

use async_trait::async_trait;
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ExtractionError, FileOpenSnafu, FileParseSnafu};
use crate::record::Batch;
use crate::source::DataSource;

/// Delimited file data source.
pub struct DelimitedFileSource {
    name: String,
    path: String,
}

impl DelimitedFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { name: name.into(), path: path.into() }
    }

    /// Write a sample employee CSV, creating parent directories as needed.
    /// Used to bootstrap demo environments and tests.
    pub fn write_sample(path: impl AsRef<Path>, records: usize) -> std::io::Result<()> {
        use rand::Rng;
        use rand::seq::SliceRandom;

        use crate::source::{DEPARTMENTS, POSITIONS, RATINGS};

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut rng = rand::thread_rng();
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
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
        ])?;

        for i in 0..records {
            let hire_date = chrono::Utc::now().date_naive()
                - chrono::Duration::days(rng.gen_range(1..3650));
            let manager_id = if i > 0 {
                format!("CSV{:06}", rng.gen_range(1..=(i / 10).max(1)))
            } else {
                String::new()
            };
            writer.write_record([
                format!("CSV{:06}", i + 1),
                "Sample".to_string(),
                format!("Employee{}", i + 1),
                format!("sample.employee{}@example.com", i + 1),
                format!("206-555-{:04}", rng.gen_range(0..10000)),
                format!(
                    "{:03}-{:02}-{:04}",
                    rng.gen_range(100..1000),
                    rng.gen_range(10..100),
                    rng.gen_range(1000..10000)
                ),
                DEPARTMENTS.choose(&mut rng).unwrap().to_string(),
                POSITIONS.choose(&mut rng).unwrap().to_string(),
                rng.gen_range(40_000..150_000).to_string(),
                hire_date.format("%Y-%m-%d").to_string(),
                format!("{} Maple St", rng.gen_range(100..10000)),
                "Seattle".to_string(),
                "WA".to_string(),
                format!("{:05}", rng.gen_range(10000..99999)),
                manager_id,
                RATINGS.choose(&mut rng).unwrap().to_string(),
                "csv".to_string(),
            ])?;
        }

        writer.flush()
    }
}

#[async_trait]
impl DataSource for DelimitedFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, requested: usize) -> Result<Batch, ExtractionError> {
        info!(source = %self.name, path = %self.path, requested, "extracting from delimited file");

        let file = std::fs::File::open(&self.path)
            .context(FileOpenSnafu { path: self.path.clone() })?;
        let mut reader = csv::Reader::from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .context(FileParseSnafu { path: self.path.clone() })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut batch = Batch::new(&self.name, headers.iter().cloned());
        // The connector tags provenance even when the file has no column for it.
        batch.columns.insert("data_source".to_string());

        for row in reader.records() {
            if batch.len() >= requested {
                break;
            }
            let row = row.context(FileParseSnafu { path: self.path.clone() })?;

            let mut map = Map::new();
            for (header, value) in headers.iter().zip(row.iter()) {
                map.insert(header.clone(), Value::String(value.to_string()));
            }
            // The file is the provenance authority only when it carries no tag.
            map.entry("data_source".to_string())
                .or_insert_with(|| Value::String(self.name.clone()));
            batch.push_row(&map);
        }

        if batch.len() < requested {
            warn!(
                source = %self.name,
                path = %self.path,
                available = batch.len(),
                requested,
                "file contains fewer records than requested"
            );
        }

        info!(source = %self.name, records = batch.len(), "delimited extraction complete");
        Ok(batch)
    }
}
