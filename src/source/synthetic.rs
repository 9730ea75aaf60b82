//! In-process synthetic employee generator.
//!
//! Produces realistic-looking employee rows without touching the network,
//! for smoke runs and load testing. Values are random per run; only the
//! employee id sequence is stable.

use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use async_trait::async_trait;
use tracing::info;

use crate::error::ExtractionError;
use crate::record::{Batch, EmployeeRecord};
use crate::source::{DEPARTMENTS, DataSource, POSITIONS, RATINGS};

const FIRST_NAMES: [&str; 12] = [
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Margaret", "Dennis", "Radia", "Ken",
    "Frances", "Linus",
];

const LAST_NAMES: [&str; 12] = [
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Hamilton", "Ritchie",
    "Perlman", "Thompson", "Allen", "Torvalds",
];

const STREET_NAMES: [&str; 8] = [
    "Maple St", "Oak Ave", "Cedar Blvd", "Pine St", "Elm Dr", "Birch Ln", "Spruce Way",
    "Willow Ct",
];

const CITIES: [(&str, &str); 6] = [
    ("Seattle", "WA"),
    ("Portland", "OR"),
    ("Austin", "TX"),
    ("Denver", "CO"),
    ("Boston", "MA"),
    ("Atlanta", "GA"),
];

/// Synthetic data source.
pub struct SyntheticSource {
    name: String,
    id_prefix: String,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, id_prefix: impl Into<String>) -> Self {
        Self { name: name.into(), id_prefix: id_prefix.into() }
    }

    fn generate(&self, index: usize) -> EmployeeRecord {
        let mut rng = rand::thread_rng();
        let first = FIRST_NAMES.choose(&mut rng).unwrap();
        let last = LAST_NAMES.choose(&mut rng).unwrap();
        let (city, state) = CITIES.choose(&mut rng).unwrap();
        let hire_date = Utc::now().date_naive() - Duration::days(rng.gen_range(1..3650));

        // Managers come from earlier in the sequence, one per ten reports.
        let manager_id = (index > 0).then(|| {
            let manager = rng.gen_range(1..=(index / 10).max(1));
            format!("{}{:06}", self.id_prefix, manager)
        });

        EmployeeRecord {
            employee_id: Some(format!("{}{:06}", self.id_prefix, index + 1)),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            email: Some(format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), index + 1)),
            phone: Some(format!("206-555-{:04}", rng.gen_range(0..10000))),
            ssn: Some(format!(
                "{:03}-{:02}-{:04}",
                rng.gen_range(100..1000),
                rng.gen_range(10..100),
                rng.gen_range(1000..10000)
            )),
            department: Some(DEPARTMENTS.choose(&mut rng).unwrap().to_string()),
            position: Some(POSITIONS.choose(&mut rng).unwrap().to_string()),
            salary: Some(rng.gen_range(40_000..150_000) as f64),
            hire_date: Some(hire_date),
            street_address: Some(format!(
                "{} {}",
                rng.gen_range(100..10000),
                STREET_NAMES.choose(&mut rng).unwrap()
            )),
            city: Some(city.to_string()),
            state: Some(state.to_string()),
            zip_code: Some(format!("{:05}", rng.gen_range(10000..99999))),
            manager_id,
            performance_rating: Some(RATINGS.choose(&mut rng).unwrap().to_string()),
            data_source: Some(self.name.clone()),
        }
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, requested: usize) -> Result<Batch, ExtractionError> {
        info!(source = %self.name, requested, "generating synthetic employee records");

        let mut batch = Batch::with_all_columns(&self.name);
        for i in 0..requested {
            batch.push(self.generate(i));
        }

        info!(source = %self.name, records = batch.len(), "synthetic extraction complete");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Validator;

    #[tokio::test]
    async fn test_generates_requested_count() {
        let source = SyntheticSource::new("faker", "EMP");
        let batch = source.extract(25).await.unwrap();
        assert_eq!(batch.len(), 25);
        assert!(batch.records.iter().all(|r| r.data_source.as_deref() == Some("faker")));
    }

    #[tokio::test]
    async fn test_generated_batches_are_schema_valid() {
        let source = SyntheticSource::new("faker", "EMP");
        let batch = source.extract(50).await.unwrap();

        let report = Validator::new().validate(&batch);
        assert!(report.is_valid, "issues: {:?}", report.issues);
    }

    #[tokio::test]
    async fn test_id_prefix_is_applied() {
        let source = SyntheticSource::new("gen", "GEN");
        let batch = source.extract(2).await.unwrap();
        assert_eq!(batch.records[0].employee_id.as_deref(), Some("GEN000001"));
        assert_eq!(batch.records[1].employee_id.as_deref(), Some("GEN000002"));
    }
}
