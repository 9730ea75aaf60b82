//! Data source interface and connectors.
//!
//! A source produces a tabular batch of raw employee records for a name
//! and a requested count. Sources may return fewer records than requested;
//! that is logged, not an error. Every record a source emits is tagged
//! with its `data_source`.

mod delimited;
mod rest;
mod synthetic;

pub use delimited::DelimitedFileSource;
pub use rest::RestApiSource;
pub use synthetic::SyntheticSource;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{SourceConfig, SourceKind};
use crate::error::ExtractionError;
use crate::record::Batch;

/// A named producer of raw employee batches.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name of this source; also tags its records and partitions the
    /// artifact namespace.
    fn name(&self) -> &str;

    /// Extract up to `requested` records.
    async fn extract(&self, requested: usize) -> Result<Batch, ExtractionError>;
}

/// A source paired with the record count to request per run.
#[derive(Clone)]
pub struct PlannedSource {
    pub source: Arc<dyn DataSource>,
    pub records: usize,
}

/// Build the planned source list from configuration.
pub fn build_sources(configs: &[SourceConfig]) -> Vec<PlannedSource> {
    configs
        .iter()
        .map(|config| {
            let source: Arc<dyn DataSource> = match &config.kind {
                SourceKind::Synthetic { id_prefix } => {
                    Arc::new(SyntheticSource::new(&config.name, id_prefix))
                }
                SourceKind::Rest { base_url } => {
                    Arc::new(RestApiSource::new(&config.name, base_url))
                }
                SourceKind::Delimited { path } => {
                    Arc::new(DelimitedFileSource::new(&config.name, path))
                }
            };
            PlannedSource { source, records: config.records }
        })
        .collect()
}

/// Departments shared by the connectors that fabricate organizational data.
pub(crate) const DEPARTMENTS: [&str; 6] =
    ["Engineering", "Marketing", "Sales", "HR", "Finance", "Operations"];

/// Positions shared by the connectors that fabricate organizational data.
pub(crate) const POSITIONS: [&str; 6] =
    ["Manager", "Senior", "Junior", "Lead", "Associate", "Director"];

/// Performance ratings shared by the connectors that fabricate review data.
pub(crate) const RATINGS: [&str; 4] =
    ["Excellent", "Good", "Satisfactory", "Needs Improvement"];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_build_sources_covers_every_kind() {
        let config: Config = serde_yaml::from_str(
            r#"
sources:
  - name: faker
    kind: synthetic
  - name: api
    kind: rest
    base_url: "https://jsonplaceholder.typicode.com"
  - name: csv
    kind: delimited
    path: data/sample_employees.csv
store:
  path: "/tmp/artifacts"
warehouse:
  path: "/tmp/warehouse"
"#,
        )
        .unwrap();

        let planned = build_sources(&config.sources);
        assert_eq!(planned.len(), 3);
        assert_eq!(planned[0].source.name(), "faker");
        assert_eq!(planned[1].source.name(), "api");
        assert_eq!(planned[2].source.name(), "csv");
        assert!(planned.iter().all(|p| p.records == 50));
    }
}
