//! End-to-end pipeline tests against local filesystem storage and a local
//! Delta table.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use granary::artifact::{ArtifactStore, Stage};
use granary::config::ParquetCompression;
use granary::error::ExtractionError;
use granary::mask::Masker;
use granary::pipeline::{Orchestrator, RunStatus, SourceState};
use granary::record::{Batch, EmployeeRecord};
use granary::source::{DataSource, PlannedSource};
use granary::storage::StorageProvider;
use granary::validate::Validator;
use granary::warehouse::DeltaWarehouse;

/// A source that serves a fixed set of records.
struct FixtureSource {
    name: String,
    records: Vec<EmployeeRecord>,
}

#[async_trait]
impl DataSource for FixtureSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, requested: usize) -> Result<Batch, ExtractionError> {
        let mut batch = Batch::with_all_columns(&self.name);
        for record in self.records.iter().take(requested) {
            batch.push(record.clone());
        }
        Ok(batch)
    }
}

fn valid_record(source: &str, i: usize) -> EmployeeRecord {
    EmployeeRecord {
        employee_id: Some(format!("EMP{:06}", i + 1)),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        email: Some(format!("ada.{i}@example.com")),
        phone: Some("206-555-0142".to_string()),
        ssn: Some("123-45-6789".to_string()),
        department: Some("Engineering".to_string()),
        position: Some("Senior".to_string()),
        salary: Some(100_000.0),
        hire_date: NaiveDate::from_ymd_opt(2020, 1, 6),
        street_address: Some("100 Maple St".to_string()),
        city: Some("Seattle".to_string()),
        state: Some("WA".to_string()),
        zip_code: Some("98101".to_string()),
        manager_id: None,
        performance_rating: Some("Excellent".to_string()),
        data_source: Some(source.to_string()),
    }
}

fn fixture(name: &str, rows: usize) -> PlannedSource {
    let records = (0..rows).map(|i| valid_record(name, i)).collect();
    PlannedSource {
        source: Arc::new(FixtureSource { name: name.to_string(), records }),
        records: rows,
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store_provider: Arc<StorageProvider>,
    orchestrator: Orchestrator,
}

async fn harness(planned: Vec<PlannedSource>) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let store_path = dir.path().join("artifacts");
    let warehouse_path = dir.path().join("warehouse");

    let store_provider = Arc::new(
        StorageProvider::for_url(store_path.to_str().unwrap())
            .await
            .unwrap(),
    );
    let warehouse_provider = Arc::new(
        StorageProvider::for_url(warehouse_path.to_str().unwrap())
            .await
            .unwrap(),
    );

    let store = ArtifactStore::new(store_provider.clone(), ParquetCompression::Snappy);
    let warehouse = DeltaWarehouse::new(warehouse_provider, store_provider.clone(), "employees");

    let orchestrator = Orchestrator::new(
        planned,
        store,
        warehouse,
        Validator::new(),
        Masker::new("test_salt"),
        4,
    );

    Harness { _dir: dir, store_provider, orchestrator }
}

fn artifact_store(harness: &Harness) -> ArtifactStore {
    ArtifactStore::new(harness.store_provider.clone(), ParquetCompression::Snappy)
}

#[tokio::test]
async fn test_full_run_with_three_valid_sources() {
    let mut h = harness(vec![
        fixture("alpha", 50),
        fixture("beta", 50),
        fixture("gamma", 50),
    ])
    .await;

    let summary = h.orchestrator.run().await.unwrap();

    assert_eq!(summary.run.status, RunStatus::Success);
    assert_eq!(summary.run.sources_processed, 3);
    assert_eq!(summary.run.total_raw_records, 150);
    assert_eq!(summary.run.total_valid_records, 150);
    assert_eq!(summary.run.total_errors, 0);
    // 3 raw + 3 processed.
    assert_eq!(summary.run.artifacts_written.len(), 6);
    assert!(summary.run.duration_secs().is_some());
    assert!(
        summary
            .run
            .outcomes
            .iter()
            .all(|o| o.state == SourceState::Loaded && o.load_job.is_some())
    );

    // The warehouse snapshot reflects every loaded row.
    let table = summary.warehouse.expect("warehouse metadata should be available");
    assert_eq!(table.file_count, 3);
    assert_eq!(table.row_count, Some(150));

    // The frozen run stays readable on the orchestrator.
    assert_eq!(h.orchestrator.last_run().unwrap().status, RunStatus::Success);
}

#[tokio::test]
async fn test_invalid_source_is_skipped_and_others_still_load() {
    let mut beta_records: Vec<EmployeeRecord> =
        (0..50).map(|i| valid_record("beta", i)).collect();
    beta_records[7].email = Some("not-an-email".to_string());

    let planned = vec![
        fixture("alpha", 50),
        PlannedSource {
            source: Arc::new(FixtureSource { name: "beta".to_string(), records: beta_records }),
            records: 50,
        },
        fixture("gamma", 50),
    ];
    let mut h = harness(planned).await;

    let summary = h.orchestrator.run().await.unwrap();

    // Skipped sources are noted in the summary; the run itself succeeds.
    assert_eq!(summary.run.status, RunStatus::Success);
    assert_eq!(summary.run.sources_processed, 3);
    assert_eq!(summary.run.total_raw_records, 150);
    assert_eq!(summary.run.total_valid_records, 100);
    assert!(summary.run.total_errors > 0);
    // 3 raw + 2 processed.
    assert_eq!(summary.run.artifacts_written.len(), 5);

    let beta = summary.run.outcomes.iter().find(|o| o.source == "beta").unwrap();
    assert_eq!(beta.state, SourceState::SkippedInvalid);
    assert_eq!(beta.valid_records, 0);
    assert!(beta.processed_artifact.is_none());
    assert!(beta.issues.iter().any(|i| i.starts_with("row 8:") && i.contains("email")));

    for name in ["alpha", "gamma"] {
        let outcome = summary.run.outcomes.iter().find(|o| o.source == name).unwrap();
        assert_eq!(outcome.state, SourceState::Loaded);
        assert_eq!(outcome.valid_records, 50);
    }

    // The skipped source's raw artifact remains stored.
    let store = artifact_store(&h);
    let beta_raw = store.list(Stage::Raw, Some("beta")).await.unwrap();
    assert_eq!(beta_raw.len(), 1);
    let beta_processed = store.list(Stage::Processed, Some("beta")).await.unwrap();
    assert!(beta_processed.is_empty());

    // Only the valid sources' rows reached the table.
    let table = summary.warehouse.expect("warehouse metadata should be available");
    assert_eq!(table.row_count, Some(100));

    // The validation summary attributes the errors to the skipped source.
    assert!(summary.validation.errors_by_source.contains_key("beta"));
    assert!(!summary.validation.errors_by_source.contains_key("alpha"));
}

#[tokio::test]
async fn test_masked_values_reach_the_warehouse() {
    let mut h = harness(vec![fixture("alpha", 5)]).await;
    let summary = h.orchestrator.run().await.unwrap();
    assert_eq!(summary.run.status, RunStatus::Success);

    // Read the processed artifact back and check the de-identification.
    let store = artifact_store(&h);
    let processed = store.list(Stage::Processed, Some("alpha")).await.unwrap();
    assert_eq!(processed.len(), 1);

    let masker = Masker::new("test_salt");
    let expected_ssn = masker.tokenize("ssn", "123-45-6789");

    let bytes = store.fetch_bytes(&processed[0]).await.unwrap();
    let reader = deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(
        bytes,
    )
    .unwrap()
    .build()
    .unwrap();
    let chunks: Vec<_> = reader.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(chunks.iter().map(|c| c.num_rows()).sum::<usize>(), 5);

    let chunk = &chunks[0];
    let schema = chunk.schema();
    let column = |name: &str| {
        chunk
            .column(schema.index_of(name).unwrap())
            .as_any()
            .downcast_ref::<deltalake::arrow::array::StringArray>()
            .unwrap()
            .value(0)
            .to_string()
    };

    assert_eq!(column("ssn"), expected_ssn);
    assert_eq!(column("phone"), "***-***-0142");
    assert!(column("email").ends_with("@example.com"));
    assert!(column("email").starts_with("TOKEN_"));
    assert!(column("salary").starts_with("TOKEN_"));

    let is_masked = chunk
        .column(schema.index_of("is_masked").unwrap())
        .as_any()
        .downcast_ref::<deltalake::arrow::array::BooleanArray>()
        .unwrap();
    assert!(is_masked.value(0));
}

#[tokio::test]
async fn test_extraction_failure_aborts_the_run_with_partial_stats() {
    struct FailingSource;

    #[async_trait]
    impl DataSource for FailingSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn extract(&self, _requested: usize) -> Result<Batch, ExtractionError> {
            Err(ExtractionError::Payload {
                source_name: "broken".to_string(),
                message: "source unreachable".to_string(),
            })
        }
    }

    let planned = vec![PlannedSource { source: Arc::new(FailingSource), records: 10 }];
    let mut h = harness(planned).await;

    let err = h.orchestrator.run().await.unwrap_err();
    assert!(err.to_string().contains("Extraction"));

    // The failed run's partial statistics stay readable.
    let run = h.orchestrator.last_run().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());
    assert_eq!(run.sources_processed, 0);
}
