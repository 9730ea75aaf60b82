//! Pipeline orchestration.
//!
//! Drives the per-source chain extract → raw persist → validate → mask →
//! processed persist → warehouse load. Source chains are independent and
//! touch disjoint artifact names, so they run concurrently on a bounded
//! pool through processed persistence; the run-level aggregate is only
//! mutated at the fan-in point, by a single writer, which also performs
//! the warehouse loads one at a time (the table's commit log is the one
//! piece of shared state).
//!
//! Failure domains follow the reference semantics: extraction and
//! persistence failures abort the whole run, a batch that fails validation
//! only skips its source, and warehouse load failures are collected
//! without stopping the remaining sources.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::emit;
use crate::error::{
    ArtifactSnafu, ConfigSnafu, ExtractionSnafu, PipelineError, PipelineStorageSnafu,
    WarehouseSnafu,
};
use crate::mask::Masker;
use crate::metrics::events::{
    BatchValidated, RecordsExtracted, RecordsMasked, SourceProcessed, SourceStatus,
    ValidationIssues,
};
use crate::source::{DataSource, PlannedSource, build_sources};
use crate::storage::StorageProvider;
use crate::validate::{ValidationSummary, Validator};
use crate::warehouse::{DeltaWarehouse, TableInfo};

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    /// At least one warehouse load failed; everything else completed.
    PartialFailure,
    /// The run aborted on an unrecoverable error.
    Failed,
}

/// Per-source state machine. Sources advance through the chain in order
/// and end in one of `Loaded`, `SkippedInvalid`, or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Extracted,
    RawPersisted,
    Validated,
    Masked,
    ProcessedPersisted,
    Loaded,
    SkippedInvalid,
    Failed,
}

impl SourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceState::Extracted => "extracted",
            SourceState::RawPersisted => "raw_persisted",
            SourceState::Validated => "validated",
            SourceState::Masked => "masked",
            SourceState::ProcessedPersisted => "processed_persisted",
            SourceState::Loaded => "loaded",
            SourceState::SkippedInvalid => "skipped_invalid",
            SourceState::Failed => "failed",
        }
    }
}

/// What happened to one source by the end of its chain.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: String,
    pub state: SourceState,
    /// Records extracted from the source.
    pub raw_records: usize,
    /// Records that survived validation and were processed; zero for a
    /// skipped source.
    pub valid_records: usize,
    pub raw_artifact: Option<String>,
    pub processed_artifact: Option<String>,
    pub load_job: Option<String>,
    /// Collected warehouse load failure, if any.
    pub load_error: Option<String>,
    /// Validation issues for a skipped source.
    pub issues: Vec<String>,
}

/// Aggregate state for one pipeline execution. Owned by the orchestrator
/// for the run's lifetime and exposed read-only afterward.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub sources_processed: usize,
    pub total_raw_records: usize,
    pub total_valid_records: usize,
    /// Cumulative validation error count across the run.
    pub total_errors: usize,
    /// Every artifact id written, raw and processed.
    pub artifacts_written: Vec<String>,
    pub outcomes: Vec<SourceOutcome>,
}

impl PipelineRun {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            sources_processed: 0,
            total_raw_records: 0,
            total_valid_records: 0,
            total_errors: 0,
            artifacts_written: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Single mutation point: merge one completed source chain.
    fn absorb(&mut self, outcome: SourceOutcome) {
        self.sources_processed += 1;
        self.total_raw_records += outcome.raw_records;
        self.total_valid_records += outcome.valid_records;
        self.artifacts_written.extend(outcome.raw_artifact.iter().cloned());
        self.artifacts_written.extend(outcome.processed_artifact.iter().cloned());
        self.outcomes.push(outcome);
    }

    fn finalize(&mut self, status: RunStatus, total_errors: usize) {
        self.status = status;
        self.total_errors = total_errors;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration of the run, if finished.
    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Result of a completed run: frozen statistics, the validation summary,
/// and a best-effort warehouse snapshot.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run: PipelineRun,
    pub validation: ValidationSummary,
    /// `None` when the metadata lookup itself failed; never fails the run.
    pub warehouse: Option<TableInfo>,
}

/// Orchestrates one run across all configured sources.
pub struct Orchestrator {
    planned: Vec<PlannedSource>,
    store: Arc<ArtifactStore>,
    warehouse: Arc<DeltaWarehouse>,
    validator: Arc<Validator>,
    masker: Arc<Masker>,
    max_concurrent_sources: usize,
    run: Option<PipelineRun>,
}

impl Orchestrator {
    /// Create an orchestrator from explicit component handles.
    pub fn new(
        planned: Vec<PlannedSource>,
        store: ArtifactStore,
        warehouse: DeltaWarehouse,
        validator: Validator,
        masker: Masker,
        max_concurrent_sources: usize,
    ) -> Self {
        Self {
            planned,
            store: Arc::new(store),
            warehouse: Arc::new(warehouse),
            validator: Arc::new(validator),
            masker: Arc::new(masker),
            max_concurrent_sources: max_concurrent_sources.max(1),
            run: None,
        }
    }

    /// The most recent run's frozen state, including partial statistics
    /// after a failed run.
    pub fn last_run(&self) -> Option<&PipelineRun> {
        self.run.as_ref()
    }

    /// Execute the full pipeline across all sources.
    ///
    /// On an unrecoverable error the run is finalized with its partial
    /// statistics (readable via [`Orchestrator::last_run`]) and the error
    /// is re-raised.
    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        info!(sources = self.planned.len(), "starting pipeline run");
        let mut run = PipelineRun::begin();

        if let Err(e) = self.warehouse.ensure_schema().await {
            error!("warehouse schema provisioning failed: {e}");
            run.finalize(RunStatus::Failed, self.validator.summary().total_errors);
            self.run = Some(run);
            return Err(e).context(WarehouseSnafu);
        }

        let chains: Vec<_> = self
            .planned
            .iter()
            .map(|planned| {
                process_source(
                    planned.source.clone(),
                    planned.records,
                    self.store.clone(),
                    self.validator.clone(),
                    self.masker.clone(),
                )
            })
            .collect();
        let stream = futures::stream::iter(chains).buffer_unordered(self.max_concurrent_sources);
        let mut stream = std::pin::pin!(stream);

        let mut fatal = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(outcome) => run.absorb(outcome),
                Err(e) => {
                    // Unrecoverable: remaining chains are dropped.
                    fatal = Some(e);
                    break;
                }
            }
        }
        drop(stream);

        let validation = self.validator.summary();

        if let Some(e) = fatal {
            run.finalize(RunStatus::Failed, validation.total_errors);
            error!(
                sources_processed = run.sources_processed,
                total_raw_records = run.total_raw_records,
                total_valid_records = run.total_valid_records,
                "pipeline run failed: {e}"
            );
            self.run = Some(run);
            return Err(e);
        }

        self.load_processed(&mut run).await;

        let any_load_failed = run.outcomes.iter().any(|o| o.load_error.is_some());
        let status = if any_load_failed { RunStatus::PartialFailure } else { RunStatus::Success };
        run.finalize(status, validation.total_errors);

        let warehouse = match self.warehouse.describe_table().await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("could not describe warehouse table: {e}");
                None
            }
        };

        info!(
            status = ?run.status,
            sources_processed = run.sources_processed,
            total_raw_records = run.total_raw_records,
            total_valid_records = run.total_valid_records,
            total_errors = run.total_errors,
            artifacts = run.artifacts_written.len(),
            duration_secs = ?run.duration_secs(),
            "pipeline run complete"
        );

        let summary = RunSummary { run: run.clone(), validation, warehouse };
        self.run = Some(run);
        Ok(summary)
    }

    /// Load every processed artifact into the warehouse, one source at a
    /// time. Failures are collected on the outcome and never stop the
    /// remaining loads.
    async fn load_processed(&self, run: &mut PipelineRun) {
        for outcome in &mut run.outcomes {
            let Some(artifact) = outcome.processed_artifact.clone() else {
                continue;
            };
            match self.warehouse.bulk_load(&artifact, &outcome.source).await {
                Ok(job) => {
                    info!(source = %outcome.source, job = %job, "source loaded");
                    outcome.state = SourceState::Loaded;
                    outcome.load_job = Some(job);
                    emit!(SourceProcessed { status: SourceStatus::Loaded });
                }
                Err(e) => {
                    warn!(source = %outcome.source, "warehouse load failed: {e}");
                    outcome.state = SourceState::Failed;
                    outcome.load_error = Some(e.to_string());
                    emit!(SourceProcessed { status: SourceStatus::Failed });
                }
            }
        }
    }
}

/// Process one source through its chain, up to processed persistence.
///
/// Returns `Err` only for failures that are fatal to the run; a validation
/// failure is a terminal per-source outcome. The warehouse load happens at
/// the fan-in point, after every chain has completed.
async fn process_source(
    source: Arc<dyn DataSource>,
    requested: usize,
    store: Arc<ArtifactStore>,
    validator: Arc<Validator>,
    masker: Arc<Masker>,
) -> Result<SourceOutcome, PipelineError> {
    let name = source.name().to_string();
    info!(source = %name, requested, "processing source");

    let batch = source.extract(requested).await.context(ExtractionSnafu)?;
    if batch.len() < requested {
        info!(
            source = %name,
            extracted = batch.len(),
            requested,
            "source returned fewer records than requested"
        );
    }
    emit!(RecordsExtracted { source: name.clone(), count: batch.len() as u64 });
    debug!(source = %name, state = SourceState::Extracted.as_str(), rows = batch.len(), "stage complete");

    let raw_artifact = store.write_raw(&batch).await.context(ArtifactSnafu)?;
    debug!(source = %name, state = SourceState::RawPersisted.as_str(), artifact = %raw_artifact, "stage complete");

    // The persisted artifact is the source of truth for downstream stages.
    let raw_batch = store.read_raw(&raw_artifact).await.context(ArtifactSnafu)?;

    let report = validator.validate(&raw_batch);
    emit!(BatchValidated { source: name.clone(), valid: report.is_valid });
    emit!(ValidationIssues { count: report.issues.len() as u64 });
    debug!(source = %name, state = SourceState::Validated.as_str(), valid = report.is_valid, "stage complete");

    if !report.is_valid {
        warn!(
            source = %name,
            issues = report.issues.len(),
            "batch failed validation, skipping source"
        );
        for issue in &report.issues {
            warn!(source = %name, "- {issue}");
        }
        emit!(SourceProcessed { status: SourceStatus::SkippedInvalid });
        return Ok(SourceOutcome {
            source: name,
            state: SourceState::SkippedInvalid,
            raw_records: batch.len(),
            valid_records: 0,
            raw_artifact: Some(raw_artifact),
            processed_artifact: None,
            load_job: None,
            load_error: None,
            issues: report.issues,
        });
    }

    let masked = masker.mask(&raw_batch);
    emit!(RecordsMasked { count: masked.len() as u64 });
    debug!(source = %name, state = SourceState::Masked.as_str(), rows = masked.len(), "stage complete");

    let processed_artifact = store.write_processed(&masked).await.context(ArtifactSnafu)?;
    debug!(source = %name, state = SourceState::ProcessedPersisted.as_str(), artifact = %processed_artifact, "stage complete");

    Ok(SourceOutcome {
        source: name,
        state: SourceState::ProcessedPersisted,
        raw_records: batch.len(),
        valid_records: masked.len(),
        raw_artifact: Some(raw_artifact),
        processed_artifact: Some(processed_artifact),
        load_job: None,
        load_error: None,
        issues: Vec::new(),
    })
}

/// Run the pipeline with the given configuration.
///
/// Builds every collaborator from the configuration, hands explicit
/// handles to the orchestrator, and executes one run.
pub async fn run_pipeline(config: Config) -> Result<RunSummary, PipelineError> {
    config.validate().context(ConfigSnafu)?;

    let store_provider = Arc::new(
        StorageProvider::for_url_with_options(
            &config.store.path,
            config.store.storage_options.clone(),
        )
        .await
        .context(PipelineStorageSnafu)?,
    );

    let warehouse_provider = Arc::new(
        StorageProvider::for_url_with_options(
            &config.warehouse.path,
            config.warehouse.storage_options.clone(),
        )
        .await
        .context(PipelineStorageSnafu)?,
    );

    let store = ArtifactStore::new(store_provider.clone(), config.store.compression);
    let warehouse = DeltaWarehouse::new(
        warehouse_provider,
        store_provider,
        config.warehouse.table_name.clone(),
    );

    let mut orchestrator = Orchestrator::new(
        build_sources(&config.sources),
        store,
        warehouse,
        Validator::new(),
        Masker::new(config.masking.salt.clone()),
        config.pipeline.max_concurrent_sources,
    );

    orchestrator.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(state: SourceState, raw: usize, valid: usize) -> SourceOutcome {
        SourceOutcome {
            source: "test".to_string(),
            state,
            raw_records: raw,
            valid_records: valid,
            raw_artifact: Some("raw/test_20260101_000000.parquet".to_string()),
            processed_artifact: (valid > 0)
                .then(|| "processed/test_20260101_000000.parquet".to_string()),
            load_job: None,
            load_error: None,
            issues: Vec::new(),
        }
    }

    #[test]
    fn test_absorb_accumulates_counts_and_artifacts() {
        let mut run = PipelineRun::begin();
        run.absorb(outcome(SourceState::Loaded, 50, 50));
        run.absorb(outcome(SourceState::SkippedInvalid, 50, 0));

        assert_eq!(run.sources_processed, 2);
        assert_eq!(run.total_raw_records, 100);
        assert_eq!(run.total_valid_records, 50);
        // Two raw artifacts plus one processed.
        assert_eq!(run.artifacts_written.len(), 3);
    }

    #[test]
    fn test_finalize_stamps_end_time_and_status() {
        let mut run = PipelineRun::begin();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.duration_secs().is_none());

        run.finalize(RunStatus::Success, 7);
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.total_errors, 7);
        assert!(run.finished_at.is_some());
        assert!(run.duration_secs().is_some());
    }

    #[test]
    fn test_source_state_names() {
        assert_eq!(SourceState::Loaded.as_str(), "loaded");
        assert_eq!(SourceState::SkippedInvalid.as_str(), "skipped_invalid");
        assert_eq!(SourceState::Failed.as_str(), "failed");
    }
}
