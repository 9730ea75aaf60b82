//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when records are extracted from a source.
pub struct RecordsExtracted {
    pub source: String,
    pub count: u64,
}

impl InternalEvent for RecordsExtracted {
    fn emit(self) {
        trace!(source = %self.source, count = self.count, "Records extracted");
        counter!("granary_records_extracted_total", "source" => self.source).increment(self.count);
    }
}

/// Event emitted when a batch completes validation.
pub struct BatchValidated {
    pub source: String,
    pub valid: bool,
}

impl InternalEvent for BatchValidated {
    fn emit(self) {
        let outcome = if self.valid { "valid" } else { "invalid" };
        trace!(source = %self.source, outcome, "Batch validated");
        counter!("granary_batches_validated_total", "source" => self.source, "outcome" => outcome)
            .increment(1);
    }
}

/// Event emitted for each validation issue found.
pub struct ValidationIssues {
    pub count: u64,
}

impl InternalEvent for ValidationIssues {
    fn emit(self) {
        trace!(count = self.count, "Validation issues");
        counter!("granary_validation_issues_total").increment(self.count);
    }
}

/// Event emitted when records are de-identified.
pub struct RecordsMasked {
    pub count: u64,
}

impl InternalEvent for RecordsMasked {
    fn emit(self) {
        trace!(count = self.count, "Records masked");
        counter!("granary_records_masked_total").increment(self.count);
    }
}

/// Event emitted when an artifact is persisted.
pub struct ArtifactWritten {
    pub stage: &'static str,
}

impl InternalEvent for ArtifactWritten {
    fn emit(self) {
        trace!(stage = self.stage, "Artifact written");
        counter!("granary_artifacts_written_total", "stage" => self.stage).increment(1);
    }
}

/// Event emitted when artifact bytes are written.
pub struct ArtifactBytesWritten {
    pub bytes: u64,
}

impl InternalEvent for ArtifactBytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, "Artifact bytes written");
        counter!("granary_artifact_bytes_written_total").increment(self.bytes);
    }
}

/// Event emitted when a warehouse bulk load finishes.
pub struct WarehouseLoadCompleted {
    pub duration: Duration,
}

impl InternalEvent for WarehouseLoadCompleted {
    fn emit(self) {
        trace!(duration = ?self.duration, "Warehouse load completed");
        counter!("granary_warehouse_loads_total", "status" => "success").increment(1);
        histogram!("granary_warehouse_load_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a warehouse bulk load fails.
pub struct WarehouseLoadFailed;

impl InternalEvent for WarehouseLoadFailed {
    fn emit(self) {
        trace!("Warehouse load failed");
        counter!("granary_warehouse_loads_total", "status" => "error").increment(1);
    }
}

/// Terminal status of a processed source.
#[derive(Debug, Clone, Copy)]
pub enum SourceStatus {
    Loaded,
    SkippedInvalid,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Loaded => "loaded",
            SourceStatus::SkippedInvalid => "skipped_invalid",
            SourceStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a source reaches a terminal state.
pub struct SourceProcessed {
    pub status: SourceStatus,
}

impl InternalEvent for SourceProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Source processed");
        counter!("granary_sources_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Storage operation kind for request metrics.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
}

impl StorageOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
        }
    }
}

/// Outcome of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted for each storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "granary_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the duration of each storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "granary_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
