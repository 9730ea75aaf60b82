//! Versioned columnar artifact store.
//!
//! Batches are persisted as self-describing Parquet objects, one per
//! (stage, source, run-timestamp) triple. Artifact ids embed all three, at
//! second resolution, so they are unique per run and sort chronologically.
//!
//! The persisted-artifact contract requires the identity fields
//! (`employee_id`, `first_name`, `last_name`, `email`) to be non-empty;
//! rows violating it are dropped before persistence and a write that would
//! produce an empty artifact fails loudly instead.

use bytes::Bytes;
use chrono::Utc;
use deltalake::arrow::array::RecordBatch;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use deltalake::parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use tracing::{info, warn};

use crate::config::ParquetCompression;
use crate::emit;
use crate::error::{
    ArtifactError, ArtifactStorageSnafu, EmptyArtifactSnafu, NoPersistableRowsSnafu, NotFoundSnafu,
    ParquetDecodeSnafu, ParquetEncodeSnafu,
};
use crate::metrics::events::{ArtifactBytesWritten, ArtifactWritten};
use crate::record::{Batch, MaskedBatch, arrow};
use crate::storage::StorageProviderRef;

/// Pipeline stage an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Processed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Processed => "processed",
        }
    }
}

/// Content-addressed-by-timestamp store for batch artifacts.
pub struct ArtifactStore {
    storage: StorageProviderRef,
    compression: ParquetCompression,
}

impl ArtifactStore {
    pub fn new(storage: StorageProviderRef, compression: ParquetCompression) -> Self {
        Self { storage, compression }
    }

    fn artifact_id(stage: Stage, source: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        format!("{}/{}_{}.parquet", stage.as_str(), source, timestamp)
    }

    /// Persist a raw batch. Returns the artifact id.
    pub async fn write_raw(&self, batch: &Batch) -> Result<String, ArtifactError> {
        let kept: Vec<_> = batch.records.iter().filter(|r| r.has_identity()).collect();
        let dropped = batch.len() - kept.len();
        if dropped > 0 {
            warn!(
                source = %batch.source,
                dropped,
                "dropping rows with incomplete identity fields before persistence"
            );
        }
        ensure!(!kept.is_empty(), NoPersistableRowsSnafu { source_name: batch.source.clone() });

        let arrow_batch = arrow::raw_to_arrow(&kept, &batch.columns)?;
        self.write_object(Stage::Raw, &batch.source, &arrow_batch).await
    }

    /// Persist a processed (masked) batch. Returns the artifact id.
    pub async fn write_processed(&self, batch: &MaskedBatch) -> Result<String, ArtifactError> {
        let kept: Vec<_> = batch.records.iter().filter(|r| r.has_identity()).collect();
        let dropped = batch.len() - kept.len();
        if dropped > 0 {
            warn!(
                source = %batch.source,
                dropped,
                "dropping masked rows with incomplete identity fields before persistence"
            );
        }
        ensure!(!kept.is_empty(), NoPersistableRowsSnafu { source_name: batch.source.clone() });

        let arrow_batch = arrow::masked_to_arrow(&kept)?;
        self.write_object(Stage::Processed, &batch.source, &arrow_batch).await
    }

    async fn write_object(
        &self,
        stage: Stage,
        source: &str,
        arrow_batch: &RecordBatch,
    ) -> Result<String, ArtifactError> {
        let artifact = Self::artifact_id(stage, source);
        let bytes = self.encode_parquet(arrow_batch)?;
        let size = bytes.len();

        self.storage
            .put(artifact.as_str(), bytes)
            .await
            .context(ArtifactStorageSnafu)?;

        emit!(ArtifactWritten { stage: stage.as_str() });
        emit!(ArtifactBytesWritten { bytes: size as u64 });
        info!(
            artifact = %artifact,
            rows = arrow_batch.num_rows(),
            bytes = size,
            "artifact written"
        );
        Ok(artifact)
    }

    /// Read a raw artifact back into a batch.
    pub async fn read_raw(&self, artifact: &str) -> Result<Batch, ArtifactError> {
        let bytes = self.fetch_bytes(artifact).await?;
        let chunks = self.decode_parquet(bytes, artifact)?;
        let source = source_name(artifact);
        arrow::raw_from_arrow(&chunks, &source, artifact)
    }

    /// Fetch the undecoded bytes of an artifact, failing on missing or
    /// zero-length objects.
    pub async fn fetch_bytes(&self, artifact: &str) -> Result<Bytes, ArtifactError> {
        let result = self.storage.get(artifact).await;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return NotFoundSnafu { artifact: artifact.to_string() }.fail();
            }
            Err(e) => return Err(e).context(ArtifactStorageSnafu),
        };
        ensure!(!bytes.is_empty(), EmptyArtifactSnafu { artifact: artifact.to_string() });
        Ok(bytes)
    }

    /// List artifact ids for a stage, optionally restricted to one source,
    /// in lexical (chronological) order.
    pub async fn list(
        &self,
        stage: Stage,
        source: Option<&str>,
    ) -> Result<Vec<String>, ArtifactError> {
        let paths = self
            .storage
            .list_with_prefix(stage.as_str())
            .await
            .context(ArtifactStorageSnafu)?;

        let mut artifacts: Vec<String> = paths
            .into_iter()
            .map(|p| p.to_string())
            .filter(|p| p.ends_with(".parquet"))
            .filter(|p| match source {
                Some(name) => p
                    .strip_prefix(&format!("{}/", stage.as_str()))
                    .is_some_and(|file| file.starts_with(&format!("{name}_"))),
                None => true,
            })
            .collect();
        artifacts.sort();
        Ok(artifacts)
    }

    fn encode_parquet(&self, batch: &RecordBatch) -> Result<Vec<u8>, ArtifactError> {
        let properties = WriterProperties::builder()
            .set_compression(match self.compression {
                ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
                ParquetCompression::Snappy => Compression::SNAPPY,
                ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
                ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
                ParquetCompression::Lz4 => Compression::LZ4,
            })
            .build();

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))
            .context(ParquetEncodeSnafu)?;
        writer.write(batch).context(ParquetEncodeSnafu)?;
        writer.close().context(ParquetEncodeSnafu)?;
        Ok(buffer)
    }

    fn decode_parquet(
        &self,
        bytes: Bytes,
        artifact: &str,
    ) -> Result<Vec<RecordBatch>, ArtifactError> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .context(ParquetDecodeSnafu { artifact: artifact.to_string() })?
            .build()
            .context(ParquetDecodeSnafu { artifact: artifact.to_string() })?;

        reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ArtifactError::ColumnDecode {
                artifact: artifact.to_string(),
                message: e.to_string(),
            })
    }
}

/// Recover the source name from an artifact id. The trailing two
/// `_`-separated segments are the timestamp; source names may themselves
/// contain underscores.
fn source_name(artifact: &str) -> String {
    let file = artifact
        .rsplit_once('/')
        .map(|(_, file)| file)
        .unwrap_or(artifact)
        .trim_end_matches(".parquet");

    let parts: Vec<&str> = file.split('_').collect();
    if parts.len() > 2 {
        parts[..parts.len() - 2].join("_")
    } else {
        file.to_string()
    }
}
