//! Delta Lake analytical table.
//!
//! Handles idempotent table provisioning against the fixed, versioned
//! employee field list, append-only bulk loads of processed artifacts, and
//! ad-hoc queries. Loads copy the artifact's Parquet bytes under the table
//! root and commit an `Add` action; nothing is ever rewritten or deleted.

use chrono::{DateTime, Utc};
use deltalake::DeltaTable;
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::{DataType as ArrowType, Schema};
use deltalake::datafusion::prelude::SessionContext;
use deltalake::kernel::transaction::CommitBuilder;
use deltalake::kernel::{Action, Add, StructField, StructType};
use deltalake::operations::create::CreateBuilder;
use deltalake::protocol::SaveMode;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::emit;
use crate::error::{
    ArtifactFetchSnafu, DeltaLakeSnafu, LoadEmptySnafu, LoadMetaSnafu, QuerySnafu,
    StructTypeSnafu, TableWriteSnafu, UrlParseSnafu, WarehouseError,
};
use crate::metrics::events::{WarehouseLoadCompleted, WarehouseLoadFailed};
use crate::record::arrow::processed_schema;
use crate::storage::{BackendConfig, StorageProviderRef};

/// Version of the analytical table's field list. Bump when the persisted
/// schema changes shape.
pub const TABLE_SCHEMA_VERSION: u32 = 1;

/// Metadata snapshot of the analytical table.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub version: i64,
    /// Total rows according to per-file statistics; `None` when any file
    /// lacks stats.
    pub row_count: Option<u64>,
    pub byte_size: u64,
    pub file_count: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Field name and type pairs.
    pub schema: Vec<(String, String)>,
}

/// Append-only Delta Lake warehouse for processed employee batches.
pub struct DeltaWarehouse {
    storage: StorageProviderRef,
    artifacts: StorageProviderRef,
    table_url: String,
    table_name: String,
}

impl DeltaWarehouse {
    /// Create a warehouse over explicit storage handles: the table root and
    /// the artifact store it loads from.
    pub fn new(
        storage: StorageProviderRef,
        artifacts: StorageProviderRef,
        table_name: impl Into<String>,
    ) -> Self {
        // Register Delta Lake handlers for cloud storage
        deltalake::aws::register_handlers(None);
        deltalake::gcp::register_handlers(None);

        let table_url = table_url(&storage);

        Self {
            storage,
            artifacts,
            table_url,
            table_name: table_name.into(),
        }
    }

    async fn open_table(&self) -> Result<DeltaTable, WarehouseError> {
        let url = Url::parse(&self.table_url).context(UrlParseSnafu)?;
        deltalake::open_table_with_storage_options(url, self.storage.storage_options().clone())
            .await
            .context(DeltaLakeSnafu)
    }

    /// Idempotently provision the dataset: open the table if it exists,
    /// create it with the fixed field list otherwise.
    pub async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        match self.open_table().await {
            Ok(table) => {
                tracing::info!(
                    version = table.version().unwrap_or(-1),
                    "analytical table already exists"
                );
                Ok(())
            }
            Err(_) => {
                tracing::info!(url = %self.table_url, "creating analytical table");
                let delta_schema = arrow_schema_to_delta(&processed_schema())?;

                CreateBuilder::new()
                    .with_location(&self.table_url)
                    .with_columns(delta_schema.fields().cloned())
                    .with_storage_options(self.storage.storage_options().clone())
                    .await
                    .context(DeltaLakeSnafu)?;
                Ok(())
            }
        }
    }

    /// Bulk-load one processed artifact into the table.
    ///
    /// Append-only: the artifact bytes are copied under the table root and
    /// committed as a single `Add` action. Returns a job id embedding the
    /// resulting table version.
    pub async fn bulk_load(&self, artifact: &str, source: &str) -> Result<String, WarehouseError> {
        let start = Instant::now();
        let result = self.bulk_load_inner(artifact, source).await;
        match &result {
            Ok(job_id) => {
                emit!(WarehouseLoadCompleted { duration: start.elapsed() });
                tracing::info!(artifact = %artifact, job_id = %job_id, "bulk load committed");
            }
            Err(_) => emit!(WarehouseLoadFailed),
        }
        result
    }

    async fn bulk_load_inner(
        &self,
        artifact: &str,
        source: &str,
    ) -> Result<String, WarehouseError> {
        let bytes = self
            .artifacts
            .get(artifact)
            .await
            .context(ArtifactFetchSnafu { artifact: artifact.to_string() })?;
        ensure!(!bytes.is_empty(), LoadEmptySnafu { artifact: artifact.to_string() });

        use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        let num_rows = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
            .context(LoadMetaSnafu { artifact: artifact.to_string() })?
            .metadata()
            .file_metadata()
            .num_rows();

        let filename = format!("{}-{}.parquet", source, Uuid::now_v7());
        self.storage
            .put_payload(Path::from(filename.as_str()), PutPayload::from(bytes.clone()))
            .await
            .context(TableWriteSnafu)?;

        let mut table = self.open_table().await?;
        let action = add_action(&filename, bytes.len(), num_rows);
        let version = commit_to_delta(&mut table, vec![action]).await?;

        Ok(format!("load_{source}_v{version}"))
    }

    /// Run an ad-hoc query against the table. `None` selects a preview of
    /// the table's rows.
    pub async fn query(&self, sql: Option<&str>) -> Result<Vec<RecordBatch>, WarehouseError> {
        let table = self.open_table().await?;

        let ctx = SessionContext::new();
        ctx.register_table(self.table_name.as_str(), Arc::new(table))
            .context(QuerySnafu)?;

        let default_sql = format!("SELECT * FROM {} LIMIT 100", self.table_name);
        let sql = sql.unwrap_or(&default_sql);
        let frame = ctx.sql(sql).await.context(QuerySnafu)?;
        frame.collect().await.context(QuerySnafu)
    }

    /// Describe the table: row count, byte size, create/modify times, and
    /// the field list.
    pub async fn describe_table(&self) -> Result<TableInfo, WarehouseError> {
        let table = self.open_table().await?;
        let snapshot = table.snapshot().context(DeltaLakeSnafu)?;

        let files = snapshot
            .file_actions(table.log_store().as_ref())
            .await
            .context(DeltaLakeSnafu)?;
        let byte_size: u64 = files.iter().map(|f| f.size.max(0) as u64).sum();
        let row_count = files
            .iter()
            .map(file_row_count)
            .collect::<Option<Vec<u64>>>()
            .map(|counts| counts.iter().sum());
        let created_at = files
            .iter()
            .map(|f| f.modification_time)
            .min()
            .and_then(DateTime::from_timestamp_millis);
        let modified_at = files
            .iter()
            .map(|f| f.modification_time)
            .max()
            .and_then(DateTime::from_timestamp_millis);

        let schema = snapshot
            .schema()
            .fields()
            .map(|f| (f.name().to_string(), f.data_type().to_string()))
            .collect();

        Ok(TableInfo {
            version: table.version().unwrap_or(-1),
            row_count,
            byte_size,
            file_count: files.len(),
            created_at,
            modified_at,
            schema,
        })
    }
}

/// Row count recorded in a file's commit statistics.
fn file_row_count(add: &Add) -> Option<u64> {
    let stats = add.stats.as_deref()?;
    let value: serde_json::Value = serde_json::from_str(stats).ok()?;
    value.get("numRecords")?.as_u64()
}

/// Build the table URL for the storage provider's backend.
fn table_url(storage: &StorageProviderRef) -> String {
    let empty_path = Path::parse("").expect("empty path is valid");

    match storage.config() {
        BackendConfig::S3(s3) => {
            format!("s3://{}/{}", s3.bucket, storage.qualify_path(&empty_path))
        }
        BackendConfig::Gcs(gcs) => {
            format!("gs://{}/{}", gcs.bucket, storage.qualify_path(&empty_path))
        }
        BackendConfig::Local(local) => format!("file://{}", local.path),
    }
}

/// Convert the Arrow schema of processed artifacts to a Delta schema.
fn arrow_schema_to_delta(schema: &Schema) -> Result<StructType, WarehouseError> {
    let fields: Vec<StructField> = schema
        .fields()
        .iter()
        .map(|field| {
            let delta_type = arrow_type_to_delta(field.data_type())?;
            Ok(StructField::new(field.name(), delta_type, field.is_nullable()))
        })
        .collect::<Result<Vec<_>, WarehouseError>>()?;

    StructType::try_new(fields).map_err(|e| {
        StructTypeSnafu { message: e.to_string() }.build()
    })
}

/// Convert an Arrow data type to a Delta data type. Only the types in the
/// employee field list are supported.
fn arrow_type_to_delta(arrow_type: &ArrowType) -> Result<deltalake::kernel::DataType, WarehouseError> {
    use deltalake::kernel::DataType as DeltaType;

    match arrow_type {
        ArrowType::Utf8 => Ok(DeltaType::STRING),
        ArrowType::Boolean => Ok(DeltaType::BOOLEAN),
        ArrowType::Date32 => Ok(DeltaType::DATE),
        ArrowType::Timestamp(_, _) => Ok(DeltaType::TIMESTAMP),
        other => StructTypeSnafu { message: format!("unsupported arrow type: {other}") }.fail(),
    }
}

/// Create a Delta Lake Add action for a loaded file.
fn add_action(filename: &str, size: usize, num_rows: i64) -> Action {
    let subpath = filename.trim_start_matches('/');

    Action::Add(Add {
        path: subpath.to_string(),
        size: size as i64,
        partition_values: std::collections::HashMap::new(),
        modification_time: Utc::now().timestamp_millis(),
        data_change: true,
        stats: Some(serde_json::json!({ "numRecords": num_rows }).to_string()),
        ..Default::default()
    })
}

/// Commit add actions to the Delta table, append-only.
async fn commit_to_delta(
    table: &mut DeltaTable,
    add_actions: Vec<Action>,
) -> Result<i64, WarehouseError> {
    let version = CommitBuilder::default()
        .with_actions(add_actions)
        .build(
            Some(table.snapshot().context(DeltaLakeSnafu)?),
            table.log_store(),
            deltalake::protocol::DeltaOperation::Write {
                mode: SaveMode::Append,
                partition_by: None,
                predicate: None,
            },
        )
        .await
        .context(DeltaLakeSnafu)?
        .version;

    // Reload table to get new state
    table.load().await.context(DeltaLakeSnafu)?;

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_action_carries_row_stats() {
        let action = add_action("alpha-x.parquet", 1024, 50);
        match action {
            Action::Add(add) => {
                assert_eq!(add.path, "alpha-x.parquet");
                assert_eq!(add.size, 1024);
                assert!(add.data_change);
                assert_eq!(file_row_count(&add), Some(50));
            }
            _ => panic!("Expected Add action"),
        }
    }

    #[test]
    fn test_add_action_strips_leading_slash() {
        let action = add_action("/alpha-x.parquet", 10, 1);
        match action {
            Action::Add(add) => assert_eq!(add.path, "alpha-x.parquet"),
            _ => panic!("Expected Add action"),
        }
    }

    #[test]
    fn test_processed_schema_converts_to_delta() {
        let delta = arrow_schema_to_delta(&processed_schema()).unwrap();
        let fields: Vec<_> = delta.fields().collect();
        assert_eq!(fields.len(), 19);
        assert_eq!(fields[0].name(), "employee_id");
    }
}
