//! Error types for granary using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase. Validation problems are NOT errors:
//! they are carried as data in a `ValidationReport` (see `crate::validate`).

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during object-store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error"))]
    GcsConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
///
/// All of these are fatal before the run starts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Artifact store path is empty.
    #[snafu(display("Artifact store path cannot be empty"))]
    EmptyStorePath,

    /// Warehouse table path is empty.
    #[snafu(display("Warehouse path cannot be empty"))]
    EmptyWarehousePath,

    /// No sources configured.
    #[snafu(display("At least one source must be configured"))]
    NoSources,

    /// Two sources share a name, which would collide in the artifact namespace.
    #[snafu(display("Duplicate source name: {name}"))]
    DuplicateSource { name: String },

    /// A source is configured to extract zero records.
    #[snafu(display("Source {name} must request at least one record"))]
    ZeroRecords { name: String },

    /// Masking salt is empty, which would produce guessable tokens.
    #[snafu(display("Masking salt cannot be empty"))]
    EmptySalt,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Extraction Errors ============

/// Errors that can occur while extracting records from a data source.
///
/// Any of these is fatal to the whole run: the source list and record
/// counts are fixed inputs known before the run starts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractionError {
    /// HTTP request to a remote source failed.
    #[snafu(display("Request to source {source_name} failed"))]
    Request {
        source_name: String,
        source: reqwest::Error,
    },

    /// Remote source returned a payload we could not interpret.
    #[snafu(display("Malformed payload from source {source_name}: {message}"))]
    Payload {
        source_name: String,
        message: String,
    },

    /// Failed to open a delimited input file.
    #[snafu(display("Failed to open source file {path}"))]
    FileOpen {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse a delimited input file.
    #[snafu(display("Failed to parse source file {path}"))]
    FileParse { path: String, source: csv::Error },
}

// ============ Artifact Errors ============

/// Errors that can occur while writing or reading columnar artifacts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArtifactError {
    /// Underlying storage operation failed.
    #[snafu(display("Artifact storage operation failed"))]
    ArtifactStorage { source: StorageError },

    /// Artifact does not exist.
    #[snafu(display("Artifact not found: {artifact}"))]
    NotFound { artifact: String },

    /// Artifact exists but is zero-length.
    #[snafu(display("Artifact is empty: {artifact}"))]
    EmptyArtifact { artifact: String },

    /// Every row was dropped by the identity-field contract; refusing to
    /// persist an empty artifact.
    #[snafu(display("No persistable rows remain for source {source_name}"))]
    NoPersistableRows { source_name: String },

    /// Parquet encoding failed.
    #[snafu(display("Parquet encode error"))]
    ParquetEncode {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Parquet decoding failed.
    #[snafu(display("Parquet decode error for {artifact}"))]
    ParquetDecode {
        artifact: String,
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Arrow conversion failed.
    #[snafu(display("Arrow conversion error"))]
    Arrow {
        source: deltalake::arrow::error::ArrowError,
    },

    /// A persisted column does not have the expected type.
    #[snafu(display("Unexpected column layout in {artifact}: {message}"))]
    ColumnDecode { artifact: String, message: String },
}

impl ArtifactError {
    /// Check if this error represents a missing artifact.
    pub fn is_not_found(&self) -> bool {
        match self {
            ArtifactError::NotFound { .. } => true,
            ArtifactError::ArtifactStorage { source } => source.is_not_found(),
            _ => false,
        }
    }
}

// ============ Warehouse Errors ============

/// Errors that can occur during Delta Lake warehouse operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// Failed to parse the table URL.
    #[snafu(display("Failed to parse table URL"))]
    UrlParse { source: url::ParseError },

    /// Delta Lake operation failed.
    #[snafu(display("Delta Lake operation failed"))]
    DeltaLake { source: deltalake::DeltaTableError },

    /// Failed to build the Delta schema from the table field list.
    #[snafu(display("Failed to build table schema: {message}"))]
    StructType { message: String },

    /// Could not fetch the artifact to load.
    #[snafu(display("Failed to fetch artifact {artifact} for loading"))]
    ArtifactFetch {
        artifact: String,
        source: StorageError,
    },

    /// The artifact to load is zero-length.
    #[snafu(display("Refusing to load empty artifact {artifact}"))]
    LoadEmpty { artifact: String },

    /// Could not read the Parquet footer of the artifact to load.
    #[snafu(display("Failed to read Parquet metadata for {artifact}"))]
    LoadMeta {
        artifact: String,
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to copy the artifact under the table root.
    #[snafu(display("Failed to write load file into table"))]
    TableWrite { source: StorageError },

    /// Ad-hoc query failed.
    #[snafu(display("Warehouse query failed"))]
    Query {
        source: deltalake::datafusion::error::DataFusionError,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Extraction error (fatal to the run).
    #[snafu(display("Extraction error"))]
    Extraction { source: ExtractionError },

    /// Artifact store error (fatal to the run for raw and processed stages).
    #[snafu(display("Artifact error"))]
    Artifact { source: ArtifactError },

    /// Warehouse error during schema provisioning.
    #[snafu(display("Warehouse error"))]
    Warehouse { source: WarehouseError },

    /// Storage provider construction error.
    #[snafu(display("Storage error"))]
    PipelineStorage { source: StorageError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },
}
