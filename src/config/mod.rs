//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files with environment-variable
//! interpolation, and fails fast on missing required settings before a run
//! starts.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{
    ConfigError, DuplicateSourceSnafu, EmptySaltSnafu, EmptyStorePathSnafu,
    EmptyWarehousePathSnafu, EnvInterpolationSnafu, NoSourcesSnafu, ReadFileSnafu, YamlParseSnafu,
    ZeroRecordsSnafu,
};

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sources to extract from, in declaration order.
    pub sources: Vec<SourceConfig>,
    pub store: StoreConfig,
    pub warehouse: WarehouseConfig,
    /// Masking configuration (optional; defaults to the reference salt).
    #[serde(default)]
    pub masking: MaskingConfig,
    /// Orchestration knobs (optional).
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One configured data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name; also partitions the artifact namespace.
    pub name: String,
    #[serde(flatten)]
    pub kind: SourceKind,
    /// How many records to request per run (default: 50).
    #[serde(default = "default_records")]
    pub records: usize,
}

/// Connector-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// In-process generator of realistic employee rows.
    Synthetic {
        /// Prefix for generated employee ids (default: "EMP").
        #[serde(default = "default_id_prefix")]
        id_prefix: String,
    },
    /// JSONPlaceholder-shaped HTTP API.
    Rest { base_url: String },
    /// Delimited file on the local filesystem.
    Delimited { path: String },
}

fn default_records() -> usize {
    50
}

fn default_id_prefix() -> String {
    "EMP".to_string()
}

/// Artifact store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage URL for artifacts.
    /// Examples: "gs://bucket/artifacts", "s3://bucket/artifacts", "/local/path"
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,
}

/// Warehouse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Storage URL of the Delta table root.
    /// Examples: "gs://bucket/warehouse/employees", "/local/path/employees"
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Name the table is registered under for ad-hoc SQL (default: "employees").
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

fn default_table_name() -> String {
    "employees".to_string()
}

/// Masking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Salt mixed into every token digest. Override per deployment so
    /// tokens are not guessable from public code.
    #[serde(default = "default_salt")]
    pub salt: String,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self { salt: default_salt() }
    }
}

fn default_salt() -> String {
    "etl_pipeline_salt".to_string()
}

/// Orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of source chains processed concurrently (default: 4).
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrent_sources: default_max_concurrent_sources() }
    }
}

fn default_max_concurrent_sources() -> usize {
    4
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment
    /// variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            match vars::interpolate(&content) {
                Ok(text) => text,
                Err(errors) => {
                    return EnvInterpolationSnafu { message: errors.join("\n") }.fail();
                }
            }
        } else {
            content
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Missing required settings are fatal
    /// before the run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.store.path.is_empty(), EmptyStorePathSnafu);
        ensure!(!self.warehouse.path.is_empty(), EmptyWarehousePathSnafu);
        ensure!(!self.sources.is_empty(), NoSourcesSnafu);
        ensure!(!self.masking.salt.is_empty(), EmptySaltSnafu);

        let mut names = HashSet::new();
        for source in &self.sources {
            ensure!(
                names.insert(source.name.as_str()),
                DuplicateSourceSnafu { name: source.name.clone() }
            );
            ensure!(source.records > 0, ZeroRecordsSnafu { name: source.name.clone() });
        }
        Ok(())
    }
}
