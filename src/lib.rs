//! granary: a staged ETL pipeline for employee records.
//!
//! This library extracts employee batches from independent sources,
//! persists them as versioned Parquet artifacts in an object store,
//! validates them against a declarative schema, de-identifies sensitive
//! fields with deterministic tokenization, and bulk-loads the clean
//! artifacts into a Delta Lake analytical table.
//!
//! # Example
//!
//! ```ignore
//! use granary::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let summary = run_pipeline(config).await?;
//!     println!("Loaded {} records", summary.run.total_valid_records);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod mask;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod storage;
pub mod validate;
pub mod warehouse;

// Re-export main types
pub use config::Config;
pub use mask::Masker;
pub use pipeline::{Orchestrator, PipelineRun, RunSummary, run_pipeline};
pub use storage::{StorageProvider, StorageProviderRef};
pub use validate::Validator;
