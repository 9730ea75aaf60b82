//! granary: a staged ETL pipeline for employee records.
//!
//! Extracts employee batches from the configured sources, persists raw and
//! processed Parquet artifacts to an object store, validates and
//! de-identifies them, and bulk-loads the result into a Delta Lake table.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use granary::config::Config;
use granary::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use granary::pipeline::run_pipeline;

/// Employee-record ETL pipeline.
#[derive(Parser, Debug)]
#[command(name = "granary")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("granary starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        granary::metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Artifact store: {}", config.store.path);
        info!("Warehouse: {}", config.warehouse.path);
        info!("Sources: {}", config.sources.len());
        for source in &config.sources {
            info!("  - {} ({} records)", source.name, source.records);
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let summary = run_pipeline(config).await?;

    info!("Pipeline completed");
    info!("  Status: {:?}", summary.run.status);
    info!("  Sources processed: {}", summary.run.sources_processed);
    info!("  Raw records: {}", summary.run.total_raw_records);
    info!("  Valid records: {}", summary.run.total_valid_records);
    info!("  Validation errors: {}", summary.run.total_errors);
    info!("  Artifacts written: {}", summary.run.artifacts_written.len());
    if let Some(duration) = summary.run.duration_secs() {
        info!("  Duration: {duration:.2}s");
    }
    for outcome in &summary.run.outcomes {
        info!(
            "  - {}: {} ({} raw, {} valid)",
            outcome.source,
            outcome.state.as_str(),
            outcome.raw_records,
            outcome.valid_records
        );
    }
    if let Some(table) = &summary.warehouse {
        info!(
            "  Warehouse: version {}, {} files, {} bytes, {} rows",
            table.version,
            table.file_count,
            table.byte_size,
            table.row_count.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
    }

    Ok(())
}
