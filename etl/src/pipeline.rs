use crate::session::shared_context;
use crate::storage::S3Connector;
use crate::tables::{LogTableBuilder, PipelineReport, SongTableBuilder};
use common::Result;
use common::config::{Credentials, Settings};
use std::time::Instant;
use tracing::info;

/// Source bucket used when no settings override it.
pub const INPUT_DATA: &str = common::config::DEFAULT_INPUT_ROOT;
/// Destination bucket used when no settings override it.
pub const OUTPUT_DATA: &str = common::config::DEFAULT_OUTPUT_ROOT;

/// Runs the complete ETL pipeline
pub async fn run_etl_pipeline(config_path: &str) -> Result<PipelineReport> {
    // Load configuration
    let settings = Settings::new(config_path)?;
    let credentials = Credentials::load(&settings.credentials_path)?;

    run_with_settings(&settings, credentials).await
}

/// Song pass, then log pass, on the shared context. The log pass joins
/// against song data, so the order is fixed.
pub async fn run_with_settings(
    settings: &Settings,
    credentials: Option<Credentials>,
) -> Result<PipelineReport> {
    let started = Instant::now();
    let ctx = shared_context();

    let song_data = settings.song_data_path();
    let log_data = settings.log_data_path();

    // Connectors must be in place before any data access
    let connector = S3Connector::new(settings.storage.clone(), credentials);
    connector.register_buckets(
        &ctx,
        [
            song_data.as_str(),
            log_data.as_str(),
            settings.output_root.as_str(),
        ],
    )?;

    info!(song_data = %song_data, output = %settings.output_root, "Processing song data");
    let mut report = SongTableBuilder::new(ctx.clone(), &settings.output_root)
        .process(&song_data)
        .await?;

    info!(log_data = %log_data, output = %settings.output_root, "Processing log data");
    let log_report = LogTableBuilder::new(ctx, &settings.output_root, &settings.timezone)
        .process(&log_data, &song_data)
        .await?;
    report.merge(log_report);

    for (table, rows) in &report.tables {
        info!(table = %table, rows, "Summary");
    }
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "ETL pipeline finished");

    Ok(report)
}
