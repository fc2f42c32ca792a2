use anyhow::Context;
use clap::{Arg, Command};
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/etl.toml";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    let report = sparkify_etl::run_etl_pipeline(config_path)
        .await
        .with_context(|| format!("ETL pipeline failed (config: {})", config_path))?;

    let total: usize = report.tables.iter().map(|(_, rows)| rows).sum();
    println!(
        "ETL pipeline complete: {} tables, {} rows written",
        report.tables.len(),
        total
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let matches = Command::new("Sparkify ETL")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds the Sparkify song-play tables from raw song and log data")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG);

    if let Err(e) = run(config_path).await {
        error!(error = ?e, "ETL pipeline error");
        eprintln!("ETL pipeline error: {:#}", e);
        process::exit(1);
    }
}
