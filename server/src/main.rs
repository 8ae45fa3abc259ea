use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use ingest_server::config;

/// Streaming file-ingestion server.
#[derive(Debug, Parser)]
#[clap(version)]
struct Opts {
    /// Path to the YAML config file.
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    init_logging();
    dump_version();

    let config = config::load_config(&opts.config).await?;
    ingest_server::run_api_server(config).await
}

fn init_logging() {
    let env_filter = EnvFilter::from_default_env();
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(env_filter);

    tracing_subscriber::registry().with(fmt_layer).init();
}

fn dump_version() {
    #[cfg(debug_assertions)]
    tracing::info!("ingestd {} (debug)", env!("CARGO_PKG_VERSION"));

    #[cfg(not(debug_assertions))]
    tracing::info!("ingestd {} (release)", env!("CARGO_PKG_VERSION"));
}
