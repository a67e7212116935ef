use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader, BufWriter};
use tracing::info;

use kubesumo_filter::SumoFilter;

mod config;
mod pipeline;

use config::AppConfig;

/// Kubesumo - Enrich Kubernetes log records with Sumo Logic metadata
#[derive(Parser, Debug)]
#[command(name = "kubesumo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines input file (reads stdin if not provided)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// TOML config file with a [filter] table
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// YAML exclusion config to watch for changes
    #[arg(long, value_name = "FILE")]
    exclude_config: Option<PathBuf>,

    /// How often to check the exclusion config for changes
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Strip kubernetes and docker metadata from forwarded records
    #[arg(long)]
    no_kubernetes_meta: bool,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(args.log_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let mut app_config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    app_config.apply_overrides(
        args.exclude_config,
        args.poll_interval_ms,
        args.no_kubernetes_meta,
    );

    let mut filter =
        SumoFilter::configure(app_config.filter).context("Failed to configure filter")?;
    filter.start();

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input: {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let output = BufWriter::new(tokio::io::stdout());

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt");
        }
    };

    let result = pipeline::run(&filter, input, output, shutdown).await;
    filter.shutdown().await;

    let counts = result?;
    info!(
        read = counts.read,
        forwarded = counts.forwarded,
        skipped = counts.skipped,
        "input finished"
    );
    Ok(())
}
