//! Command line entry point: run an ingestion pass, print the KPI report,
//! or both.

use anyhow::Context;
use clap::{Parser, Subcommand};

use screenfeed_sync::{render_report, run_ingest_from_env, IngestConfig, IngestPipeline};

#[derive(Parser)]
#[command(name = "screenfeed", about = "Catalog feed ingestion and KPI reporting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the catalog feeds and land them in the local store.
    Ingest,
    /// Print the KPI report over the current store contents.
    Report,
    /// Ingest, then print the report.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Ingest => {
            let summary = run_ingest_from_env().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Report => {
            let config = IngestConfig::from_env().context("loading configuration")?;
            let pipeline = IngestPipeline::new(&config).await?;
            print!("{}", render_report(pipeline.store()).await?);
        }
        Commands::Run => {
            let config = IngestConfig::from_env().context("loading configuration")?;
            let pipeline = IngestPipeline::new(&config).await?;
            let summary = pipeline.run_once().await?;
            if !summary.skipped_datasets.is_empty() {
                eprintln!("skipped datasets: {}", summary.skipped_datasets.join(", "));
            }
            print!("{}", render_report(pipeline.store()).await?);
        }
    }
    Ok(())
}
