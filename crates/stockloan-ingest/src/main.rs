//! Stock Loan Ingest - daily stock-loan availability loader

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::io::Write;
use std::time::Duration;
use stockloan_common::logging::{init_logging, LogConfig, LogLevel};
use stockloan_ingest::ftp::SuppaFtpConnector;
use stockloan_ingest::storage::run_migrations;
use stockloan_ingest::{fetch_regions, IngestConfig, Region, StockLoanPipeline};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stockloan-ingest")]
#[command(author, version, about = "Stock loan availability ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch every region and append the batch to the database
    Run {
        /// Comma-separated regions (defaults to STOCKLOAN_REGIONS or all)
        #[arg(short, long, value_delimiter = ',')]
        regions: Vec<Region>,
    },

    /// Fetch and parse without touching the database
    Fetch {
        /// Comma-separated regions (defaults to STOCKLOAN_REGIONS or all)
        #[arg(short, long, value_delimiter = ',')]
        regions: Vec<Region>,

        /// Print records to stdout as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Create the stock_loan table
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("stockloan-ingest")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env()?;

    match cli.command {
        Command::Run { regions } => {
            override_regions(&mut config, regions)?;

            let pipeline = StockLoanPipeline::from_config(&config)
                .await
                .context("Failed to set up pipeline")?;
            let report = pipeline.run().await?;

            info!(
                "Stored {} of {} records from {} regions",
                report.inserted,
                report.records,
                report.regions.len()
            );
        },
        Command::Fetch { regions, json } => {
            override_regions(&mut config, regions)?;

            let outcome = fetch_regions(
                SuppaFtpConnector::new(config.ftp_config()),
                config.retry_policy(),
                config.regions.clone(),
            )
            .await?;

            if json {
                let mut out = std::io::BufWriter::new(std::io::stdout().lock());
                for record in &outcome.records {
                    serde_json::to_writer(&mut out, record)?;
                    out.write_all(b"\n")?;
                }
                out.flush()?;
            }

            info!("Fetched {} records", outcome.records.len());
        },
        Command::Migrate => {
            let db = PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            run_migrations(&db).await?;
        },
    }

    Ok(())
}

fn override_regions(config: &mut IngestConfig, regions: Vec<Region>) -> Result<()> {
    if !regions.is_empty() {
        config.regions = regions;
        config.validate()?;
    }
    Ok(())
}
