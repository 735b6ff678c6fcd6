//! Stock Loan Ingest Library
//!
//! Downloads the daily stock-loan availability files published per region on
//! an FTP server, parses them into [`LoanAvailability`] records and appends the
//! whole batch to the `stock_loan` table in one transaction.
//!
//! # Example
//!
//! ```no_run
//! use stockloan_ingest::{IngestConfig, StockLoanPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pipeline = StockLoanPipeline::from_config(&config).await?;
//!     let report = pipeline.run().await?;
//!     println!("stored {} records", report.inserted);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod fetcher;
pub mod ftp;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod region;
pub mod retry;
pub mod storage;

pub use config::IngestConfig;
pub use error::{IngestError, Result, TransportError};
pub use fetcher::{FetchOutcome, RegionFetcher};
pub use models::LoanAvailability;
pub use parser::RegionFileParser;
pub use pipeline::{fetch_regions, PipelineReport, StockLoanPipeline};
pub use region::Region;
pub use retry::{RetryPolicy, Retryable, Sleeper};
pub use storage::{BatchSink, PgBatchLoader};
