//! Pipeline orchestration
//!
//! A run fetches every configured region on a blocking worker thread, then
//! hands the whole batch to the sink in a single call. Any error ends the run
//! before anything is loaded.

use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::time::{Duration, Instant};
use stockloan_common::timing::{StageTimer, StageTiming};
use tracing::info;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::fetcher::{FetchOutcome, RegionFetcher};
use crate::ftp::{Connector, SuppaFtpConnector};
use crate::region::Region;
use crate::retry::RetryPolicy;
use crate::storage::{BatchSink, PgBatchLoader};

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub regions: Vec<Region>,
    pub records: usize,
    pub inserted: u64,
    pub timings: Vec<StageTiming>,
}

/// Fetch and parse `regions` on the blocking thread pool
pub async fn fetch_regions<C>(
    connector: C,
    policy: RetryPolicy,
    regions: Vec<Region>,
) -> Result<FetchOutcome>
where
    C: Connector + 'static,
{
    tokio::task::spawn_blocking(move || RegionFetcher::new(connector, policy).fetch_all(&regions))
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))?
}

pub struct StockLoanPipeline<C, S> {
    connector: C,
    sink: S,
    policy: RetryPolicy,
    regions: Vec<Region>,
    setup: Vec<StageTiming>,
}

impl StockLoanPipeline<SuppaFtpConnector, PgBatchLoader> {
    /// Connect the database pool and wire up the FTP connector
    pub async fn from_config(config: &IngestConfig) -> Result<Self> {
        let mut timer = StageTimer::new();

        let db = timer
            .time_async(
                "construct",
                PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
                    .connect(&config.database.url),
            )
            .await?;

        let mut pipeline = Self::new(
            SuppaFtpConnector::new(config.ftp_config()),
            PgBatchLoader::with_chunk_size(db, config.insert_chunk_size),
            config.retry_policy(),
            config.regions.clone(),
        );
        pipeline.setup = timer.into_timings();
        Ok(pipeline)
    }
}

impl<C, S> StockLoanPipeline<C, S>
where
    C: Connector + Clone + 'static,
    S: BatchSink,
{
    pub fn new(connector: C, sink: S, policy: RetryPolicy, regions: Vec<Region>) -> Self {
        Self {
            connector,
            sink,
            policy,
            regions,
            setup: Vec::new(),
        }
    }

    /// Timings recorded while building the pipeline, e.g. `construct`
    pub fn setup_timings(&self) -> &[StageTiming] {
        &self.setup
    }

    /// Fetch and parse `regions` without loading anything
    pub async fn fetch(&self, regions: &[Region]) -> Result<FetchOutcome> {
        fetch_regions(self.connector.clone(), self.policy.clone(), regions.to_vec()).await
    }

    /// Fetch every configured region and load the batch in one call
    pub async fn run(&self) -> Result<PipelineReport> {
        let started = Instant::now();
        let mut timer = StageTimer::new();
        timer.absorb(self.setup.iter().cloned());

        info!(
            regions = self.regions.len(),
            "Starting stock loan update for {:?}", self.regions
        );

        let outcome = timer.time_async("fetch", self.fetch(&self.regions)).await?;
        timer.absorb(outcome.timings);
        let records = outcome.records;
        info!("Fetched {} records", records.len());

        let inserted = timer
            .time_async("load", self.sink.insert_batch(&records))
            .await?;

        timer.record("update", started.elapsed());
        info!(records = records.len(), inserted, "Update successful");

        Ok(PipelineReport {
            regions: self.regions.clone(),
            records: records.len(),
            inserted,
            timings: timer.into_timings(),
        })
    }
}
