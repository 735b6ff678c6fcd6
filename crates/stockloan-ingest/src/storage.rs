//! Bulk loading into the `stock_loan` table
//!
//! A batch goes in as one transaction of multi-row `INSERT`s; it either lands
//! in full or not at all. Rows are appended, never upserted, so loading the
//! same batch twice stores it twice.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::LoanAvailability;

/// Default number of rows per `INSERT` statement.
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 5000;

/// Bound parameters per row
const COLUMNS_PER_ROW: usize = 9;

/// Largest chunk that stays under the Postgres limit of 65535 bind parameters.
pub const MAX_INSERT_CHUNK_SIZE: usize = u16::MAX as usize / COLUMNS_PER_ROW;

/// Destination for a fetched batch
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Store every record or none; returns the number of rows written
    async fn insert_batch(&self, records: &[LoanAvailability]) -> Result<u64>;
}

/// [`BatchSink`] writing to Postgres
#[derive(Debug, Clone)]
pub struct PgBatchLoader {
    db: PgPool,
    chunk_size: usize,
}

impl PgBatchLoader {
    pub fn new(db: PgPool) -> Self {
        Self::with_chunk_size(db, DEFAULT_INSERT_CHUNK_SIZE)
    }

    /// Create a loader with a custom chunk size, clamped to `1..=MAX_INSERT_CHUNK_SIZE`
    pub fn with_chunk_size(db: PgPool, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.clamp(1, MAX_INSERT_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn insert_chunk(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        records: &[LoanAvailability],
    ) -> Result<u64> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO stock_loan (
                symbol,
                timestamp,
                country,
                currency,
                isin,
                name,
                feerate,
                rebaterate,
                available
            )
            "#,
        );

        query_builder.push_values(records, |mut b, record| {
            b.push_bind(&record.symbol)
                .push_bind(record.timestamp)
                .push_bind(record.region.as_str())
                .push_bind(&record.currency)
                .push_bind(&record.isin)
                .push_bind(&record.name)
                .push_bind(record.fee_rate)
                .push_bind(record.rebate_rate)
                .push_bind(record.available);
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BatchSink for PgBatchLoader {
    async fn insert_batch(&self, records: &[LoanAvailability]) -> Result<u64> {
        if records.is_empty() {
            info!("No records to store");
            return Ok(0);
        }

        info!("Storing {} stock loan records", records.len());

        let total_chunks = records.len().div_ceil(self.chunk_size);
        let mut tx = self.db.begin().await?;
        let mut inserted = 0;

        for (chunk_idx, chunk) in records.chunks(self.chunk_size).enumerate() {
            debug!(
                "Storing chunk {} / {} ({} records)",
                chunk_idx + 1,
                total_chunks,
                chunk.len()
            );
            inserted += self.insert_chunk(&mut tx, chunk).await?;
        }

        tx.commit().await?;

        info!("Successfully stored {} records", inserted);
        Ok(inserted)
    }
}

/// Create the `stock_loan` table if it is missing
pub async fn run_migrations(db: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(db).await?;
    info!("Database migrations applied");
    Ok(())
}
