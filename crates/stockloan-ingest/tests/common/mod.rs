//! Common test utilities for stockloan-ingest integration tests
//!
//! - [`ScriptedConnector`]: in-memory FTP server with scripted failures
//! - [`RecordingSink`]: captures every batch handed to the loader
//! - [`TestPostgres`]: PostgreSQL container with migrations applied

#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockloan_ingest::ftp::{Connector, FtpSession};
use stockloan_ingest::{BatchSink, LoanAvailability, RetryPolicy, Sleeper, TransportError};
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

// ============================================================================
// Region files
// ============================================================================

pub const FIELD_NAMES: &str = "#SYM|CUR|ISIN|NAME|FEERATE|REBATERATE|AVAILABLE";

/// Build a region file: timestamp header, field names, `rows`, trailer
pub fn region_file(date: &str, time: &str, rows: &[&str]) -> String {
    let mut text = format!("#BOF|{}|{}\n{}\n", date, time, FIELD_NAMES);
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text.push_str(&format!("#EOF|{}\n", rows.len()));
    text
}

// ============================================================================
// Scripted FTP server
// ============================================================================

#[derive(Default)]
pub struct Script {
    files: HashMap<String, Vec<u8>>,
    connect_failures: VecDeque<TransportError>,
    retrieve_failures: VecDeque<TransportError>,
    refuse_all: bool,
    connects: u32,
    quits: u32,
    retrieved: Vec<String>,
}

/// [`Connector`] serving files from memory
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

pub struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn with_files(files: &[(&str, String)]) -> Self {
        let connector = Self::default();
        connector.script.lock().unwrap().files = files
            .iter()
            .map(|(name, body)| (name.to_string(), body.clone().into_bytes()))
            .collect();
        connector
    }

    /// Queue a failure for the next connect attempt
    pub fn fail_connect(&self, error: TransportError) {
        self.script.lock().unwrap().connect_failures.push_back(error);
    }

    /// Queue a failure for the next RETR
    pub fn fail_retrieve(&self, error: TransportError) {
        self.script.lock().unwrap().retrieve_failures.push_back(error);
    }

    /// Refuse every connection from now on
    pub fn go_offline(&self) {
        self.script.lock().unwrap().refuse_all = true;
    }

    pub fn connects(&self) -> u32 {
        self.script.lock().unwrap().connects
    }

    pub fn quits(&self) -> u32 {
        self.script.lock().unwrap().quits
    }

    pub fn retrieved(&self) -> Vec<String> {
        self.script.lock().unwrap().retrieved.clone()
    }
}

impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    fn connect(&self) -> std::result::Result<ScriptedSession, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        if script.refuse_all {
            return Err(refused());
        }
        if let Some(error) = script.connect_failures.pop_front() {
            return Err(error);
        }
        Ok(ScriptedSession {
            script: self.script.clone(),
        })
    }

    fn endpoint(&self) -> String {
        "scripted:21".to_string()
    }
}

impl FtpSession for ScriptedSession {
    fn retrieve(&mut self, path: &str) -> std::result::Result<Vec<u8>, TransportError> {
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.retrieve_failures.pop_front() {
            return Err(error);
        }
        script.retrieved.push(path.to_string());
        script
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::Rejected {
                code: 550,
                message: format!("{}: No such file or directory", path),
            })
    }

    fn quit(&mut self) -> std::result::Result<(), TransportError> {
        self.script.lock().unwrap().quits += 1;
        Ok(())
    }
}

pub fn refused() -> TransportError {
    TransportError::Connect("connection refused".to_string())
}

pub fn connection_reset() -> TransportError {
    TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

// ============================================================================
// Retry timing
// ============================================================================

/// Records requested pauses instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

pub fn instant_policy(max_retries: u32) -> (RetryPolicy, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let policy =
        RetryPolicy::new(max_retries, Duration::from_secs(2)).with_sleeper(sleeper.clone());
    (policy, sleeper)
}

// ============================================================================
// Batch sink
// ============================================================================

/// [`BatchSink`] keeping every batch in memory
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<LoanAvailability>>>>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<Vec<LoanAvailability>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchSink for RecordingSink {
    async fn insert_batch(&self, records: &[LoanAvailability]) -> stockloan_ingest::Result<u64> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(records.len() as u64)
    }
}

/// [`BatchSink`] whose database is always unavailable
pub struct FailingSink;

#[async_trait]
impl BatchSink for FailingSink {
    async fn insert_batch(&self, _records: &[LoanAvailability]) -> stockloan_ingest::Result<u64> {
        Err(sqlx::Error::PoolTimedOut.into())
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the `stock_loan` table created
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        stockloan_ingest::storage::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

/// Initialize tracing for tests
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,stockloan_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}
