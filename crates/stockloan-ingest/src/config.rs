//! Configuration management

use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::ftp::{
    FtpConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FTP_HOST, DEFAULT_FTP_USERNAME,
    DEFAULT_READ_TIMEOUT_SECS,
};
use crate::region::Region;
use crate::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL_SECS};
use crate::storage::{DEFAULT_INSERT_CHUNK_SIZE, MAX_INSERT_CHUNK_SIZE};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default FTP control port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/stockloan";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub ftp: FtpSettings,
    pub database: DatabaseConfig,
    pub regions: Vec<Region>,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub insert_chunk_size: usize,
}

/// FTP endpoint and credentials
#[derive(Clone, Serialize)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip)]
    pub password: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl std::fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ftp: FtpSettings {
                host: DEFAULT_FTP_HOST.to_string(),
                port: DEFAULT_FTP_PORT,
                username: DEFAULT_FTP_USERNAME.to_string(),
                password: String::new(),
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            regions: Region::ALL.to_vec(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment (and `.env`) over the defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            ftp: FtpSettings {
                host: env_or("STOCKLOAN_FTP_HOST", defaults.ftp.host),
                port: env_parse("STOCKLOAN_FTP_PORT", defaults.ftp.port)?,
                username: env_or("STOCKLOAN_FTP_USERNAME", defaults.ftp.username),
                password: env_or("STOCKLOAN_FTP_PASSWORD", defaults.ftp.password),
                connect_timeout_secs: env_parse(
                    "STOCKLOAN_FTP_CONNECT_TIMEOUT",
                    defaults.ftp.connect_timeout_secs,
                )?,
                read_timeout_secs: env_parse(
                    "STOCKLOAN_FTP_READ_TIMEOUT",
                    defaults.ftp.read_timeout_secs,
                )?,
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", defaults.database.url),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout_secs,
                )?,
            },
            regions: match std::env::var("STOCKLOAN_REGIONS") {
                Ok(list) if !list.trim().is_empty() => Region::parse_list(&list)?,
                _ => defaults.regions,
            },
            max_retries: env_parse("STOCKLOAN_MAX_RETRIES", defaults.max_retries)?,
            retry_interval_secs: env_parse(
                "STOCKLOAN_RETRY_INTERVAL_SECS",
                defaults.retry_interval_secs,
            )?,
            insert_chunk_size: env_parse(
                "STOCKLOAN_INSERT_CHUNK_SIZE",
                defaults.insert_chunk_size,
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ftp.host.trim().is_empty() {
            return Err(IngestError::Config("FTP host cannot be empty".to_string()));
        }

        if self.ftp.port == 0 {
            return Err(IngestError::Config("FTP port must be greater than 0".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(IngestError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.regions.is_empty() {
            return Err(IngestError::Config("At least one region is required".to_string()));
        }

        if self.insert_chunk_size == 0 || self.insert_chunk_size > MAX_INSERT_CHUNK_SIZE {
            return Err(IngestError::Config(format!(
                "Insert chunk size must be between 1 and {}, got {}",
                MAX_INSERT_CHUNK_SIZE, self.insert_chunk_size
            )));
        }

        Ok(())
    }

    pub fn ftp_config(&self) -> FtpConfig {
        FtpConfig {
            host: self.ftp.host.clone(),
            port: self.ftp.port,
            username: self.ftp.username.clone(),
            password: self.ftp.password.clone(),
            connect_timeout: Duration::from_secs(self.ftp.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.ftp.read_timeout_secs),
            ..FtpConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_interval_secs))
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

/// Parse `key` when set; unset or blank keeps the default
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::Config(format!("Invalid {}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}
