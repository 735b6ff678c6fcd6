//! Error types for stock-loan ingestion

use suppaftp::FtpError;
use thiserror::Error;

use crate::region::Region;
use crate::retry::{RetryError, Retryable};

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Terminal failure of a pipeline run
///
/// Every variant aborts the whole run; nothing is loaded.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{operation} still failing after {attempts} attempts: {source}")]
    TransportExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("{operation} failed and cannot be retried: {source}")]
    Transport {
        operation: String,
        #[source]
        source: TransportError,
    },

    #[error("Malformed header in {region} file: {reason}")]
    HeaderParse { region: Region, reason: String },

    #[error("Malformed row in {region} file at line {line} ({field}): {reason}")]
    RowParse {
        region: Region,
        line: u64,
        field: &'static str,
        reason: String,
    },

    #[error("Bulk insert failed: {0}")]
    LoadFailure(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch worker failed: {0}")]
    Worker(String),
}

impl IngestError {
    pub(crate) fn from_retry(operation: impl Into<String>, err: RetryError<TransportError>) -> Self {
        let operation = operation.into();
        match err {
            RetryError::Exhausted { attempts, last } => IngestError::TransportExhausted {
                operation,
                attempts,
                source: last,
            },
            RetryError::Fatal { error, .. } => IngestError::Transport {
                operation,
                source: error,
            },
        }
    }
}

/// Failure of a single FTP operation
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("could not reach server: {0}")]
    Connect(String),

    #[error("connection lost: {0}")]
    Io(#[from] std::io::Error),

    #[error("server replied {code}: {message}")]
    Rejected { code: u32, message: String },

    #[error("login rejected: {0}")]
    NotLoggedIn(String),

    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// FTP reply code for "not logged in"
const NOT_LOGGED_IN: u32 = 530;

impl TransportError {
    /// Whether the control connection is unusable after this error
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_) | TransportError::Io(_) | TransportError::Protocol(_)
        ) || matches!(self, TransportError::Rejected { code: 421, .. })
    }
}

impl Retryable for TransportError {
    /// Network trouble and 4xx replies (transient negative completion) are
    /// worth another attempt. 5xx replies, rejected credentials and bad
    /// addresses will fail the same way every time.
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Io(_) | TransportError::Protocol(_) => {
                true
            },
            TransportError::Rejected { code, .. } => (400..500).contains(code),
            TransportError::NotLoggedIn(_) | TransportError::InvalidAddress(_) => false,
        }
    }
}

impl From<FtpError> for TransportError {
    #[allow(unreachable_patterns)]
    fn from(err: FtpError) -> Self {
        match err {
            FtpError::ConnectionError(e) => TransportError::Io(e),
            FtpError::UnexpectedResponse(response) => {
                let code = response.status.code();
                let message = String::from_utf8_lossy(&response.body).trim().to_string();
                if code == NOT_LOGGED_IN {
                    TransportError::NotLoggedIn(message)
                } else {
                    TransportError::Rejected { code, message }
                }
            },
            FtpError::BadResponse => {
                TransportError::Protocol("malformed reply from server".to_string())
            },
            FtpError::InvalidAddress(e) => TransportError::InvalidAddress(e.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}
