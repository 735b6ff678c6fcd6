//! FTP transport with bounded retry
//!
//! [`RetryingTransport`] owns at most one live session. Establishing it and
//! every `RETR` run under the same [`RetryPolicy`]; when a failure leaves the
//! control connection unusable the session is dropped and the next attempt
//! reconnects. The session is closed with `QUIT` when the transport is dropped,
//! whichever way the caller exits.
//!
//! ```rust,ignore
//! use stockloan_ingest::ftp::{FtpConfig, RetryingTransport, SuppaFtpConnector};
//! use stockloan_ingest::retry::RetryPolicy;
//!
//! let connector = SuppaFtpConnector::new(FtpConfig::default());
//! let mut transport = RetryingTransport::new(connector, RetryPolicy::default());
//! transport.connect()?;
//! let bytes = transport.retrieve("usa.txt")?;
//! ```

use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result, TransportError};
use crate::retry::RetryPolicy;

/// Default FTP server publishing the availability files
pub const DEFAULT_FTP_HOST: &str = "ftp3.interactivebrokers.com";

/// Default FTP account
pub const DEFAULT_FTP_USERNAME: &str = "shortstock";

/// Default connect timeout (in seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default socket read timeout (in seconds)
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

/// Configuration for the FTP connection
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Use EPSV instead of PASV for data connections
    pub extended_passive: bool,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FTP_HOST.to_string(),
            port: 21,
            username: DEFAULT_FTP_USERNAME.to_string(),
            password: String::new(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            extended_passive: false,
        }
    }
}

impl FtpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A logged-in FTP session in binary mode
pub trait FtpSession {
    /// Download a whole file
    fn retrieve(&mut self, path: &str) -> std::result::Result<Vec<u8>, TransportError>;

    /// Say goodbye to the server
    fn quit(&mut self) -> std::result::Result<(), TransportError>;
}

/// Opens sessions; one attempt per call, no retry
pub trait Connector: Send {
    type Session: FtpSession;

    fn connect(&self) -> std::result::Result<Self::Session, TransportError>;

    /// Server description for logs and error messages
    fn endpoint(&self) -> String;
}

/// [`Connector`] backed by a blocking `suppaftp::FtpStream`
#[derive(Debug, Clone)]
pub struct SuppaFtpConnector {
    config: FtpConfig,
}

impl SuppaFtpConnector {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

impl Connector for SuppaFtpConnector {
    type Session = SuppaFtpSession;

    fn connect(&self) -> std::result::Result<SuppaFtpSession, TransportError> {
        let config = &self.config;
        debug!("Connecting to FTP server: {}", config.address());

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect(format!("cannot resolve {}: {}", config.host, e)))?
            .next()
            .ok_or_else(|| TransportError::Connect(format!("no address for {}", config.host)))?;

        let mut stream = FtpStream::connect_timeout(addr, config.connect_timeout)?;
        stream.get_ref().set_read_timeout(Some(config.read_timeout))?;

        stream.set_mode(if config.extended_passive {
            Mode::ExtendedPassive
        } else {
            Mode::Passive
        });

        debug!("Logging in as: {}", config.username);
        stream.login(&config.username, &config.password)?;
        stream.transfer_type(FileType::Binary)?;

        Ok(SuppaFtpSession { stream })
    }

    fn endpoint(&self) -> String {
        self.config.address()
    }
}

pub struct SuppaFtpSession {
    stream: FtpStream,
}

impl FtpSession for SuppaFtpSession {
    fn retrieve(&mut self, path: &str) -> std::result::Result<Vec<u8>, TransportError> {
        debug!("Downloading file: {}", path);
        let buffer = self.stream.retr_as_buffer(path)?;
        Ok(buffer.into_inner())
    }

    fn quit(&mut self) -> std::result::Result<(), TransportError> {
        self.stream.quit()?;
        Ok(())
    }
}

/// Session holder applying a [`RetryPolicy`] to connect and retrieve
pub struct RetryingTransport<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    session: Option<C::Session>,
}

impl<C: Connector> RetryingTransport<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Establish the session if there is none yet
    pub fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let connector = &self.connector;
        let operation = format!("connect to {}", connector.endpoint());
        let session = self
            .policy
            .run(&operation, || connector.connect())
            .map_err(|e| IngestError::from_retry(operation.clone(), e))?;

        info!(endpoint = %connector.endpoint(), "FTP session established");
        self.session = Some(session);
        Ok(())
    }

    /// Download `path`, reconnecting between attempts when the session died
    pub fn retrieve(&mut self, path: &str) -> Result<Vec<u8>> {
        let Self {
            connector,
            policy,
            session,
        } = self;
        let operation = format!("RETR {}", path);

        let data = policy
            .run(&operation, || {
                let mut live = match session.take() {
                    Some(live) => live,
                    None => connector.connect()?,
                };

                let result = live.retrieve(path);
                match &result {
                    Err(e) if e.is_connection_lost() => {
                        debug!(error = %e, "Dropping dead FTP session");
                    },
                    _ => *session = Some(live),
                }
                result
            })
            .map_err(|e| IngestError::from_retry(operation.clone(), e))?;

        debug!("Downloaded {} bytes from {}", data.len(), path);
        Ok(data)
    }

    /// Send `QUIT` and forget the session; a no-op when not connected
    pub fn close(&mut self) {
        if let Some(mut live) = self.session.take() {
            if let Err(e) = live.quit() {
                warn!("Failed to quit FTP session gracefully: {}", e);
            }
        }
    }
}

impl<C: Connector> Drop for RetryingTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}
