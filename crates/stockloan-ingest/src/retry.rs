//! Bounded retry with a constant interval
//!
//! [`RetryPolicy::run`] wraps any fallible zero-argument operation. Whether a
//! failure is worth another attempt is decided by the error itself through
//! [`Retryable`]; fatal errors are returned on the spot.
//!
//! Sleeps are blocking. The policy is meant for synchronous transport code
//! running on a blocking worker thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default pause between attempts (in seconds)
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 2;

/// Classifies an error as transient or permanent
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Pauses between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error ended the loop early
    Fatal { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Fatal { attempts, .. } => {
                *attempts
            },
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal { error, .. } => error,
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        )
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper, e.g. with one that only records requested pauses
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `op` until it succeeds, fails fatally, or `max_retries` retries
    /// have been spent (at most `max_retries + 1` attempts in total).
    ///
    /// K retryable failures followed by a success cost exactly K sleeps.
    pub fn run<T, E, F>(&self, operation: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Retryable + fmt::Display,
    {
        let mut retries = 0u32;

        loop {
            match op() {
                Ok(value) => {
                    if retries > 0 {
                        debug!(operation, retries, "Operation succeeded after retrying");
                    }
                    return Ok(value);
                },
                Err(e) if !e.is_retryable() => {
                    error!(operation, error = %e, "Operation failed with a non-retryable error");
                    return Err(RetryError::Fatal {
                        attempts: retries + 1,
                        error: e,
                    });
                },
                Err(e) if retries >= self.max_retries => {
                    error!(
                        operation,
                        attempts = retries + 1,
                        error = %e,
                        "Operation failed, retry budget exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: retries + 1,
                        last: e,
                    });
                },
                Err(e) => {
                    retries += 1;
                    warn!(
                        operation,
                        retry = retries,
                        max_retries = self.max_retries,
                        error = %e,
                        "Operation failed. Retrying in {:?}...",
                        self.interval
                    );
                    self.sleeper.sleep(self.interval);
                },
            }
        }
    }
}
