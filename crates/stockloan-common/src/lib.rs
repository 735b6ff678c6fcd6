//! Stockloan Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the stock-loan ingestion workspace.
//!
//! - **Logging**: one-shot `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Timing**: [`timing::StageTimer`] records and logs how long each pipeline stage took
//! - **Errors**: [`CommonError`] for the two modules above
//!
//! # Example
//!
//! ```no_run
//! use stockloan_common::logging::{init_logging, LogConfig};
//! use stockloan_common::timing::StageTimer;
//!
//! fn main() -> stockloan_common::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!
//!     let mut timer = StageTimer::new();
//!     let sum: u64 = timer.time("sum", || (1..=10).sum());
//!     assert_eq!(sum, 55);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod timing;

pub use error::{CommonError, Result};
