//! Region file fetcher
//!
//! Downloads `<region>.txt` for each configured region over a single FTP
//! session and parses each buffer as soon as it arrives. Any failure aborts the
//! whole fetch; records from regions already parsed are discarded with it.

use std::io::Cursor;
use stockloan_common::timing::{StageTimer, StageTiming};
use tracing::info;

use crate::error::Result;
use crate::ftp::{Connector, RetryingTransport};
use crate::models::LoanAvailability;
use crate::parser::RegionFileParser;
use crate::region::Region;
use crate::retry::RetryPolicy;

/// Records of one fetch, in region order then file order
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<LoanAvailability>,
    /// One `parse <region>` entry per file
    pub timings: Vec<StageTiming>,
}

/// Blocking fetcher; build one per run
pub struct RegionFetcher<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    parser: RegionFileParser,
}

impl<C: Connector> RegionFetcher<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            parser: RegionFileParser::new(),
        }
    }

    /// Fetch and parse every region in order, reusing one session
    pub fn fetch_all(self, regions: &[Region]) -> Result<FetchOutcome> {
        let Self {
            connector,
            policy,
            parser,
        } = self;

        let mut transport = RetryingTransport::new(connector, policy);
        transport.connect()?;

        let mut timer = StageTimer::new();
        let mut records = Vec::new();

        for &region in regions {
            let mut buffer = Cursor::new(transport.retrieve(&region.file_name())?);
            let bytes = buffer.get_ref().len();

            let parsed = timer.time(format!("parse {}", region), || {
                parser.parse(&mut buffer, region)
            })?;

            info!(
                region = %region,
                bytes,
                records = parsed.len(),
                "Parsed region file"
            );
            records.extend(parsed);
        }

        Ok(FetchOutcome {
            records,
            timings: timer.into_timings(),
        })
    }
}
