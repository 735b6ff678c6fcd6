//! Region file parser
//!
//! # File Format
//!
//! ```text
//! #BOF|2024.01.05|09:30:02
//! #SYM|CUR|NAME|CON|ISIN|REBATERATE|FEERATE|AVAILABLE|
//! AAPL|USD|APPLE INC|265598|US0378331005|5.0711|0.25|>10000000|
//! XYZ|USD|XYZ CORP|123456|US0000000001|NA|NA|2000|
//! #EOF|2
//! ```
//!
//! - line 1: batch timestamp, date in field 1 and time in field 2 (only `HH:MM` is kept)
//! - line 2: field names for the body
//! - data rows, pipe-delimited, sometimes with a trailing `|`
//! - a trailer row, which is always dropped
//!
//! `NA` rates become `NaN` and the `>` marker is stripped from `AVAILABLE`.
//! Columns are looked up by name, extra ones are ignored.

use chrono::NaiveDateTime;
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use std::io::BufRead;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::models::LoanAvailability;
use crate::region::Region;

/// Marker for a rate the source does not report
pub const NOT_AVAILABLE: &str = "NA";

const SYMBOL: &str = "#SYM";
const CURRENCY: &str = "CUR";
const ISIN: &str = "ISIN";
const NAME: &str = "NAME";
const FEE_RATE: &str = "FEERATE";
const REBATE_RATE: &str = "REBATERATE";
const AVAILABLE: &str = "AVAILABLE";

/// Parser for one region's availability file
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionFileParser;

impl RegionFileParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a whole region file into records, in file order
    pub fn parse<R: BufRead>(&self, mut reader: R, region: Region) -> Result<Vec<LoanAvailability>> {
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header)?;
        let timestamp = parse_batch_timestamp(&String::from_utf8_lossy(&header), region)?;
        debug!(region = %region, %timestamp, "Parsed batch timestamp");

        let mut body = ReaderBuilder::new()
            .delimiter(b'|')
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let columns = Columns::locate(
            body.byte_headers()
                .map_err(|e| row_error(region, &e, "header", e.to_string()))?,
        );

        let mut rows = Vec::new();
        for row in body.byte_records() {
            rows.push(row.map_err(|e| row_error(region, &e, "row", e.to_string()))?);
        }

        // Trailer row
        rows.pop();

        rows.iter()
            .map(|row| columns.record(row, timestamp, region))
            .collect()
    }
}

/// Combine header fields 1 (`YYYY.MM.DD`) and 2 (`HH:MM...`) into a minute-precision timestamp
pub fn parse_batch_timestamp(line: &str, region: Region) -> Result<NaiveDateTime> {
    let header_error = |reason: String| IngestError::HeaderParse { region, reason };

    let fields: Vec<&str> = line.trim_end().split('|').map(str::trim).collect();

    let date = fields
        .get(1)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| header_error(format!("missing date field in {:?}", line.trim_end())))?;
    let time = fields
        .get(2)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| header_error(format!("missing time field in {:?}", line.trim_end())))?;
    let minutes = time
        .get(..5)
        .ok_or_else(|| header_error(format!("time field too short: {:?}", time)))?;

    NaiveDateTime::parse_from_str(&format!("{}.{}", date, minutes), "%Y.%m.%d.%H:%M")
        .map_err(|e| header_error(format!("invalid date/time {:?} {:?}: {}", date, time, e)))
}

/// `NA` becomes `NaN`, anything else must be a decimal number
pub fn parse_rate(raw: &str) -> std::result::Result<f64, String> {
    let raw = raw.trim();
    if raw == NOT_AVAILABLE {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>()
        .map_err(|e| format!("invalid rate {:?}: {}", raw, e))
}

/// Strip the leading `>` marker and parse a non-negative quantity
pub fn parse_available(raw: &str) -> std::result::Result<i64, String> {
    let digits = raw.trim().trim_start_matches('>').trim();
    let quantity = digits
        .parse::<i64>()
        .map_err(|e| format!("invalid quantity {:?}: {}", raw, e))?;
    if quantity < 0 {
        return Err(format!("negative quantity {}", quantity));
    }
    Ok(quantity)
}

fn row_error(region: Region, err: &csv::Error, field: &'static str, reason: String) -> IngestError {
    IngestError::RowParse {
        region,
        // Body line numbers are offset by the timestamp line
        line: err.position().map(|p| p.line() + 1).unwrap_or(0),
        field,
        reason,
    }
}

/// Positions of the columns we read
struct Columns {
    symbol: Option<usize>,
    currency: Option<usize>,
    isin: Option<usize>,
    name: Option<usize>,
    fee_rate: Option<usize>,
    rebate_rate: Option<usize>,
    available: Option<usize>,
}

impl Columns {
    fn locate(headers: &ByteRecord) -> Self {
        let names = StringRecord::from_byte_record_lossy(headers.clone());
        let find = |wanted: &str| names.iter().position(|h| h.trim() == wanted);

        Self {
            symbol: find(SYMBOL),
            currency: find(CURRENCY),
            isin: find(ISIN),
            name: find(NAME),
            fee_rate: find(FEE_RATE),
            rebate_rate: find(REBATE_RATE),
            available: find(AVAILABLE),
        }
    }

    fn record(
        &self,
        row: &ByteRecord,
        timestamp: NaiveDateTime,
        region: Region,
    ) -> Result<LoanAvailability> {
        let line = row.position().map(|p| p.line() + 1).unwrap_or(0);
        let invalid = |field: &'static str, reason: String| IngestError::RowParse {
            region,
            line,
            field,
            reason,
        };
        let get = |index: Option<usize>, field: &'static str| {
            index
                .and_then(|i| row.get(i))
                .map(String::from_utf8_lossy)
                .ok_or_else(|| invalid(field, "missing field".to_string()))
        };

        Ok(LoanAvailability {
            symbol: get(self.symbol, SYMBOL)?.trim().to_string(),
            timestamp,
            region,
            currency: get(self.currency, CURRENCY)?.trim().to_string(),
            isin: get(self.isin, ISIN)?.trim().to_string(),
            name: get(self.name, NAME)?.trim().to_string(),
            fee_rate: parse_rate(&get(self.fee_rate, FEE_RATE)?)
                .map_err(|reason| invalid(FEE_RATE, reason))?,
            rebate_rate: parse_rate(&get(self.rebate_rate, REBATE_RATE)?)
                .map_err(|reason| invalid(REBATE_RATE, reason))?,
            available: parse_available(&get(self.available, AVAILABLE)?)
                .map_err(|reason| invalid(AVAILABLE, reason))?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    const USA_FILE: &str = "#BOF|2024.01.05|09:30:02\n\
#SYM|CUR|NAME|CON|ISIN|REBATERATE|FEERATE|AVAILABLE|\n\
AAPL|USD|APPLE INC|265598|US0378331005|5.0711|0.25|>10000000|\n\
XYZ|USD|XYZ CORP|123456|US0000000001|NA|NA|2000|\n\
#EOF|2\n";

    fn parse(text: &str) -> Result<Vec<LoanAvailability>> {
        RegionFileParser::new().parse(Cursor::new(text.as_bytes()), Region::Usa)
    }

    #[test]
    fn test_parse_file_with_trailer() {
        let records = parse(USA_FILE).unwrap();
        assert_eq!(records.len(), 2);

        let expected_ts = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();

        let aapl = &records[0];
        assert_eq!(aapl.symbol, "AAPL");
        assert_eq!(aapl.timestamp, expected_ts);
        assert_eq!(aapl.region, Region::Usa);
        assert_eq!(aapl.currency, "USD");
        assert_eq!(aapl.isin, "US0378331005");
        assert_eq!(aapl.name, "APPLE INC");
        assert_eq!(aapl.fee_rate, 0.25);
        assert_eq!(aapl.rebate_rate, 5.0711);
        assert_eq!(aapl.available, 10_000_000);

        let xyz = &records[1];
        assert!(xyz.fee_rate.is_nan());
        assert!(xyz.rebate_rate.is_nan());
        assert_eq!(xyz.available, 2000);
        assert_eq!(xyz.timestamp, expected_ts);
    }

    #[test]
    fn test_crlf_line_endings() {
        let records = parse(&USA_FILE.replace('\n', "\r\n")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].available, 2000);
    }

    #[test]
    fn test_only_trailer_yields_no_records() {
        let text = "#BOF|2024.01.05|09:30:02\n#SYM|CUR|NAME|ISIN|REBATERATE|FEERATE|AVAILABLE\n#EOF|0\n";
        assert!(parse(text).unwrap().is_empty());
    }

    #[test]
    fn test_header_only_yields_no_records() {
        assert!(parse("#BOF|2024.01.05|09:30:02\n").unwrap().is_empty());
    }

    #[test]
    fn test_batch_timestamp_drops_seconds() {
        let ts = parse_batch_timestamp("#BOF|2023.12.31|23:59:59.123\r\n", Region::Japan).unwrap();
        assert_eq!(
            ts,
            NaiveDate::from_ymd_opt(2023, 12, 31)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_header_errors() {
        let malformed = [
            "#BOF\n",
            "#BOF|2024.01.05\n",
            "#BOF|2024.01.05|9:3\n",
            "#BOF|05/01/2024|09:30:00\n",
            "",
        ];
        for line in malformed {
            assert!(
                matches!(
                    parse_batch_timestamp(line, Region::Usa),
                    Err(IngestError::HeaderParse { region: Region::Usa, .. })
                ),
                "expected header error for {:?}",
                line
            );
        }
    }

    #[test]
    fn test_missing_field_is_row_error() {
        let text = "#BOF|2024.01.05|09:30:02\n\
#SYM|CUR|NAME|ISIN|REBATERATE|FEERATE|AVAILABLE\n\
SHORT|USD|SHORT ROW\n\
#EOF|1\n";

        match parse(text) {
            Err(IngestError::RowParse { field, line, .. }) => {
                assert_eq!(field, ISIN);
                assert_eq!(line, 3);
            },
            other => panic!("expected row error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_is_row_error() {
        let text = "#BOF|2024.01.05|09:30:02\n\
#SYM|CUR|NAME|ISIN|FEERATE|AVAILABLE\n\
ABC|USD|ABC CORP|US0000000002|0.3|100\n\
#EOF|1\n";

        assert!(matches!(
            parse(text),
            Err(IngestError::RowParse { field: REBATE_RATE, .. })
        ));
    }

    #[test]
    fn test_garbage_rate_is_row_error() {
        let text = "#BOF|2024.01.05|09:30:02\n\
#SYM|CUR|NAME|ISIN|REBATERATE|FEERATE|AVAILABLE\n\
ABC|USD|ABC CORP|US0000000002|n/a|0.3|100\n\
#EOF|1\n";

        assert!(matches!(
            parse(text),
            Err(IngestError::RowParse { field: REBATE_RATE, .. })
        ));
    }

    #[test]
    fn test_parse_rate() {
        assert!(parse_rate("NA").unwrap().is_nan());
        assert_eq!(parse_rate(" 1.25 ").unwrap(), 1.25);
        assert_eq!(parse_rate("-0.5").unwrap(), -0.5);
        assert!(parse_rate("").is_err());
    }

    #[test]
    fn test_parse_available() {
        assert_eq!(parse_available(">1000").unwrap(), 1000);
        assert_eq!(parse_available("50").unwrap(), 50);
        assert_eq!(parse_available("0").unwrap(), 0);
        assert!(parse_available("-5").is_err());
        assert!(parse_available("lots").is_err());
    }

    #[test]
    fn test_non_utf8_name_is_kept_lossily() {
        let mut bytes = b"#BOF|2024.01.05|09:30:02\n#SYM|CUR|NAME|ISIN|REBATERATE|FEERATE|AVAILABLE\nSAN|EUR|BANCO ".to_vec();
        bytes.push(0xD1); // latin-1 N with tilde
        bytes.extend_from_slice(b"|ES0113900J37|NA|0.25|>500000\n#EOF|1\n");

        let records = RegionFileParser::new()
            .parse(Cursor::new(bytes), Region::Spain)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].name.starts_with("BANCO "));
        assert_eq!(records[0].region, Region::Spain);
    }
}
