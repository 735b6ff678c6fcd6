//! Stock-loan availability records

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::region::Region;

/// One row of a region file, normalized
///
/// `fee_rate` and `rebate_rate` are `NaN` when the file reports `NA`. That is
/// stored as `NUMERIC 'NaN'`, which keeps "not reported" apart from both zero
/// and `NULL`.
#[derive(Debug, Clone, Serialize)]
pub struct LoanAvailability {
    pub symbol: String,
    /// Batch timestamp from the file header, shared by the whole file
    pub timestamp: NaiveDateTime,
    pub region: Region,
    pub currency: String,
    pub isin: String,
    pub name: String,
    pub fee_rate: f64,
    pub rebate_rate: f64,
    pub available: i64,
}
