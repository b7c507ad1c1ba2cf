//! Raw and persisted daily price rows.

use crate::domain::key::CompositeKey;
use chrono::NaiveDate;

/// One daily row as handed over by a fetch source, before keying.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPriceRow {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
}

/// One persisted row per (instrument, trading date).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub key: CompositeKey,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub symbol: String,
}

impl PriceRecord {
    /// Keys a raw row for `symbol`.
    pub fn from_raw(
        symbol: &str,
        row: &RawPriceRow,
    ) -> Result<Self, crate::domain::error::TrendError> {
        let key = crate::domain::key::derive_key(symbol, row.date)?;
        Ok(Self {
            key,
            date: row.date,
            open: row.open,
            close: row.close,
            symbol: symbol.to_string(),
        })
    }
}
