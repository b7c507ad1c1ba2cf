//! Market data source port trait.

use crate::domain::error::TrendError;
use crate::domain::price::RawPriceRow;
use chrono::NaiveDate;

pub trait FetchPort {
    /// Daily rows for `symbol` within `[start_date, end_date]`, ascending by
    /// date. Gaps are allowed, repeated dates are not.
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawPriceRow>, TrendError>;
}
