//! Keyed price table port trait.

use crate::domain::error::TrendError;
use crate::domain::key::CompositeKey;
use crate::domain::price::PriceRecord;
use chrono::NaiveDate;

pub trait RecordStore {
    /// Insert or overwrite by composite key. Returns the number of rows written.
    fn upsert(&self, records: &[PriceRecord]) -> Result<usize, TrendError>;

    /// All rows ordered by (symbol, date), optionally restricted to `symbols`.
    fn read_ordered(&self, symbols: Option<&[String]>) -> Result<Vec<PriceRecord>, TrendError>;

    fn get(&self, key: CompositeKey) -> Result<Option<PriceRecord>, TrendError>;

    fn count(&self) -> Result<usize, TrendError>;

    fn list_symbols(&self) -> Result<Vec<String>, TrendError>;

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendError>;
}
