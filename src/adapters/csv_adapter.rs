//! CSV file price source.
//!
//! One `{SYMBOL}.csv` per instrument with a header row. Columns are found by
//! name (`date`, `open`, `close`, case-insensitive), so vendor exports with
//! extra high/low/volume columns load unchanged.

use crate::domain::error::TrendError;
use crate::domain::key::parse_trading_date;
use crate::domain::price::RawPriceRow;
use crate::ports::fetch_port::FetchPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    pub fn list_symbols(&self) -> Result<Vec<String>, TrendError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();
            if let Some(code) = name_str.strip_suffix(".csv") {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn parse_price(symbol: &str, column: &str, value: Option<&str>) -> Result<Option<f64>, TrendError> {
    let raw = value.unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    let price: f64 = raw.parse().map_err(|e| TrendError::Fetch {
        symbol: symbol.to_string(),
        reason: format!("invalid {} value {:?}: {}", column, raw, e),
    })?;
    if price < 0.0 {
        return Err(TrendError::Fetch {
            symbol: symbol.to_string(),
            reason: format!("negative {} value {}", column, price),
        });
    }
    Ok(Some(price))
}

impl FetchPort for CsvAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawPriceRow>, TrendError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| TrendError::Fetch {
            symbol: symbol.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let fetch_err = |reason: String| TrendError::Fetch {
            symbol: symbol.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| fetch_err(format!("CSV header error: {}", e)))?
            .clone();

        let date_col =
            column_index(&headers, "date").ok_or_else(|| fetch_err("missing date column".into()))?;
        let open_col =
            column_index(&headers, "open").ok_or_else(|| fetch_err("missing open column".into()))?;
        let close_col = column_index(&headers, "close")
            .ok_or_else(|| fetch_err("missing close column".into()))?;

        let mut rows = Vec::new();
        let mut seen = HashSet::new();

        for result in rdr.records() {
            let record = result.map_err(|e| fetch_err(format!("CSV parse error: {}", e)))?;

            let date_str = record.get(date_col).unwrap_or("");
            let date = parse_trading_date(date_str)?;

            if date < start_date || date > end_date {
                continue;
            }
            if !seen.insert(date) {
                return Err(fetch_err(format!("duplicate date {}", date)));
            }

            rows.push(RawPriceRow {
                date,
                open: parse_price(symbol, "open", record.get(open_col))?,
                close: parse_price(symbol, "close", record.get(close_col))?,
            });
        }

        rows.sort_by_key(|r| r.date);
        tracing::debug!(%symbol, rows = rows.len(), path = %path.display(), "read price file");
        Ok(rows)
    }
}
