#![allow(dead_code)]

use chrono::NaiveDate;
use closetrend::domain::error::TrendError;
use closetrend::domain::price::RawPriceRow;
use closetrend::ports::fetch_port::FetchPort;
use std::cell::Cell;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub struct MockFetchPort {
    pub data: HashMap<String, Vec<RawPriceRow>>,
    pub errors: HashMap<String, String>,
    pub calls: Cell<usize>,
}

impl MockFetchPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            calls: Cell::new(0),
        }
    }

    pub fn with_rows(mut self, symbol: &str, rows: Vec<RawPriceRow>) -> Self {
        self.data.insert(symbol.to_string(), rows);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl FetchPort for MockFetchPort {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawPriceRow>, TrendError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TrendError::Fetch {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.date >= start_date && r.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_row(date_str: &str, close: f64) -> RawPriceRow {
    RawPriceRow {
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: Some(close - 1.0),
        close: Some(close),
    }
}

pub fn make_gap_row(date_str: &str) -> RawPriceRow {
    RawPriceRow {
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: None,
        close: None,
    }
}

/// Consecutive January 2024 rows, one per close.
pub fn make_rows(closes: &[f64]) -> Vec<RawPriceRow> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_row(&format!("2024-01-{:02}", i + 1), c))
        .collect()
}

pub fn write_price_csv(dir: &Path, symbol: &str, rows: &[(&str, f64)]) {
    let mut file = std::fs::File::create(dir.join(format!("{symbol}.csv"))).unwrap();
    writeln!(file, "Date,Open,High,Low,Close,Volume").unwrap();
    for (d, close) in rows {
        writeln!(file, "{d},{close},{close},{close},{close},1000").unwrap();
    }
}
