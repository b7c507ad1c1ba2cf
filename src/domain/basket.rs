//! The configured basket of instruments.
//!
//! Parses symbol lists from configuration or the command line.

use chrono::NaiveDate;
use std::collections::HashSet;

pub const DEFAULT_BASKET: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "BRK-A", "JPM", "JNJ", "V", "UNH", "PG",
    "NVDA", "HD", "MA", "PYPL", "DIS", "INTC", "CMCSA", "XOM",
];

pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    pub codes: Vec<String>,
}

impl Basket {
    pub fn default_basket() -> Self {
        Self {
            codes: DEFAULT_BASKET.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BasketError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

impl From<BasketError> for crate::domain::error::TrendError {
    fn from(err: BasketError) -> Self {
        crate::domain::error::TrendError::ConfigInvalid {
            section: "ingest".into(),
            key: "codes".into(),
            reason: err.to_string(),
        }
    }
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, BasketError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(BasketError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(BasketError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}
