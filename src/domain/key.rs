//! Instrument ids and composite record keys.
//!
//! An instrument id is SHA-256 of the symbol reduced modulo [`ID_MODULUS`].
//! A composite key is the trading date rendered as `YYYYMMDD` followed by
//! the decimal id, read back as one integer. The date prefix always has
//! exactly eight digits, so distinct (date, id) pairs never share a key.

use crate::domain::error::TrendError;
use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const ID_MODULUS: u64 = 100_000_000;

pub type InstrumentId = u64;
pub type CompositeKey = i64;

pub fn derive_id(symbol: &str) -> Result<InstrumentId, TrendError> {
    if symbol.trim().is_empty() {
        return Err(TrendError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason: "symbol is empty".into(),
        });
    }

    let digest = Sha256::digest(symbol.as_bytes());
    // Big-endian digest mod M, one byte at a time.
    let id = digest
        .iter()
        .fold(0u64, |acc, &b| (acc * 256 + u64::from(b)) % ID_MODULUS);
    Ok(id)
}

/// `YYYYMMDD` for dates whose year renders as four digits.
pub fn format_date_digits(date: NaiveDate) -> Result<String, TrendError> {
    if !(1000..=9999).contains(&date.year()) {
        return Err(TrendError::InvalidDateFormat {
            value: date.to_string(),
        });
    }
    Ok(date.format("%Y%m%d").to_string())
}

pub fn derive_key(symbol: &str, date: NaiveDate) -> Result<CompositeKey, TrendError> {
    let id = derive_id(symbol)?;
    let digits = format_date_digits(date)?;
    format!("{digits}{id}")
        .parse()
        .map_err(|_| TrendError::InvalidDateFormat {
            value: date.to_string(),
        })
}

/// Accepts `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_trading_date(value: &str) -> Result<NaiveDate, TrendError> {
    let trimmed = value.trim();
    let parsed = if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        NaiveDate::parse_from_str(trimmed, "%Y%m%d")
    } else {
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
    };
    parsed.map_err(|_| TrendError::InvalidDateFormat {
        value: value.to_string(),
    })
}

/// Symbol registry that refuses two symbols sharing one instrument id.
#[derive(Debug, Default, Clone)]
pub struct IdRegistry {
    by_id: HashMap<InstrumentId, String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, symbol: &str) -> Result<InstrumentId, TrendError> {
        let id = derive_id(symbol)?;
        match self.by_id.get(&id) {
            Some(existing) if existing != symbol => Err(TrendError::KeyCollision {
                symbol: symbol.to_string(),
                existing: existing.clone(),
                id,
            }),
            Some(_) => Ok(id),
            None => {
                self.by_id.insert(id, symbol.to_string());
                Ok(id)
            }
        }
    }

    pub fn register_all<S: AsRef<str>>(&mut self, symbols: &[S]) -> Result<(), TrendError> {
        for symbol in symbols {
            self.register(symbol.as_ref())?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, id: InstrumentId, symbol: &str) {
        self.by_id.insert(id, symbol.to_string());
    }
}
