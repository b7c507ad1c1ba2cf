//! Configuration validation.
//!
//! Checks every config field before any fetch or store I/O.

use crate::domain::basket::parse_codes;
use crate::domain::error::TrendError;
use crate::domain::key::parse_trading_date;
use crate::ports::config_port::ConfigPort;

pub fn validate_ingest_config(config: &dyn ConfigPort) -> Result<(), TrendError> {
    validate_codes(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_ema_config(config: &dyn ConfigPort) -> Result<(), TrendError> {
    validate_span(config)?;
    validate_halflife(config)?;
    validate_min_periods(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TrendError {
    TrendError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), TrendError> {
    if let Some(codes) = config.get_string("ingest", "codes") {
        parse_codes(&codes)?;
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), TrendError> {
    let start = match config.get_string("ingest", "start_date") {
        Some(s) => Some(
            parse_trading_date(&s)
                .map_err(|_| invalid("ingest", "start_date", "invalid date format (expected YYYY-MM-DD)"))?,
        ),
        None => None,
    };
    let end = match config.get_string("ingest", "end_date") {
        Some(s) => Some(
            parse_trading_date(&s)
                .map_err(|_| invalid("ingest", "end_date", "invalid date format (expected YYYY-MM-DD)"))?,
        ),
        None => None,
    };

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid("ingest", "end_date", "end_date must not precede start_date"));
        }
    }
    Ok(())
}

fn validate_span(config: &dyn ConfigPort) -> Result<(), TrendError> {
    let Some(raw) = config.get_string("ema", "span") else {
        return Ok(());
    };
    match raw.trim().parse::<i64>() {
        Ok(span) if span > 0 => Ok(()),
        Ok(_) => Err(invalid("ema", "span", "span must be a positive integer")),
        Err(_) => Err(invalid("ema", "span", "span must be an integer")),
    }
}

fn validate_halflife(config: &dyn ConfigPort) -> Result<(), TrendError> {
    let Some(raw) = config.get_string("ema", "halflife") else {
        return Ok(());
    };
    match raw.trim().parse::<f64>() {
        Ok(h) if h.is_finite() && h > 0.0 => Ok(()),
        _ => Err(invalid("ema", "halflife", "halflife must be a positive number")),
    }
}

fn validate_min_periods(config: &dyn ConfigPort) -> Result<(), TrendError> {
    parse_min_periods(config).map(|_| ())
}

/// `[ema] min_periods` as a count; absent means 0.
pub fn parse_min_periods(config: &dyn ConfigPort) -> Result<usize, TrendError> {
    let Some(raw) = config.get_string("ema", "min_periods") else {
        return Ok(0);
    };
    raw.trim()
        .parse::<usize>()
        .map_err(|_| invalid("ema", "min_periods", "min_periods must be a non-negative integer"))
}
