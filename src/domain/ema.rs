//! Exponential moving average over one instrument's closes.
//!
//! ema[0] = close[0], then ema[i] = alpha*close[i] + (1-alpha)*ema[i-1].
//! No renormalisation of early terms, so the head of the series leans on
//! the seed.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmaPoint {
    pub date: NaiveDate,
    pub close: f64,
    pub ema: f64,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmaSeries {
    pub symbol: String,
    pub points: Vec<EmaPoint>,
}

impl EmaSeries {
    pub fn latest(&self) -> Option<&EmaPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmaError {
    #[error("missing close on {date}")]
    MissingData { date: NaiveDate },

    #[error("date {date} does not follow the previous point")]
    Unordered { date: NaiveDate },
}

impl EmaError {
    pub fn for_symbol(self, symbol: &str) -> crate::domain::error::TrendError {
        use crate::domain::error::TrendError;
        match self {
            EmaError::MissingData { date } => TrendError::MissingData {
                symbol: symbol.to_string(),
                date,
            },
            EmaError::Unordered { date } => TrendError::UnorderedSeries {
                symbol: symbol.to_string(),
                date,
            },
        }
    }
}

/// Runs the recurrence over `series`, which must be sorted by date with
/// no repeats. Points before `min_periods` are computed but flagged invalid.
pub fn compute(
    series: &[PricePoint],
    alpha: f64,
    min_periods: usize,
) -> Result<Vec<EmaPoint>, EmaError> {
    let mut out = Vec::with_capacity(series.len());
    let mut prev: Option<(NaiveDate, f64)> = None;

    for (i, point) in series.iter().enumerate() {
        let close = match point.close {
            Some(c) if c.is_finite() => c,
            _ => return Err(EmaError::MissingData { date: point.date }),
        };

        let ema = match prev {
            None => close,
            Some((prev_date, _)) if point.date <= prev_date => {
                return Err(EmaError::Unordered { date: point.date });
            }
            Some((_, prev_ema)) => alpha * close + (1.0 - alpha) * prev_ema,
        };

        out.push(EmaPoint {
            date: point.date,
            close,
            ema,
            valid: i + 1 >= min_periods,
        });
        prev = Some((point.date, ema));
    }

    Ok(out)
}

pub fn compute_series(
    symbol: &str,
    series: &[PricePoint],
    alpha: f64,
    min_periods: usize,
) -> Result<EmaSeries, crate::domain::error::TrendError> {
    let points = compute(series, alpha, min_periods).map_err(|e| e.for_symbol(symbol))?;
    Ok(EmaSeries {
        symbol: symbol.to_string(),
        points,
    })
}
