//! Smoothing parameter resolution.
//!
//! Span and half-life are two parameterisations of the same single-pole
//! filter. With a half-life, `alpha = 1 - exp(ln(0.5) / halflife)` and the
//! span is informational only. Otherwise `alpha = 2 / (span + 1)` and the
//! half-life is back-derived as `-ln(2) / ln(1 - alpha)`.

use crate::domain::error::TrendError;
use std::fmt;

pub const DEFAULT_SPAN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSource {
    Span,
    HalfLife,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParameters {
    pub span: u32,
    pub halflife: f64,
    pub alpha: f64,
    pub source: ParameterSource,
    /// Points before this count are reported as not yet valid.
    pub min_periods: usize,
}

impl SmoothingParameters {
    pub fn with_min_periods(mut self, min_periods: usize) -> Self {
        self.min_periods = min_periods;
        self
    }
}

impl fmt::Display for SmoothingParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lookback: {}, halflife: {}", self.span, self.halflife)
    }
}

/// Resolves user input into a smoothing factor. A half-life, when given,
/// wins over the span.
pub fn resolve(span: Option<i64>, halflife: Option<f64>) -> Result<SmoothingParameters, TrendError> {
    let span = match span {
        None => DEFAULT_SPAN,
        Some(s) if s > 0 && s <= i64::from(u32::MAX) => s as u32,
        Some(s) => {
            return Err(TrendError::InvalidParameter {
                name: "span".into(),
                reason: format!("span must be a positive integer, got {s}"),
            });
        }
    };

    let (halflife, alpha, source) = match halflife {
        Some(h) => {
            if !h.is_finite() || h <= 0.0 {
                return Err(TrendError::InvalidParameter {
                    name: "halflife".into(),
                    reason: format!("halflife must be a positive number, got {h}"),
                });
            }
            let alpha = 1.0 - (0.5f64.ln() / h).exp();
            (h, alpha, ParameterSource::HalfLife)
        }
        None => {
            let alpha = 2.0 / (f64::from(span) + 1.0);
            let halflife = -(2.0f64.ln()) / (1.0 - alpha).ln();
            (halflife, alpha, ParameterSource::Span)
        }
    };

    // span = 1 gives alpha = 1 and a tiny half-life drives alpha to 1 as well.
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(TrendError::InvalidParameter {
            name: match source {
                ParameterSource::Span => "span".into(),
                ParameterSource::HalfLife => "halflife".into(),
            },
            reason: format!("smoothing factor {alpha} is outside (0, 1)"),
        });
    }

    Ok(SmoothingParameters {
        span,
        halflife,
        alpha,
        source,
        min_periods: 0,
    })
}
