//! Report generation port trait.

use crate::domain::ema::EmaSeries;
use crate::domain::error::TrendError;
use crate::domain::smoothing::SmoothingParameters;

/// Port for handing computed EMA series to a presentation layer.
pub trait ReportPort {
    fn write(
        &self,
        series: &[EmaSeries],
        params: &SmoothingParameters,
    ) -> Result<(), TrendError>;

    /// Default implementation: a single-series report is a one-element report.
    fn write_one(
        &self,
        series: &EmaSeries,
        params: &SmoothingParameters,
    ) -> Result<(), TrendError> {
        self.write(std::slice::from_ref(series), params)
    }
}
