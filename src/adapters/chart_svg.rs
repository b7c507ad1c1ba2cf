//! SVG chart of closing prices against their EMA for one instrument.

use crate::domain::ema::EmaSeries;
use crate::domain::error::TrendError;
use crate::domain::smoothing::SmoothingParameters;
use crate::ports::report_port::ReportPort;
use std::path::PathBuf;

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 480.0;
const PADDING: f64 = 50.0;
const X_TICKS: usize = 10;

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn render_ema_chart(series: &EmaSeries, params: &SmoothingParameters) -> String {
    let title = escape_xml(&format!(
        "{} Stock Prices and {}-day EMA",
        series.symbol, params.span
    ));

    if series.points.is_empty() {
        return format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH:.0}" height="{HEIGHT:.0}"><text x="{PADDING:.0}" y="{PADDING:.0}">{title}: no data</text></svg>
"#
        );
    }

    let (min, max) = series
        .points
        .iter()
        .flat_map(|p| [p.close, p.ema])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    let plot_width = WIDTH - 2.0 * PADDING;
    let plot_height = HEIGHT - 2.0 * PADDING;
    let range = max - min;
    let scale_y = if range > 0.0 { plot_height / range } else { 1.0 };
    let scale_x = if series.points.len() > 1 {
        plot_width / (series.points.len() - 1) as f64
    } else {
        0.0
    };

    let x_at = |i: usize| PADDING + i as f64 * scale_x;
    let y_at = |v: f64| HEIGHT - PADDING - (v - min) * scale_y;

    let (close_points, ema_points): (Vec<String>, Vec<String>) = series
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            (
                format!("{:.1},{:.1}", x_at(i), y_at(p.close)),
                format!("{:.1},{:.1}", x_at(i), y_at(p.ema)),
            )
        })
        .unzip();
    let close_points = close_points.join(" ");
    let ema_points = ema_points.join(" ");

    let step = series.points.len().div_ceil(X_TICKS).max(1);
    let ticks: String = series
        .points
        .iter()
        .enumerate()
        .step_by(step)
        .map(|(i, p)| {
            format!(
                r#"  <text x="{:.1}" y="{:.1}" font-size="10" transform="rotate(45 {:.1},{:.1})">{}</text>
"#,
                x_at(i),
                HEIGHT - PADDING + 14.0,
                x_at(i),
                HEIGHT - PADDING + 14.0,
                p.date
            )
        })
        .collect();

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH:.0}" height="{HEIGHT:.0}">
  <rect width="100%" height="100%" fill="white"/>
  <text x="{:.0}" y="{:.0}" font-size="16">{title}</text>
  <line x1="{PADDING:.0}" y1="{PADDING:.0}" x2="{PADDING:.0}" y2="{:.0}" stroke="black"/>
  <line x1="{PADDING:.0}" y1="{:.0}" x2="{:.0}" y2="{:.0}" stroke="black"/>
  <text x="4" y="{:.0}" font-size="10">{max:.2}</text>
  <text x="4" y="{:.0}" font-size="10">{min:.2}</text>
  <polyline fill="none" stroke="steelblue" stroke-width="1" points="{close_points}"/>
  <polyline fill="none" stroke="darkorange" stroke-width="1" stroke-dasharray="6,3" points="{ema_points}"/>
{ticks}  <text x="{:.0}" y="{:.0}" font-size="11" fill="steelblue">Close Price</text>
  <text x="{:.0}" y="{:.0}" font-size="11" fill="darkorange">EMA Close</text>
</svg>
"#,
        PADDING,
        PADDING / 2.0,
        HEIGHT - PADDING,
        HEIGHT - PADDING,
        WIDTH - PADDING,
        HEIGHT - PADDING,
        PADDING + 4.0,
        HEIGHT - PADDING,
        WIDTH - PADDING - 90.0,
        PADDING + 12.0,
        WIDTH - PADDING - 90.0,
        PADDING + 26.0,
    )
}

/// Writes the chart for `symbol` out of whatever series it is handed.
pub struct SvgChartAdapter {
    path: PathBuf,
    symbol: String,
}

impl SvgChartAdapter {
    pub fn new(path: PathBuf, symbol: String) -> Self {
        Self { path, symbol }
    }
}

impl ReportPort for SvgChartAdapter {
    fn write(&self, series: &[EmaSeries], params: &SmoothingParameters) -> Result<(), TrendError> {
        let target = series
            .iter()
            .find(|s| s.symbol == self.symbol)
            .ok_or_else(|| TrendError::InvalidSymbol {
                symbol: self.symbol.clone(),
                reason: "no EMA series to plot".into(),
            })?;

        std::fs::write(&self.path, render_ema_chart(target, params))?;
        tracing::info!(path = %self.path.display(), symbol = %self.symbol, "chart written");
        Ok(())
    }
}
