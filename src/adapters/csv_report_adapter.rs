//! CSV export of computed EMA series.

use crate::domain::ema::EmaSeries;
use crate::domain::error::TrendError;
use crate::domain::smoothing::SmoothingParameters;
use crate::ports::report_port::ReportPort;
use std::io::Write;
use std::path::PathBuf;

pub struct CsvReportAdapter {
    path: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn csv_err(e: csv::Error) -> TrendError {
    TrendError::Io(std::io::Error::other(e))
}

/// Writes `ticker,date,close,ema,valid` rows for every series.
pub fn write_series<W: Write>(writer: W, series: &[EmaSeries]) -> Result<(), TrendError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["ticker", "date", "close", "ema", "valid"])
        .map_err(csv_err)?;

    for s in series {
        for p in &s.points {
            wtr.write_record([
                s.symbol.as_str(),
                &p.date.format("%Y-%m-%d").to_string(),
                &p.close.to_string(),
                &format!("{:.6}", p.ema),
                if p.valid { "true" } else { "false" },
            ])
            .map_err(csv_err)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, series: &[EmaSeries], params: &SmoothingParameters) -> Result<(), TrendError> {
        let file = std::fs::File::create(&self.path)?;
        write_series(file, series)?;
        tracing::info!(
            path = %self.path.display(),
            series = series.len(),
            %params,
            "EMA report written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ema::EmaPoint;
    use crate::domain::smoothing::resolve;
    use chrono::NaiveDate;

    fn sample() -> EmaSeries {
        EmaSeries {
            symbol: "AAPL".into(),
            points: vec![
                EmaPoint {
                    date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    close: 10.0,
                    ema: 10.0,
                    valid: false,
                },
                EmaPoint {
                    date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                    close: 20.0,
                    ema: 15.0,
                    valid: true,
                },
            ],
        }
    }

    #[test]
    fn write_series_layout() {
        let mut buf = Vec::new();
        write_series(&mut buf, &[sample()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ticker,date,close,ema,valid");
        assert_eq!(lines[1], "AAPL,2024-01-02,10,10.000000,false");
        assert_eq!(lines[2], "AAPL,2024-01-03,20,15.000000,true");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn write_empty_has_header_only() {
        let mut buf = Vec::new();
        write_series(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "ticker,date,close,ema,valid\n");
    }

    #[test]
    fn report_port_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ema.csv");
        let adapter = CsvReportAdapter::new(path.clone());
        let params = resolve(None, None).unwrap();

        adapter.write_one(&sample(), &params).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("ticker,date,close,ema,valid"));
        assert_eq!(text.lines().count(), 3);
    }
}
