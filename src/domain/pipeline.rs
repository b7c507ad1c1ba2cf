//! Ingestion and EMA derivation over a basket of instruments.
//!
//! Ingestion keys every fetched row and upserts it, so re-running over an
//! already covered range overwrites instead of appending. Derivation reads
//! the table back in (symbol, date) order, partitions by symbol and runs the
//! recurrence per partition with one shared set of smoothing parameters.

use crate::domain::ema::{self, EmaSeries, PricePoint};
use crate::domain::error::TrendError;
use crate::domain::key::IdRegistry;
use crate::domain::price::{PriceRecord, RawPriceRow};
use crate::domain::smoothing::{self, SmoothingParameters};
use crate::ports::fetch_port::FetchPort;
use crate::ports::store_port::RecordStore;
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub span: Option<i64>,
    pub halflife: Option<f64>,
    pub min_periods: usize,
}

impl PipelineConfig {
    pub fn resolve_parameters(&self) -> Result<SmoothingParameters, TrendError> {
        Ok(smoothing::resolve(self.span, self.halflife)?.with_min_periods(self.min_periods))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestedCode {
    pub symbol: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    FetchFailed(String),
    InvalidKey(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    pub ingested: Vec<IngestedCode>,
    pub skipped: Vec<SkippedCode>,
}

impl IngestSummary {
    pub fn total_rows(&self) -> usize {
        self.ingested.iter().map(|c| c.rows).sum()
    }
}

#[derive(Debug)]
pub struct SeriesFailure {
    pub symbol: String,
    pub error: TrendError,
}

#[derive(Debug, Default)]
pub struct EmaReport {
    pub series: Vec<EmaSeries>,
    pub failures: Vec<SeriesFailure>,
}

impl EmaReport {
    pub fn find(&self, symbol: &str) -> Option<&EmaSeries> {
        self.series.iter().find(|s| s.symbol == symbol)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub params: SmoothingParameters,
    pub ingest: IngestSummary,
    pub report: EmaReport,
}

fn key_rows(symbol: &str, rows: &[RawPriceRow]) -> Result<Vec<PriceRecord>, TrendError> {
    rows.iter().map(|row| PriceRecord::from_raw(symbol, row)).collect()
}

/// Fetches, keys and upserts every symbol in `codes`. Instruments whose fetch
/// or keying fails are skipped; store failures abort the batch.
pub fn ingest(
    fetch: &dyn FetchPort,
    store: &dyn RecordStore,
    registry: &mut IdRegistry,
    codes: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<IngestSummary, TrendError> {
    let mut summary = IngestSummary::default();

    for symbol in codes {
        if let Err(e) = registry.register(symbol) {
            tracing::warn!(%symbol, error = %e, "skipping instrument");
            summary.skipped.push(SkippedCode {
                symbol: symbol.clone(),
                reason: SkipReason::InvalidKey(e.to_string()),
            });
            continue;
        }

        let rows = match fetch.fetch_prices(symbol, start_date, end_date) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "fetch failed, skipping instrument");
                summary.skipped.push(SkippedCode {
                    symbol: symbol.clone(),
                    reason: SkipReason::FetchFailed(e.to_string()),
                });
                continue;
            }
        };

        if rows.is_empty() {
            tracing::warn!(%symbol, "no rows returned, skipping instrument");
            summary.skipped.push(SkippedCode {
                symbol: symbol.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        let records = match key_rows(symbol, &rows) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "skipping instrument");
                summary.skipped.push(SkippedCode {
                    symbol: symbol.clone(),
                    reason: SkipReason::InvalidKey(e.to_string()),
                });
                continue;
            }
        };

        let written = store.upsert(&records)?;
        tracing::info!(%symbol, rows = written, "stored");
        summary.ingested.push(IngestedCode {
            symbol: symbol.clone(),
            rows: written,
        });
    }

    tracing::info!(
        instruments = summary.ingested.len(),
        skipped = summary.skipped.len(),
        rows = summary.total_rows(),
        "ingestion finished"
    );
    Ok(summary)
}

/// Splits an ordered read into per-symbol runs. A symbol that shows up in two
/// separate runs means the read was not grouped and is rejected outright.
pub fn partition_by_symbol(
    records: &[PriceRecord],
) -> Result<Vec<(String, Vec<PricePoint>)>, TrendError> {
    let mut partitions: Vec<(String, Vec<PricePoint>)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for record in records {
        let point = PricePoint {
            date: record.date,
            close: record.close,
        };
        if let Some((_, points)) = partitions
            .last_mut()
            .filter(|(symbol, _)| *symbol == record.symbol)
        {
            points.push(point);
            continue;
        }

        if !seen.insert(record.symbol.as_str()) {
            return Err(TrendError::MixedSeries {
                symbol: record.symbol.clone(),
            });
        }
        partitions.push((record.symbol.clone(), vec![point]));
    }

    Ok(partitions)
}

/// Reads the stored closes back and derives one EMA series per instrument.
/// An instrument with a gap or disordered dates is reported in
/// [`EmaReport::failures`]; the rest are still computed.
pub fn compute_ema(
    store: &dyn RecordStore,
    symbols: Option<&[String]>,
    params: &SmoothingParameters,
) -> Result<EmaReport, TrendError> {
    let records = store.read_ordered(symbols)?;
    let partitions = partition_by_symbol(&records)?;

    let mut report = EmaReport::default();
    for (symbol, points) in partitions {
        match ema::compute_series(&symbol, &points, params.alpha, params.min_periods) {
            Ok(series) => report.series.push(series),
            Err(error) => {
                tracing::warn!(%symbol, %error, "EMA not computed");
                report.failures.push(SeriesFailure { symbol, error });
            }
        }
    }

    tracing::info!(
        series = report.series.len(),
        failures = report.failures.len(),
        alpha = params.alpha,
        "EMA derivation finished"
    );
    Ok(report)
}

/// Full batch: parameters are resolved before any fetch or store I/O.
pub fn run(
    fetch: &dyn FetchPort,
    store: &dyn RecordStore,
    config: &PipelineConfig,
) -> Result<RunOutcome, TrendError> {
    let params = config.resolve_parameters()?;
    tracing::info!(%params, alpha = params.alpha, "smoothing parameters resolved");

    let mut registry = IdRegistry::new();
    let ingest = ingest(
        fetch,
        store,
        &mut registry,
        &config.codes,
        config.start_date,
        config.end_date,
    )?;
    let report = compute_ema(store, Some(config.codes.as_slice()), &params)?;

    Ok(RunOutcome {
        params,
        ingest,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::key::derive_key;
    use approx::assert_relative_eq;
    use std::cell::{Cell, RefCell};
    use std::collections::{BTreeMap, HashMap};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Default)]
    struct MemStore {
        rows: RefCell<BTreeMap<i64, PriceRecord>>,
        reads: Cell<usize>,
    }

    impl RecordStore for MemStore {
        fn upsert(&self, records: &[PriceRecord]) -> Result<usize, TrendError> {
            let mut rows = self.rows.borrow_mut();
            for r in records {
                rows.insert(r.key, r.clone());
            }
            Ok(records.len())
        }

        fn read_ordered(&self, symbols: Option<&[String]>) -> Result<Vec<PriceRecord>, TrendError> {
            self.reads.set(self.reads.get() + 1);
            let mut out: Vec<PriceRecord> = self
                .rows
                .borrow()
                .values()
                .filter(|r| symbols.is_none_or(|s| s.contains(&r.symbol)))
                .cloned()
                .collect();
            out.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
            Ok(out)
        }

        fn get(&self, key: i64) -> Result<Option<PriceRecord>, TrendError> {
            Ok(self.rows.borrow().get(&key).cloned())
        }

        fn count(&self) -> Result<usize, TrendError> {
            Ok(self.rows.borrow().len())
        }

        fn list_symbols(&self) -> Result<Vec<String>, TrendError> {
            let mut s: Vec<String> = self.rows.borrow().values().map(|r| r.symbol.clone()).collect();
            s.sort();
            s.dedup();
            Ok(s)
        }

        fn get_data_range(
            &self,
            _symbol: &str,
        ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendError> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct MapFetch {
        data: HashMap<String, Vec<RawPriceRow>>,
        calls: Cell<usize>,
    }

    impl MapFetch {
        fn with(mut self, symbol: &str, closes: &[Option<f64>]) -> Self {
            let rows = closes
                .iter()
                .enumerate()
                .map(|(i, &close)| RawPriceRow {
                    date: ymd(2024, 1, 2) + chrono::Duration::days(i as i64),
                    open: close,
                    close,
                })
                .collect();
            self.data.insert(symbol.to_string(), rows);
            self
        }
    }

    impl FetchPort for MapFetch {
        fn fetch_prices(
            &self,
            symbol: &str,
            _start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<Vec<RawPriceRow>, TrendError> {
            self.calls.set(self.calls.get() + 1);
            self.data.get(symbol).cloned().ok_or_else(|| TrendError::Fetch {
                symbol: symbol.to_string(),
                reason: "unknown symbol".into(),
            })
        }
    }

    fn config(codes: &[&str]) -> PipelineConfig {
        PipelineConfig {
            codes: codes.iter().map(|s| s.to_string()).collect(),
            start_date: ymd(2024, 1, 1),
            end_date: ymd(2024, 12, 31),
            span: None,
            halflife: None,
            min_periods: 0,
        }
    }

    #[test]
    fn ingest_is_idempotent() {
        let fetch = MapFetch::default().with("AAPL", &[Some(1.0), Some(2.0), Some(3.0)]);
        let store = MemStore::default();
        let mut registry = IdRegistry::new();
        let codes = vec!["AAPL".to_string()];

        ingest(&fetch, &store, &mut registry, &codes, ymd(2024, 1, 1), ymd(2024, 12, 31)).unwrap();
        ingest(&fetch, &store, &mut registry, &codes, ymd(2024, 1, 1), ymd(2024, 12, 31)).unwrap();

        assert_eq!(store.count().unwrap(), 3);
        let key = derive_key("AAPL", ymd(2024, 1, 2)).unwrap();
        assert_eq!(store.get(key).unwrap().unwrap().close, Some(1.0));
    }

    #[test]
    fn ingest_skips_failed_fetch_and_continues() {
        let fetch = MapFetch::default().with("MSFT", &[Some(5.0)]);
        let store = MemStore::default();
        let mut registry = IdRegistry::new();
        let codes = vec!["NOPE".to_string(), "MSFT".to_string()];

        let summary =
            ingest(&fetch, &store, &mut registry, &codes, ymd(2024, 1, 1), ymd(2024, 12, 31)).unwrap();

        assert_eq!(summary.ingested, vec![IngestedCode { symbol: "MSFT".into(), rows: 1 }]);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].symbol, "NOPE");
        assert!(matches!(summary.skipped[0].reason, SkipReason::FetchFailed(_)));
    }

    #[test]
    fn ingest_skips_empty_fetch() {
        let fetch = MapFetch::default().with("V", &[]);
        let store = MemStore::default();
        let mut registry = IdRegistry::new();

        let summary = ingest(
            &fetch,
            &store,
            &mut registry,
            &["V".to_string()],
            ymd(2024, 1, 1),
            ymd(2024, 12, 31),
        )
        .unwrap();
        assert_eq!(summary.skipped[0].reason, SkipReason::NoData);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn ingest_skips_colliding_symbol() {
        let fetch = MapFetch::default().with("AAPL", &[Some(1.0)]);
        let store = MemStore::default();
        let mut registry = IdRegistry::new();
        registry.insert_raw(crate::domain::key::derive_id("AAPL").unwrap(), "OTHER");

        let summary = ingest(
            &fetch,
            &store,
            &mut registry,
            &["AAPL".to_string()],
            ymd(2024, 1, 1),
            ymd(2024, 12, 31),
        )
        .unwrap();
        assert!(matches!(summary.skipped[0].reason, SkipReason::InvalidKey(_)));
        assert_eq!(fetch.calls.get(), 0);
    }

    #[test]
    fn partition_rejects_interleaved_symbols() {
        let rec = |symbol: &str, d: u32| PriceRecord {
            key: derive_key(symbol, ymd(2024, 1, d)).unwrap(),
            date: ymd(2024, 1, d),
            open: None,
            close: Some(1.0),
            symbol: symbol.to_string(),
        };
        let records = vec![rec("A", 1), rec("B", 1), rec("A", 2)];
        let err = partition_by_symbol(&records).unwrap_err();
        assert!(matches!(err, TrendError::MixedSeries { symbol } if symbol == "A"));
    }

    #[test]
    fn partition_groups_runs() {
        let rec = |symbol: &str, d: u32| PriceRecord {
            key: derive_key(symbol, ymd(2024, 1, d)).unwrap(),
            date: ymd(2024, 1, d),
            open: None,
            close: Some(f64::from(d)),
            symbol: symbol.to_string(),
        };
        let parts = partition_by_symbol(&[rec("A", 1), rec("A", 2), rec("B", 1)]).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, "A");
        assert_eq!(parts[0].1.len(), 2);
        assert_eq!(parts[1].0, "B");
    }

    #[test]
    fn compute_ema_isolates_failing_instrument() {
        let fetch = MapFetch::default()
            .with("AAPL", &[Some(10.0), Some(20.0)])
            .with("MSFT", &[Some(1.0), None, Some(3.0)]);
        let store = MemStore::default();
        let mut registry = IdRegistry::new();
        let codes = vec!["AAPL".to_string(), "MSFT".to_string()];
        ingest(&fetch, &store, &mut registry, &codes, ymd(2024, 1, 1), ymd(2024, 12, 31)).unwrap();

        let params = smoothing::resolve(None, Some(1.0)).unwrap();
        let report = compute_ema(&store, None, &params).unwrap();

        assert_eq!(report.series.len(), 1);
        let aapl = report.find("AAPL").unwrap();
        assert_relative_eq!(aapl.points[1].ema, 15.0, epsilon = 1e-12);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "MSFT");
        assert!(matches!(report.failures[0].error, TrendError::MissingData { .. }));
        assert!(!report.is_complete());
    }

    #[test]
    fn compute_ema_restarts_seed_per_instrument() {
        let fetch = MapFetch::default()
            .with("AAA", &[Some(10.0), Some(10.0)])
            .with("BBB", &[Some(500.0), Some(500.0)]);
        let store = MemStore::default();
        let mut registry = IdRegistry::new();
        let codes = vec!["AAA".to_string(), "BBB".to_string()];
        ingest(&fetch, &store, &mut registry, &codes, ymd(2024, 1, 1), ymd(2024, 12, 31)).unwrap();

        let params = smoothing::resolve(Some(10), None).unwrap();
        let report = compute_ema(&store, None, &params).unwrap();
        assert_relative_eq!(report.find("BBB").unwrap().points[0].ema, 500.0);
        assert_relative_eq!(report.find("AAA").unwrap().points[1].ema, 10.0);
    }

    #[test]
    fn run_fails_fast_on_bad_parameters() {
        let fetch = MapFetch::default().with("AAPL", &[Some(1.0)]);
        let store = MemStore::default();
        let mut cfg = config(&["AAPL"]);
        cfg.span = Some(0);

        let err = run(&fetch, &store, &cfg).unwrap_err();
        assert!(matches!(err, TrendError::InvalidParameter { .. }));
        assert_eq!(fetch.calls.get(), 0);
        assert_eq!(store.reads.get(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn run_end_to_end() {
        let fetch = MapFetch::default()
            .with("AAPL", &[Some(10.0), Some(20.0)])
            .with("MSFT", &[Some(7.0)]);
        let store = MemStore::default();
        let mut cfg = config(&["AAPL", "MSFT"]);
        cfg.halflife = Some(1.0);

        let outcome = run(&fetch, &store, &cfg).unwrap();
        assert_eq!(outcome.ingest.total_rows(), 3);
        assert_eq!(outcome.report.series.len(), 2);
        assert_relative_eq!(outcome.params.alpha, 0.5, epsilon = 1e-12);
        assert_relative_eq!(
            outcome.report.find("AAPL").unwrap().points[1].ema,
            15.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn run_only_reads_configured_codes() {
        let fetch = MapFetch::default().with("AAPL", &[Some(10.0)]);
        let store = MemStore::default();
        store
            .upsert(&[PriceRecord::from_raw(
                "OLD",
                &RawPriceRow {
                    date: ymd(2023, 5, 5),
                    open: None,
                    close: Some(1.0),
                },
            )
            .unwrap()])
            .unwrap();

        let outcome = run(&fetch, &store, &config(&["AAPL"])).unwrap();
        assert!(outcome.report.find("OLD").is_none());
        assert!(outcome.report.find("AAPL").is_some());
    }
}
