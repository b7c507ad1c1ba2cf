//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::chart_svg::SvgChartAdapter;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::basket::{default_start_date, parse_codes, Basket};
use crate::domain::config_validation::{
    parse_min_periods, validate_ema_config, validate_ingest_config,
};
use crate::domain::error::TrendError;
use crate::domain::key::{derive_id, derive_key, parse_trading_date, IdRegistry};
use crate::domain::pipeline::{self, EmaReport, IngestSummary, PipelineConfig};
use crate::domain::smoothing::{self, SmoothingParameters};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::store_port::RecordStore;

pub const DEFAULT_PLOT_CODE: &str = "AAPL";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_REPORT_PATH: &str = "ema.csv";

#[derive(Parser, Debug)]
#[command(
    name = "closetrend",
    about = "Store daily equity prices and derive EMA trend signals"
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SmoothingArgs {
    /// Lookback span in days (default 10)
    #[arg(long)]
    pub lbk: Option<i64>,
    /// Half-life in days; takes priority over the lookback
    #[arg(long)]
    pub hlf: Option<f64>,
    /// Points before this count are flagged as warm-up
    #[arg(long)]
    pub min_periods: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Comma separated symbols, overrides the configured basket
    #[arg(long)]
    pub code: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
    /// Directory holding one SYMBOL.csv per instrument
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// CSV file receiving every EMA series
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// SVG chart of one instrument's close and EMA
    #[arg(long)]
    pub chart: Option<PathBuf>,
    /// Symbol to chart
    #[arg(long)]
    pub plot: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load price files into the store
    Ingest {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Derive EMA series from stored closes
    Ema {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma separated symbols to read back (default: configured codes, else all)
        #[arg(long)]
        code: Option<String>,
        #[command(flatten)]
        smoothing: SmoothingArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Ingest then derive EMA series
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        ingest: IngestArgs,
        #[command(flatten)]
        smoothing: SmoothingArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show stored data range per symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
    /// List symbols present in the store
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the instrument id and composite key for a symbol and date
    Key { symbol: String, date: String },
    /// Check a configuration file and the resolved smoothing parameters
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        smoothing: SmoothingArgs,
    },
}

pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Ingest { config, ingest } => run_ingest(&config, &ingest),
        Command::Ema {
            config,
            code,
            smoothing,
            output,
        } => run_ema(&config, code.as_deref(), &smoothing, &output),
        Command::Run {
            config,
            ingest,
            smoothing,
            output,
        } => run_full(&config, &ingest, &smoothing, &output),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Key { symbol, date } => run_key(&symbol, &date),
        Command::Validate { config, smoothing } => run_validate(&config, &smoothing),
    }
}

fn fail(err: &TrendError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TrendError> {
    tracing::info!(file = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, TrendError> {
    if let Some(c) = code_override {
        return Ok(parse_codes(c)?);
    }
    if let Some(codes) = config.get_string("ingest", "codes") {
        return Ok(parse_codes(&codes)?);
    }
    Ok(Basket::default_basket().codes)
}

fn config_date(
    cli_value: Option<&str>,
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<NaiveDate>, TrendError> {
    if let Some(v) = cli_value {
        return parse_trading_date(v).map(Some);
    }
    match config.get_string("ingest", key) {
        Some(v) => parse_trading_date(&v)
            .map(Some)
            .map_err(|_| TrendError::ConfigInvalid {
                section: "ingest".into(),
                key: key.into(),
                reason: "invalid date format (expected YYYY-MM-DD)".into(),
            }),
        None => Ok(None),
    }
}

fn config_span(config: &dyn ConfigPort) -> Result<Option<i64>, TrendError> {
    match config.get_string("ema", "span") {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| TrendError::ConfigInvalid {
                section: "ema".into(),
                key: "span".into(),
                reason: "span must be an integer".into(),
            }),
        None => Ok(None),
    }
}

/// Smoothing parameters from flags, falling back to the `[ema]` section.
pub fn resolve_smoothing(
    config: &dyn ConfigPort,
    args: &SmoothingArgs,
) -> Result<SmoothingParameters, TrendError> {
    let span = match args.lbk {
        Some(s) => Some(s),
        None => config_span(config)?,
    };
    let halflife = args.hlf.or_else(|| config.get_opt_double("ema", "halflife"));
    let min_periods = match args.min_periods {
        Some(m) => m,
        None => parse_min_periods(config)?,
    };

    Ok(smoothing::resolve(span, halflife)?.with_min_periods(min_periods))
}

pub fn build_pipeline_config(
    config: &dyn ConfigPort,
    ingest: &IngestArgs,
    smoothing: &SmoothingArgs,
) -> Result<PipelineConfig, TrendError> {
    let codes = resolve_codes(ingest.code.as_deref(), config)?;
    let start_date =
        config_date(ingest.start.as_deref(), config, "start_date")?.unwrap_or_else(default_start_date);
    let end_date = config_date(ingest.end.as_deref(), config, "end_date")?.unwrap_or(NaiveDate::MAX);

    if start_date > end_date {
        return Err(TrendError::ConfigInvalid {
            section: "ingest".into(),
            key: "end_date".into(),
            reason: "end_date must not precede start_date".into(),
        });
    }

    let span = match smoothing.lbk {
        Some(s) => Some(s),
        None => config_span(config)?,
    };

    Ok(PipelineConfig {
        codes,
        start_date,
        end_date,
        span,
        halflife: smoothing
            .hlf
            .or_else(|| config.get_opt_double("ema", "halflife")),
        min_periods: match smoothing.min_periods {
            Some(m) => m,
            None => parse_min_periods(config)?,
        },
    })
}

pub fn data_dir(args: &IngestArgs, config: &dyn ConfigPort) -> PathBuf {
    args.data_dir
        .clone()
        .or_else(|| config.get_string("ingest", "data_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn RecordStore>, TrendError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            use crate::adapters::postgres_adapter::PostgresAdapter;
            return Ok(Box::new(PostgresAdapter::from_config(config)?));
        }
    }

    open_default_store(config)
}

#[cfg(feature = "sqlite")]
fn open_default_store(config: &dyn ConfigPort) -> Result<Box<dyn RecordStore>, TrendError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    Ok(Box::new(SqliteAdapter::from_config(config)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_default_store(_config: &dyn ConfigPort) -> Result<Box<dyn RecordStore>, TrendError> {
    Err(TrendError::ConfigMissing {
        section: "postgres".into(),
        key: "connection_string".into(),
    })
}

/// Builds the report sinks named by flags or the `[report]` section.
pub fn report_sinks(config: &dyn ConfigPort, args: &OutputArgs) -> Vec<Box<dyn ReportPort>> {
    let mut sinks: Vec<Box<dyn ReportPort>> = Vec::new();

    let output = args
        .output
        .clone()
        .or_else(|| config.get_string("report", "output").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH));
    sinks.push(Box::new(CsvReportAdapter::new(output)));

    let chart = args
        .chart
        .clone()
        .or_else(|| config.get_string("report", "chart").map(PathBuf::from));
    if let Some(chart) = chart {
        let plot = args
            .plot
            .clone()
            .or_else(|| config.get_string("report", "plot_code"))
            .unwrap_or_else(|| DEFAULT_PLOT_CODE.to_string())
            .to_uppercase();
        sinks.push(Box::new(SvgChartAdapter::new(chart, plot)));
    }

    sinks
}

fn print_ingest_summary(summary: &IngestSummary) {
    for code in &summary.ingested {
        println!("{}: {} rows stored", code.symbol, code.rows);
    }
    for skipped in &summary.skipped {
        eprintln!("warning: skipped {} ({:?})", skipped.symbol, skipped.reason);
    }
}

fn finish_report(
    report: &EmaReport,
    params: &SmoothingParameters,
    sinks: &[Box<dyn ReportPort>],
) -> ExitCode {
    println!("{params}");
    for series in &report.series {
        if let Some(last) = series.latest() {
            println!(
                "{}: {} points, last {} close {:.2} ema {:.2}",
                series.symbol,
                series.len(),
                last.date,
                last.close,
                last.ema
            );
        }
    }
    for failure in &report.failures {
        eprintln!("warning: {}: {}", failure.symbol, failure.error);
    }

    if report.series.is_empty() {
        if let Some(first) = report.failures.first() {
            return ExitCode::from(&first.error);
        }
        eprintln!("error: no stored rows to compute");
        return ExitCode::from(5);
    }

    for sink in sinks {
        if let Err(e) = sink.write(&report.series, params) {
            return fail(&e);
        }
    }
    ExitCode::SUCCESS
}

fn run_ingest(config_path: &Path, args: &IngestArgs) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if let Err(e) = validate_ingest_config(&config) {
        return fail(&e);
    }

    let pipeline_config = match build_pipeline_config(&config, args, &SmoothingArgs::default()) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let fetch = CsvAdapter::new(data_dir(args, &config));

    let mut registry = IdRegistry::new();
    match pipeline::ingest(
        &fetch,
        &*store,
        &mut registry,
        &pipeline_config.codes,
        pipeline_config.start_date,
        pipeline_config.end_date,
    ) {
        Ok(summary) => {
            print_ingest_summary(&summary);
            if summary.ingested.is_empty() {
                eprintln!("error: no instrument was ingested");
                return ExitCode::from(5);
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_ema(
    config_path: &Path,
    code: Option<&str>,
    smoothing: &SmoothingArgs,
    output: &OutputArgs,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if let Err(e) = validate_ema_config(&config) {
        return fail(&e);
    }

    // Parameters are shared by every instrument and checked before the store is touched.
    let params = match resolve_smoothing(&config, smoothing) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let symbols = match code {
        Some(c) => match parse_codes(c) {
            Ok(codes) => Some(codes),
            Err(e) => return fail(&TrendError::from(e)),
        },
        None => match config.get_string("ingest", "codes").map(|c| parse_codes(&c)) {
            Some(Ok(codes)) => Some(codes),
            Some(Err(e)) => return fail(&TrendError::from(e)),
            None => None,
        },
    };

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match pipeline::compute_ema(&*store, symbols.as_deref(), &params) {
        Ok(report) => finish_report(&report, &params, &report_sinks(&config, output)),
        Err(e) => fail(&e),
    }
}

fn run_full(
    config_path: &Path,
    ingest: &IngestArgs,
    smoothing: &SmoothingArgs,
    output: &OutputArgs,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if let Err(e) = validate_ingest_config(&config).and_then(|_| validate_ema_config(&config)) {
        return fail(&e);
    }

    let pipeline_config = match build_pipeline_config(&config, ingest, smoothing) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    // Fail fast: a bad span or half-life must stop the run before any I/O.
    if let Err(e) = pipeline_config.resolve_parameters() {
        return fail(&e);
    }

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let fetch = CsvAdapter::new(data_dir(ingest, &config));

    match pipeline::run(&fetch, &*store, &pipeline_config) {
        Ok(outcome) => {
            print_ingest_summary(&outcome.ingest);
            finish_report(
                &outcome.report,
                &outcome.params,
                &report_sinks(&config, output),
            )
        }
        Err(e) => fail(&e),
    }
}

fn run_info(config_path: &Path, code: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let codes = match code {
        Some(c) => match parse_codes(c) {
            Ok(codes) => codes,
            Err(e) => return fail(&TrendError::from(e)),
        },
        None => match store.list_symbols() {
            Ok(s) => s,
            Err(e) => return fail(&e),
        },
    };

    for c in &codes {
        match store.get_data_range(c) {
            Ok(Some((min_date, max_date, count))) => {
                println!("{}: {} rows, {} to {}", c, count, min_date, max_date);
            }
            Ok(None) => eprintln!("{}: no data found", c),
            Err(e) => eprintln!("error querying {}: {}", c, e),
        }
    }
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match store.list_symbols() {
        Ok(symbols) if symbols.is_empty() => {
            eprintln!("No symbols stored");
            ExitCode::SUCCESS
        }
        Ok(symbols) => {
            for symbol in &symbols {
                println!("{}", symbol);
            }
            eprintln!("{} symbols found", symbols.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_key(symbol: &str, date: &str) -> ExitCode {
    let symbol = symbol.trim().to_uppercase();
    let result = parse_trading_date(date).and_then(|d| {
        let id = derive_id(&symbol)?;
        let key = derive_key(&symbol, d)?;
        Ok((id, key))
    });

    match result {
        Ok((id, key)) => {
            println!("{symbol}: id {id}, key {key}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: &Path, smoothing: &SmoothingArgs) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    if let Err(e) = validate_ingest_config(&config).and_then(|_| validate_ema_config(&config)) {
        return fail(&e);
    }

    let pipeline_config = match build_pipeline_config(&config, &IngestArgs::default(), smoothing) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let params = match pipeline_config.resolve_parameters() {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let mut registry = IdRegistry::new();
    if let Err(e) = registry.register_all(pipeline_config.codes.as_slice()) {
        return fail(&e);
    }

    println!("codes: {}", pipeline_config.codes.join(", "));
    println!("start: {}", pipeline_config.start_date);
    if pipeline_config.end_date != NaiveDate::MAX {
        println!("end: {}", pipeline_config.end_date);
    }
    println!("{params}, alpha: {:.6}", params.alpha);
    println!("Configuration is valid");
    ExitCode::SUCCESS
}
