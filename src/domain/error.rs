//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for closetrend.
#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    #[error("invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("invalid date format {value:?}: expected an 8-digit YYYYMMDD date")]
    InvalidDateFormat { value: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("missing close price for {symbol} on {date}")]
    MissingData { symbol: String, date: NaiveDate },

    #[error("dates out of order for {symbol} at {date}")]
    UnorderedSeries { symbol: String, date: NaiveDate },

    #[error("instrument id {id} for {symbol} already assigned to {existing}")]
    KeyCollision {
        symbol: String,
        existing: String,
        id: u64,
    },

    #[error("rows for {symbol} are not contiguous in the ordered read")]
    MixedSeries { symbol: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("fetch error for {symbol}: {reason}")]
    Fetch { symbol: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TrendError> for std::process::ExitCode {
    fn from(err: &TrendError) -> Self {
        let code: u8 = match err {
            TrendError::Io(_) | TrendError::Fetch { .. } => 1,
            TrendError::ConfigParse { .. }
            | TrendError::ConfigMissing { .. }
            | TrendError::ConfigInvalid { .. } => 2,
            TrendError::Database { .. } | TrendError::DatabaseQuery { .. } => 3,
            TrendError::InvalidParameter { .. } => 4,
            TrendError::InvalidSymbol { .. }
            | TrendError::InvalidDateFormat { .. }
            | TrendError::MissingData { .. }
            | TrendError::UnorderedSeries { .. }
            | TrendError::KeyCollision { .. }
            | TrendError::MixedSeries { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_message_names_symbol_and_date() {
        let err = TrendError::MissingData {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_eq!(err.to_string(), "missing close price for AAPL on 2024-03-01");
    }

    #[test]
    fn key_collision_message() {
        let err = TrendError::KeyCollision {
            symbol: "XYZ".into(),
            existing: "ABC".into(),
            id: 42,
        };
        assert_eq!(
            err.to_string(),
            "instrument id 42 for XYZ already assigned to ABC"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TrendError = io.into();
        assert!(matches!(err, TrendError::Io(_)));
    }
}
