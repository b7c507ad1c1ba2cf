//! SQLite record store.

use crate::domain::error::TrendError;
use crate::domain::key::CompositeKey;
use crate::domain::price::PriceRecord;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::RecordStore;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Row};

const SELECT_COLUMNS: &str = "SELECT date_ticker_id, date, open, close, ticker FROM stock_prices";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> TrendError {
    TrendError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date_column(value: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            value.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PriceRecord> {
    Ok(PriceRecord {
        key: row.get(0)?,
        date: parse_date_column(row.get(1)?)?,
        open: row.get(2)?,
        close: row.get(3)?,
        symbol: row.get(4)?,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TrendError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TrendError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        tracing::debug!(path = %db_path, pool_size, "opening sqlite store");
        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| TrendError::Database {
                    reason: e.to_string(),
                })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, TrendError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TrendError::Database {
                reason: e.to_string(),
            })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TrendError> {
        self.pool.get().map_err(|e: r2d2::Error| TrendError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), TrendError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS stock_prices (
                    date_ticker_id INTEGER PRIMARY KEY,
                    date TEXT NOT NULL,
                    open REAL,
                    close REAL,
                    ticker TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_stock_prices_ticker_date
                    ON stock_prices(ticker, date);",
            )
            .map_err(query_err)
    }
}

impl RecordStore for SqliteAdapter {
    fn upsert(&self, records: &[PriceRecord]) -> Result<usize, TrendError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO stock_prices (date_ticker_id, date, open, close, ticker)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(query_err)?;

            for record in records {
                stmt.execute(params![
                    record.key,
                    record.date.format("%Y-%m-%d").to_string(),
                    record.open,
                    record.close,
                    record.symbol
                ])
                .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(records.len())
    }

    fn read_ordered(&self, symbols: Option<&[String]>) -> Result<Vec<PriceRecord>, TrendError> {
        let conn = self.conn()?;

        let query = match symbols {
            Some([]) => return Ok(Vec::new()),
            Some(list) => {
                let placeholders = (1..=list.len())
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{SELECT_COLUMNS} WHERE ticker IN ({placeholders}) ORDER BY ticker, date")
            }
            None => format!("{SELECT_COLUMNS} ORDER BY ticker, date"),
        };

        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(symbols.unwrap_or(&[])), record_from_row)
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_err)?);
        }
        Ok(records)
    }

    fn get(&self, key: CompositeKey) -> Result<Option<PriceRecord>, TrendError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE date_ticker_id = ?1"))
            .map_err(query_err)?;
        let mut rows = stmt.query_map(params![key], record_from_row).map_err(query_err)?;
        rows.next().transpose().map_err(query_err)
    }

    fn count(&self) -> Result<usize, TrendError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM stock_prices", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as usize)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ticker FROM stock_prices ORDER BY ticker")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_err)?);
        }
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendError> {
        let result: (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM stock_prices WHERE ticker = ?1",
                params![symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let min = parse_date_column(min_str).map_err(query_err)?;
                let max = parse_date_column(max_str).map_err(query_err)?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }
}
