//! PostgreSQL record store.

use crate::domain::error::TrendError;
use crate::domain::key::CompositeKey;
use crate::domain::price::PriceRecord;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::RecordStore;
use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

const SELECT_COLUMNS: &str = "SELECT date_ticker_id, date, open, close, ticker FROM public.stock_prices";

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

fn query_err(e: postgres::Error) -> TrendError {
    TrendError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn record_from_row(row: &Row) -> PriceRecord {
    PriceRecord {
        key: row.get(0),
        date: row.get(1),
        open: row.get(2),
        close: row.get(3),
        symbol: row.get(4),
    }
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TrendError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| TrendError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config: postgres::Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| TrendError::ConfigInvalid {
                    section: "postgres".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;
        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;

        tracing::debug!(pool_size, "opening postgres store");
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
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

    fn conn(&self) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, TrendError> {
        self.pool.get().map_err(|e: r2d2::Error| TrendError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), TrendError> {
        self.conn()?
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS public.stock_prices (
                    date_ticker_id BIGINT PRIMARY KEY,
                    date DATE NOT NULL,
                    open DOUBLE PRECISION,
                    close DOUBLE PRECISION,
                    ticker TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_stock_prices_ticker_date
                    ON public.stock_prices(ticker, date);",
            )
            .map_err(query_err)
    }
}

impl RecordStore for PostgresAdapter {
    fn upsert(&self, records: &[PriceRecord]) -> Result<usize, TrendError> {
        let mut client = self.conn()?;
        let mut tx = client.transaction().map_err(query_err)?;
        let stmt = tx
            .prepare(
                "INSERT INTO public.stock_prices (date_ticker_id, date, open, close, ticker)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (date_ticker_id) DO UPDATE
                 SET date = EXCLUDED.date, open = EXCLUDED.open,
                     close = EXCLUDED.close, ticker = EXCLUDED.ticker",
            )
            .map_err(query_err)?;

        for record in records {
            let params: &[&(dyn ToSql + Sync)] = &[
                &record.key,
                &record.date,
                &record.open,
                &record.close,
                &record.symbol,
            ];
            tx.execute(&stmt, params).map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(records.len())
    }

    fn read_ordered(&self, symbols: Option<&[String]>) -> Result<Vec<PriceRecord>, TrendError> {
        let rows = match symbols {
            Some(list) => {
                let list = list.to_vec();
                self.conn()?
                    .query(
                        &format!("{SELECT_COLUMNS} WHERE ticker = ANY($1) ORDER BY ticker, date"),
                        &[&list],
                    )
                    .map_err(query_err)?
            }
            None => self
                .conn()?
                .query(&format!("{SELECT_COLUMNS} ORDER BY ticker, date"), &[])
                .map_err(query_err)?,
        };

        Ok(rows.iter().map(record_from_row).collect())
    }

    fn get(&self, key: CompositeKey) -> Result<Option<PriceRecord>, TrendError> {
        let row = self
            .conn()?
            .query_opt(&format!("{SELECT_COLUMNS} WHERE date_ticker_id = $1"), &[&key])
            .map_err(query_err)?;
        Ok(row.as_ref().map(record_from_row))
    }

    fn count(&self) -> Result<usize, TrendError> {
        let row = self
            .conn()?
            .query_one("SELECT COUNT(*) FROM public.stock_prices", &[])
            .map_err(query_err)?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendError> {
        let rows = self
            .conn()?
            .query(
                "SELECT DISTINCT ticker FROM public.stock_prices ORDER BY ticker",
                &[],
            )
            .map_err(query_err)?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, TrendError> {
        let row = self
            .conn()?
            .query_one(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM public.stock_prices WHERE ticker = $1",
                &[&symbol],
            )
            .map_err(query_err)?;

        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}
