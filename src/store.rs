//! Durable store for historical exchange rates.
//!
//! One SQLite table, one row per `(currency, base_currency, date)` triple.
//! Upserts go through `INSERT OR REPLACE` against the UNIQUE constraint,
//! which is also the only guard against concurrent writers.

use chrono::{Duration, Local, NaiveDate};
use rusqlite::params;
use std::collections::HashSet;
use std::path::Path;
use tokio_rusqlite::Connection;

use crate::error::ExchangeError;
use crate::models::HistoricalRate;

#[derive(Clone)]
pub struct RateStore {
    conn: Connection,
}

impl RateStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ExchangeError> {
        let conn = Connection::open(path.as_ref()).await?;
        Ok(RateStore { conn })
    }

    pub async fn open_in_memory() -> Result<Self, ExchangeError> {
        let conn = Connection::open_in_memory().await?;
        Ok(RateStore { conn })
    }

    /// Creates the `historical_rates` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), ExchangeError> {
        self.conn
            .call(|conn| {
                conn.execute(
                    r#"
                    CREATE TABLE IF NOT EXISTS historical_rates (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        currency TEXT NOT NULL,
                        base_currency TEXT NOT NULL,
                        date TEXT NOT NULL,
                        rate REAL NOT NULL,
                        UNIQUE(currency, base_currency, date)
                    )
                    "#,
                    [],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Upserts a batch of rates for one currency pair in a single
    /// transaction.
    pub async fn save_rates(
        &self,
        currency: &str,
        base_currency: &str,
        rates: &[HistoricalRate],
    ) -> Result<(), ExchangeError> {
        let currency = currency.to_uppercase();
        let base_currency = base_currency.to_uppercase();
        let rates = rates.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"
                        INSERT OR REPLACE INTO historical_rates (currency, base_currency, date, rate)
                        VALUES (?1, ?2, ?3, ?4)
                        "#,
                    )?;
                    for rate in &rates {
                        stmt.execute(params![currency, base_currency, rate.date, rate.rate])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn save_single_rate(
        &self,
        currency: &str,
        base_currency: &str,
        rate: &HistoricalRate,
    ) -> Result<(), ExchangeError> {
        self.save_rates(currency, base_currency, std::slice::from_ref(rate))
            .await
    }

    /// Point lookup for one pair on one date.
    pub async fn get_rate_by_date(
        &self,
        currency: &str,
        base_currency: &str,
        date: NaiveDate,
    ) -> Result<Option<HistoricalRate>, ExchangeError> {
        let currency = currency.to_uppercase();
        let base_currency = base_currency.to_uppercase();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT date, rate FROM historical_rates
                    WHERE currency = ?1 AND base_currency = ?2 AND date = ?3
                    "#,
                )?;
                let mut rows = stmt.query_map(params![currency, base_currency, date], |row| {
                    Ok(HistoricalRate {
                        date: row.get(0)?,
                        rate: row.get(1)?,
                    })
                })?;
                rows.next().transpose().map_err(Into::into)
            })
            .await?;
        Ok(row)
    }

    /// All stored rows for the pair in the trailing `days`-day window,
    /// ascending by date, regardless of how many there are.
    pub async fn window_rates(
        &self,
        currency: &str,
        base_currency: &str,
        days: u32,
    ) -> Result<Vec<HistoricalRate>, ExchangeError> {
        let start_date = Local::now().date_naive() - Duration::days(days as i64 - 1);
        let currency = currency.to_uppercase();
        let base_currency = base_currency.to_uppercase();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT date, rate FROM historical_rates
                    WHERE currency = ?1 AND base_currency = ?2 AND date >= ?3
                    ORDER BY date ASC
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![currency, base_currency, start_date], |row| {
                        Ok(HistoricalRate {
                            date: row.get(0)?,
                            rate: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// The trailing window only when it is complete: `None` signals
    /// insufficient data, which is the caller's cue to backfill. The window
    /// spans exactly `days` calendar days, so `len >= days` reads as
    /// "every day present".
    pub async fn get_rates(
        &self,
        currency: &str,
        base_currency: &str,
        days: u32,
    ) -> Result<Option<Vec<HistoricalRate>>, ExchangeError> {
        let rows = self.window_rates(currency, base_currency, days).await?;
        if rows.len() >= days as usize {
            Ok(Some(rows))
        } else {
            Ok(None)
        }
    }

    /// Most recent stored row for the pair.
    pub async fn get_latest_rate(
        &self,
        currency: &str,
        base_currency: &str,
    ) -> Result<Option<HistoricalRate>, ExchangeError> {
        let currency = currency.to_uppercase();
        let base_currency = base_currency.to_uppercase();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT date, rate FROM historical_rates
                    WHERE currency = ?1 AND base_currency = ?2
                    ORDER BY date DESC
                    LIMIT 1
                    "#,
                )?;
                let mut rows = stmt.query_map(params![currency, base_currency], |row| {
                    Ok(HistoricalRate {
                        date: row.get(0)?,
                        rate: row.get(1)?,
                    })
                })?;
                rows.next().transpose().map_err(Into::into)
            })
            .await?;
        Ok(row)
    }

    /// Dates in the trailing `days`-day window with no stored row.
    pub async fn get_missing_dates(
        &self,
        currency: &str,
        base_currency: &str,
        days: u32,
    ) -> Result<Vec<NaiveDate>, ExchangeError> {
        let end_date = Local::now().date_naive();
        let start_date = end_date - Duration::days(days as i64 - 1);
        self.get_missing_dates_for_range(currency, base_currency, start_date, end_date)
            .await
    }

    /// Dates in `[start_date, end_date]` with no stored row for the pair.
    pub async fn get_missing_dates_for_range(
        &self,
        currency: &str,
        base_currency: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, ExchangeError> {
        let currency = currency.to_uppercase();
        let base_currency = base_currency.to_uppercase();
        let existing: HashSet<NaiveDate> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT DISTINCT date FROM historical_rates
                    WHERE currency = ?1 AND base_currency = ?2 AND date >= ?3 AND date <= ?4
                    "#,
                )?;
                let dates = stmt
                    .query_map(
                        params![currency, base_currency, start_date, end_date],
                        |row| row.get(0),
                    )?
                    .collect::<Result<HashSet<_>, _>>()?;
                Ok(dates)
            })
            .await?;

        let mut missing = Vec::new();
        let mut current = start_date;
        while current <= end_date {
            if !existing.contains(&current) {
                missing.push(current);
            }
            current += Duration::days(1);
        }
        Ok(missing)
    }
}
