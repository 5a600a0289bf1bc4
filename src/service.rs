//! Rate composition, lookup ordering, and historical backfill.
//!
//! Every lookup walks the same ladder: cache, then durable store (where one
//! exists for the shape of the query), then the upstream feed. The cache is
//! written on the way out and never trusted as a source of truth.

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CACHE_TTL, RateCache};
use crate::error::ExchangeError;
use crate::models::{ExchangeRates, HistoricalRate};
use crate::providers::cbr::{CbrProvider, DOMESTIC_CURRENCY};
use crate::store::RateStore;

/// Currencies warmed by the startup preload.
const PRELOAD_CURRENCIES: [&str; 2] = ["USD", "EUR"];

/// Returned by `get_all_available_currencies` when the feed is down.
const FALLBACK_CURRENCIES: [&str; 19] = [
    "AUD", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR", "GBP", "HKD", "INR", "JPY", "KRW", "NOK",
    "PLN", "RUB", "SEK", "SGD", "TRY", "USD",
];

pub struct ExchangeService {
    provider: CbrProvider,
    store: RateStore,
    cache: Arc<dyn RateCache>,
}

impl ExchangeService {
    pub fn new(provider: CbrProvider, store: RateStore, cache: Arc<dyn RateCache>) -> Self {
        ExchangeService {
            provider,
            store,
            cache,
        }
    }

    /// Full rate table relative to `base_currency`, for `date` or the
    /// latest listing.
    pub async fn get_all_currency_exchange_rates(
        &self,
        base_currency: &str,
        date: Option<NaiveDate>,
    ) -> Result<ExchangeRates, ExchangeError> {
        let base_currency = base_currency.to_uppercase();
        let cache_key = format!("rates:{}:{}", base_currency, date_key(date));

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(rates) = serde_json::from_str::<ExchangeRates>(&cached) {
                return Ok(rates);
            }
        }

        let quotes = self.provider.fetch_daily(date).await?;
        let rates = if base_currency == DOMESTIC_CURRENCY {
            invert_rates(&quotes.to_domestic)
        } else {
            cross_rates(&quotes.to_domestic, &base_currency)?
        };
        let result = ExchangeRates {
            base: base_currency,
            rates,
            last_updated: quotes.date,
        };

        if let Ok(payload) = serde_json::to_string(&result) {
            self.cache.put(&cache_key, &payload, CACHE_TTL).await;
        }
        Ok(result)
    }

    /// Rate of one currency to RUB, for `date` or the latest listing.
    pub async fn get_currency_exchange_rate(
        &self,
        char_code: &str,
        date: Option<NaiveDate>,
    ) -> Result<f64, ExchangeError> {
        let char_code = char_code.to_uppercase();
        let cache_key = format!("rate:{}:{}", char_code, date_key(date));

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(rate) = cached.parse::<f64>() {
                return Ok(rate);
            }
        }

        let quotes = self.provider.fetch_daily(date).await?;
        let rate = quotes.rate_for(&char_code)?;

        self.cache
            .put(&cache_key, &rate.to_string(), CACHE_TTL)
            .await;
        Ok(rate)
    }

    /// Rates for the trailing `days`-day window of a pair, backfilling
    /// whatever the store is missing, one upstream round-trip per missing
    /// date. A date whose fetch fails is skipped, so the result may hold
    /// fewer than `days` rows.
    pub async fn get_historical_rates(
        &self,
        currency: &str,
        base_currency: &str,
        days: u32,
    ) -> Result<Vec<HistoricalRate>, ExchangeError> {
        let currency = currency.to_uppercase();
        let base_currency = base_currency.to_uppercase();
        let cache_key = format!("historical:{currency}:{base_currency}:{days}");

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(rates) = serde_json::from_str::<Vec<HistoricalRate>>(&cached) {
                return Ok(rates);
            }
        }

        if let Some(rates) = self.store.get_rates(&currency, &base_currency, days).await? {
            self.cache_historical(&cache_key, &rates).await;
            return Ok(rates);
        }

        let missing = self
            .store
            .get_missing_dates(&currency, &base_currency, days)
            .await?;
        debug!(
            currency,
            base_currency,
            missing = missing.len(),
            "Backfilling missing dates"
        );

        let mut fresh = Vec::new();
        for date in missing {
            match self.pair_rate_on(&currency, &base_currency, date).await {
                Ok(rate) => fresh.push(HistoricalRate { date, rate }),
                Err(err) => {
                    debug!(%date, error = %err, "Skipping date, backfill fetch failed");
                }
            }
        }
        if !fresh.is_empty() {
            self.store
                .save_rates(&currency, &base_currency, &fresh)
                .await?;
        }

        let rates = self
            .store
            .window_rates(&currency, &base_currency, days)
            .await?;
        self.cache_historical(&cache_key, &rates).await;
        Ok(rates)
    }

    /// Rate of `currency` in `base_currency` units on a given date, derived
    /// through RUB as the pivot.
    async fn pair_rate_on(
        &self,
        currency: &str,
        base_currency: &str,
        date: NaiveDate,
    ) -> Result<f64, ExchangeError> {
        let currency_rate = self.get_currency_exchange_rate(currency, Some(date)).await?;
        if base_currency == DOMESTIC_CURRENCY {
            return Ok(currency_rate);
        }
        let base_rate = self
            .get_currency_exchange_rate(base_currency, Some(date))
            .await?;
        Ok(currency_rate / base_rate)
    }

    async fn cache_historical(&self, cache_key: &str, rates: &[HistoricalRate]) {
        if let Ok(payload) = serde_json::to_string(rates) {
            self.cache.put(cache_key, &payload, CACHE_TTL).await;
        }
    }

    /// Upserts today's rate-to-RUB for every listed currency. Never errors:
    /// any failure is logged and the operation reports nothing to the
    /// caller.
    pub async fn update_daily_rates(&self) {
        let quotes = match self.provider.fetch_daily(None).await {
            Ok(quotes) => quotes,
            Err(err) => {
                warn!(error = %err, "Daily rate update failed");
                return;
            }
        };

        let today = Local::now().date_naive();
        let mut updated = 0usize;
        for (code, rate) in &quotes.to_domestic {
            if code == DOMESTIC_CURRENCY {
                continue;
            }
            let row = HistoricalRate {
                date: today,
                rate: *rate,
            };
            match self.store.save_single_rate(code, DOMESTIC_CURRENCY, &row).await {
                Ok(()) => updated += 1,
                Err(err) => warn!(code, error = %err, "Failed to store daily rate"),
            }
        }
        info!(updated, "Daily rates updated");
    }

    /// Every currency code the feed currently lists, plus RUB, sorted.
    /// Falls back to a fixed list of common codes so this call never fails.
    pub async fn get_all_available_currencies(&self) -> Vec<String> {
        match self.provider.fetch_daily(None).await {
            Ok(quotes) => {
                let mut codes: Vec<String> = quotes.to_domestic.keys().cloned().collect();
                codes.sort();
                codes
            }
            Err(err) => {
                warn!(error = %err, "Currency listing unavailable, using fallback");
                FALLBACK_CURRENCIES.iter().map(|c| c.to_string()).collect()
            }
        }
    }

    /// Warms the store with `days` of history for a few popular pairs.
    /// Per-currency failures are logged and skipped.
    pub async fn preload_historical_data(&self, days: u32) {
        info!(days, "Preloading historical rates");
        for currency in PRELOAD_CURRENCIES {
            if let Err(err) = self
                .get_historical_rates(currency, DOMESTIC_CURRENCY, days)
                .await
            {
                warn!(currency, error = %err, "Historical preload failed");
            }
        }
    }
}

fn date_key(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "latest".to_string(), |d| d.to_string())
}

/// RUB-based table: how much of each currency one ruble buys.
fn invert_rates(to_domestic: &HashMap<String, f64>) -> HashMap<String, f64> {
    to_domestic
        .iter()
        .map(|(code, rate)| (code.clone(), 1.0 / rate))
        .collect()
}

/// Cross-rates through RUB as the pivot: how much of each currency one
/// unit of `base_currency` buys.
fn cross_rates(
    to_domestic: &HashMap<String, f64>,
    base_currency: &str,
) -> Result<HashMap<String, f64>, ExchangeError> {
    let base_rate = to_domestic
        .get(base_currency)
        .copied()
        .ok_or_else(|| ExchangeError::BaseCurrencyNotFound(base_currency.to_string()))?;
    Ok(to_domestic
        .iter()
        .map(|(code, rate)| (code.clone(), base_rate / rate))
        .collect())
}
