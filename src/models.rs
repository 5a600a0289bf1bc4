//! Domain records served by the API and persisted by the rate store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A full rate table relative to one base currency, built per request.
///
/// `rates` maps a currency code to the amount of that currency one unit of
/// `base` buys; the base itself is always present at exactly 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRates {
    pub base: String,
    pub rates: HashMap<String, f64>,
    pub last_updated: String,
}

/// The rate of one currency pair on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRate {
    pub date: NaiveDate,
    pub rate: f64,
}
