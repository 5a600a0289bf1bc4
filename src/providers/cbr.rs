//! Client for the Central Bank of Russia daily rates feed (`XML_daily.asp`).

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::error::ExchangeError;

/// The currency the feed quotes every rate against. Fixed by the upstream,
/// not configurable.
pub const DOMESTIC_CURRENCY: &str = "RUB";

const FEED_PATH: &str = "/scripts/XML_daily.asp";

/// One day's worth of quotes from the feed: the listing date as published
/// (`dd.mm.yyyy`) and the code -> rate-to-RUB map, nominal-adjusted.
#[derive(Debug, Clone)]
pub struct DailyQuotes {
    pub date: String,
    pub to_domestic: HashMap<String, f64>,
}

impl DailyQuotes {
    /// Rate of a single currency to RUB.
    pub fn rate_for(&self, code: &str) -> Result<f64, ExchangeError> {
        self.to_domestic
            .get(code)
            .copied()
            .ok_or_else(|| ExchangeError::CurrencyNotFound(code.to_string()))
    }
}

pub struct CbrProvider {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize, Debug)]
struct ValCurs {
    #[serde(rename = "@Date", default)]
    date: String,
    #[serde(rename = "Valute", default)]
    valutes: Vec<Valute>,
}

#[derive(Deserialize, Debug)]
struct Valute {
    #[serde(rename = "CharCode", default)]
    char_code: Option<String>,
    #[serde(rename = "Nominal", default)]
    nominal: Option<String>,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

impl CbrProvider {
    pub fn new(base_url: &str) -> Self {
        CbrProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetches the currency listing for `date`, or the latest one when no
    /// date is given. One network round-trip, no retries.
    #[instrument(name = "CbrDailyFetch", skip(self), fields(date = ?date))]
    pub async fn fetch_daily(&self, date: Option<NaiveDate>) -> Result<DailyQuotes, ExchangeError> {
        let url = format!("{}{}", self.base_url, FEED_PATH);
        let mut request = self.client.get(&url);
        if let Some(date) = date {
            request = request.query(&[("date_req", date.format("%d.%m.%Y").to_string())]);
        }
        debug!("Requesting daily rates from {}", url);

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::FeedUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExchangeError::FeedUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        // The live feed serves windows-1251 without a charset header.
        let body = response
            .text_with_charset("windows-1251")
            .await
            .map_err(|e| ExchangeError::FeedUnavailable(e.to_string()))?;

        parse_daily_quotes(&body)
    }
}

/// Parses the feed listing into a code -> rate-to-RUB map.
///
/// Per entry, `rate = value / nominal` with the comma decimal separator
/// normalized first. Entries with missing or unparsable fields are skipped,
/// as are entries whose computed rate is not finite and positive, so the
/// divisions downstream can never see a zero. RUB itself is pinned at 1.0.
fn parse_daily_quotes(xml: &str) -> Result<DailyQuotes, ExchangeError> {
    let listing: ValCurs =
        quick_xml::de::from_str(xml).map_err(|e| ExchangeError::FeedFormat(e.to_string()))?;

    let mut to_domestic = HashMap::new();
    for valute in &listing.valutes {
        let (Some(code), Some(value), Some(nominal)) = (
            valute.char_code.as_deref(),
            valute.value.as_deref(),
            valute.nominal.as_deref(),
        ) else {
            continue;
        };
        let (Some(value), Some(nominal)) = (parse_decimal(value), parse_decimal(nominal)) else {
            debug!(code, "Skipping entry with unparsable value or nominal");
            continue;
        };
        let rate = value / nominal;
        if !rate.is_finite() || rate <= 0.0 {
            debug!(code, rate, "Skipping entry with unusable rate");
            continue;
        }
        to_domestic.insert(code.to_uppercase(), rate);
    }
    to_domestic.insert(DOMESTIC_CURRENCY.to_string(), 1.0);

    Ok(DailyQuotes {
        date: listing.date,
        to_domestic,
    })
}

/// The feed writes decimals with a comma separator ("75,5").
fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DAILY_XML: &str = r#"<?xml version="1.0" encoding="windows-1251"?>
<ValCurs Date="15.01.2024" name="Foreign Currency Market">
    <Valute ID="R01235">
        <NumCode>840</NumCode>
        <CharCode>USD</CharCode>
        <Nominal>1</Nominal>
        <Name>US Dollar</Name>
        <Value>75,5</Value>
    </Valute>
    <Valute ID="R01239">
        <NumCode>978</NumCode>
        <CharCode>EUR</CharCode>
        <Nominal>1</Nominal>
        <Name>Euro</Name>
        <Value>90,25</Value>
    </Valute>
    <Valute ID="R01820">
        <NumCode>392</NumCode>
        <CharCode>JPY</CharCode>
        <Nominal>100</Nominal>
        <Name>Yen</Name>
        <Value>52,9</Value>
    </Valute>
</ValCurs>"#;

    pub async fn create_mock_server(mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(FEED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    #[tokio::test]
    async fn test_successful_daily_fetch() {
        let mock_server = create_mock_server(DAILY_XML).await;
        let provider = CbrProvider::new(&mock_server.uri());

        let quotes = provider.fetch_daily(None).await.unwrap();
        assert_eq!(quotes.date, "15.01.2024");
        assert_eq!(quotes.rate_for("USD").unwrap(), 75.5);
        assert_eq!(quotes.rate_for("EUR").unwrap(), 90.25);
        assert_eq!(quotes.rate_for("RUB").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_nominal_adjustment() {
        let mock_server = create_mock_server(DAILY_XML).await;
        let provider = CbrProvider::new(&mock_server.uri());

        let quotes = provider.fetch_daily(None).await.unwrap();
        // 52,9 per 100 units
        assert!((quotes.rate_for("JPY").unwrap() - 0.529).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_date_parameter_formatting() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FEED_PATH))
            .and(query_param("date_req", "05.03.2023"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DAILY_XML))
            .mount(&mock_server)
            .await;

        let provider = CbrProvider::new(&mock_server.uri());
        let date = NaiveDate::from_ymd_opt(2023, 3, 5).unwrap();
        let quotes = provider.fetch_daily(Some(date)).await.unwrap();
        assert!(quotes.to_domestic.contains_key("USD"));
    }

    #[tokio::test]
    async fn test_unknown_currency() {
        let mock_server = create_mock_server(DAILY_XML).await;
        let provider = CbrProvider::new(&mock_server.uri());

        let quotes = provider.fetch_daily(None).await.unwrap();
        let err = quotes.rate_for("XYZ").unwrap_err();
        assert_eq!(err.to_string(), "Currency XYZ not found");
    }

    #[tokio::test]
    async fn test_feed_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FEED_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = CbrProvider::new(&mock_server.uri());
        let err = provider.fetch_daily(None).await.unwrap_err();
        assert!(matches!(err, ExchangeError::FeedUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let mock_server = create_mock_server("not xml at all <<<").await;
        let provider = CbrProvider::new(&mock_server.uri());

        let err = provider.fetch_daily(None).await.unwrap_err();
        assert!(matches!(err, ExchangeError::FeedFormat(_)));
    }

    #[test]
    fn test_unparsable_entries_are_skipped() {
        let xml = r#"<ValCurs Date="15.01.2024">
            <Valute><CharCode>USD</CharCode><Nominal>1</Nominal><Value>75,5</Value></Valute>
            <Valute><CharCode>AAA</CharCode><Nominal>1</Nominal><Value>garbage</Value></Valute>
            <Valute><CharCode>BBB</CharCode><Nominal>1</Nominal></Valute>
            <Valute><CharCode>CCC</CharCode><Nominal>0</Nominal><Value>10,0</Value></Valute>
            <Valute><CharCode>DDD</CharCode><Nominal>1</Nominal><Value>0,0</Value></Valute>
        </ValCurs>"#;

        let quotes = parse_daily_quotes(xml).unwrap();
        assert_eq!(quotes.rate_for("USD").unwrap(), 75.5);
        assert!(quotes.rate_for("AAA").is_err());
        assert!(quotes.rate_for("BBB").is_err());
        // zero nominal and zero value cannot produce a usable rate
        assert!(quotes.rate_for("CCC").is_err());
        assert!(quotes.rate_for("DDD").is_err());
    }

    #[test]
    fn test_lowercase_codes_are_normalized() {
        let xml = r#"<ValCurs Date="15.01.2024">
            <Valute><CharCode>usd</CharCode><Nominal>1</Nominal><Value>75,5</Value></Valute>
        </ValCurs>"#;

        let quotes = parse_daily_quotes(xml).unwrap();
        assert_eq!(quotes.rate_for("USD").unwrap(), 75.5);
    }
}
